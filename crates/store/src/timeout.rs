//! Per-call deadline enforcement for any [`InventoryStore`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use common::{BackorderId, OrderId, ReservationId, StockKey};

use crate::model::{Backorder, Order, Reservation, StockEntry, StockMovement, Version};
use crate::store::{
    BackorderFilter, BackorderPatch, InventoryStore, MovementFilter, OrderPatch,
    ReservationFilter, ReservationPatch,
};
use crate::{Result, StoreError};

/// Default deadline for a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Wraps a store so that no single call can block longer than `timeout`.
///
/// A call that misses its deadline fails with [`StoreError::Timeout`]. The
/// inner call is dropped, so callers must assume its write may or may not
/// have landed and compensate accordingly.
#[derive(Clone)]
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: InventoryStore> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Wraps `inner` with [`DEFAULT_STORE_TIMEOUT`].
    pub fn with_default_timeout(inner: S) -> Self {
        Self::new(inner, DEFAULT_STORE_TIMEOUT)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                metrics::counter!("store_timeouts_total", "operation" => operation).increment(1);
                tracing::warn!(operation, timeout = ?self.timeout, "store call timed out");
                Err(StoreError::Timeout {
                    operation,
                    after: self.timeout,
                })
            }
        }
    }
}

#[async_trait]
impl<S: InventoryStore> InventoryStore for TimeoutStore<S> {
    async fn get_stock(&self, key: StockKey) -> Result<Option<StockEntry>> {
        self.bounded("get_stock", self.inner.get_stock(key)).await
    }

    async fn list_stock(&self) -> Result<Vec<StockEntry>> {
        self.bounded("list_stock", self.inner.list_stock()).await
    }

    async fn insert_stock(&self, entry: StockEntry) -> Result<StockEntry> {
        self.bounded("insert_stock", self.inner.insert_stock(entry))
            .await
    }

    async fn update_stock(
        &self,
        key: StockKey,
        quantity: u32,
        expected: Version,
    ) -> Result<StockEntry> {
        self.bounded(
            "update_stock",
            self.inner.update_stock(key, quantity, expected),
        )
        .await
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        self.bounded("get_order", self.inner.get_order(id)).await
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        self.bounded("insert_order", self.inner.insert_order(order))
            .await
    }

    async fn update_orders(&self, ids: &[OrderId], patch: OrderPatch) -> Result<u64> {
        self.bounded("update_orders", self.inner.update_orders(ids, patch))
            .await
    }

    async fn delete_order(&self, id: OrderId) -> Result<u64> {
        self.bounded("delete_order", self.inner.delete_order(id)).await
    }

    async fn insert_reservations(&self, rows: Vec<Reservation>) -> Result<()> {
        self.bounded(
            "insert_reservations",
            self.inner.insert_reservations(rows),
        )
        .await
    }

    async fn find_reservations(&self, filter: ReservationFilter) -> Result<Vec<Reservation>> {
        self.bounded("find_reservations", self.inner.find_reservations(filter))
            .await
    }

    async fn update_reservation(&self, id: ReservationId, patch: ReservationPatch) -> Result<u64> {
        self.bounded(
            "update_reservation",
            self.inner.update_reservation(id, patch),
        )
        .await
    }

    async fn delete_reservations(&self, ids: &[ReservationId]) -> Result<u64> {
        self.bounded("delete_reservations", self.inner.delete_reservations(ids))
            .await
    }

    async fn insert_backorder(&self, row: Backorder) -> Result<()> {
        self.bounded("insert_backorder", self.inner.insert_backorder(row))
            .await
    }

    async fn find_backorders(&self, filter: BackorderFilter) -> Result<Vec<Backorder>> {
        self.bounded("find_backorders", self.inner.find_backorders(filter))
            .await
    }

    async fn update_backorders(&self, ids: &[BackorderId], patch: BackorderPatch) -> Result<u64> {
        self.bounded(
            "update_backorders",
            self.inner.update_backorders(ids, patch),
        )
        .await
    }

    async fn insert_movement(&self, row: StockMovement) -> Result<()> {
        self.bounded("insert_movement", self.inner.insert_movement(row))
            .await
    }

    async fn list_movements(&self, filter: MovementFilter) -> Result<Vec<StockMovement>> {
        self.bounded("list_movements", self.inner.list_movements(filter))
            .await
    }
}
