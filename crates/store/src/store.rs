use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BackorderId, OrderId, ProductId, ReservationId, StockKey, WarehouseId};

use crate::model::{
    Backorder, BackorderStatus, Order, OrderStatus, Reservation, ReservationStatus, StockEntry,
    StockMovement, Version,
};
use crate::Result;

/// Selects reservation rows. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ReservationFilter {
    pub order_id: Option<OrderId>,
    pub status: Option<ReservationStatus>,
    pub ids: Option<Vec<ReservationId>>,
}

impl ReservationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filter for every reservation of one order.
    pub fn for_order(order_id: OrderId) -> Self {
        Self {
            order_id: Some(order_id),
            ..Default::default()
        }
    }

    pub fn status(mut self, status: ReservationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn ids(mut self, ids: Vec<ReservationId>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn matches(&self, row: &Reservation) -> bool {
        if let Some(order_id) = self.order_id
            && row.order_id != order_id
        {
            return false;
        }
        if let Some(status) = self.status
            && row.status != status
        {
            return false;
        }
        if let Some(ref ids) = self.ids
            && !ids.contains(&row.id)
        {
            return false;
        }
        true
    }
}

/// Selects backorder rows. Results are always ordered by `created_at` ascending.
#[derive(Debug, Clone, Default)]
pub struct BackorderFilter {
    pub order_id: Option<OrderId>,
    pub key: Option<StockKey>,
    pub status: Option<BackorderStatus>,
}

impl BackorderFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filter for every backorder of one order.
    pub fn for_order(order_id: OrderId) -> Self {
        Self {
            order_id: Some(order_id),
            ..Default::default()
        }
    }

    /// Creates a filter for the pending queue of a (product, warehouse) pair.
    pub fn pending_for(key: StockKey) -> Self {
        Self {
            key: Some(key),
            status: Some(BackorderStatus::Pending),
            ..Default::default()
        }
    }

    pub fn status(mut self, status: BackorderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, row: &Backorder) -> bool {
        if let Some(order_id) = self.order_id
            && row.order_id != order_id
        {
            return false;
        }
        if let Some(key) = self.key
            && row.key() != key
        {
            return false;
        }
        if let Some(status) = self.status
            && row.status != status
        {
            return false;
        }
        true
    }
}

/// Selects stock movement rows. Results are ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    pub product_id: Option<ProductId>,
    pub warehouse_id: Option<WarehouseId>,
    pub order_id: Option<OrderId>,
    pub limit: Option<usize>,
}

impl MovementFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn product(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }

    /// Matches movements that leave or enter the warehouse.
    pub fn warehouse(mut self, warehouse_id: WarehouseId) -> Self {
        self.warehouse_id = Some(warehouse_id);
        self
    }

    pub fn order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &StockMovement) -> bool {
        if let Some(product_id) = self.product_id
            && row.product_id != product_id
        {
            return false;
        }
        if let Some(warehouse_id) = self.warehouse_id
            && row.source_warehouse_id != Some(warehouse_id)
            && row.destination_warehouse_id != Some(warehouse_id)
        {
            return false;
        }
        if let Some(order_id) = self.order_id
            && row.order_id != Some(order_id)
        {
            return false;
        }
        true
    }
}

/// Status change applied to orders.
#[derive(Debug, Clone, Copy)]
pub struct OrderPatch {
    pub status: OrderStatus,
    /// Written only when present; an existing date is never cleared.
    pub fulfillment_date: Option<DateTime<Utc>>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status,
            fulfillment_date: None,
        }
    }

    pub fn shipped(ship_date: DateTime<Utc>) -> Self {
        Self {
            status: OrderStatus::Shipped,
            fulfillment_date: Some(ship_date),
        }
    }
}

/// Status change applied to a single reservation.
///
/// Both fields are written; `ship_date: None` clears the column.
#[derive(Debug, Clone, Copy)]
pub struct ReservationPatch {
    pub status: ReservationStatus,
    pub ship_date: Option<DateTime<Utc>>,
    /// The update only applies when the row currently has this status.
    pub expected_status: Option<ReservationStatus>,
}

impl ReservationPatch {
    pub fn ship(ship_date: DateTime<Utc>) -> Self {
        Self {
            status: ReservationStatus::Shipped,
            ship_date: Some(ship_date),
            expected_status: Some(ReservationStatus::Reserved),
        }
    }

    /// Undoes [`ReservationPatch::ship`].
    pub fn unship() -> Self {
        Self {
            status: ReservationStatus::Reserved,
            ship_date: None,
            expected_status: Some(ReservationStatus::Shipped),
        }
    }

    pub fn cancel() -> Self {
        Self {
            status: ReservationStatus::Cancelled,
            ship_date: None,
            expected_status: Some(ReservationStatus::Reserved),
        }
    }
}

/// Status change applied to a set of backorders.
#[derive(Debug, Clone, Copy)]
pub struct BackorderPatch {
    pub status: BackorderStatus,
    /// Both written; `None` clears the column.
    pub fulfilled_date: Option<DateTime<Utc>>,
    /// Rows whose current status differs are left untouched.
    pub expected_status: Option<BackorderStatus>,
}

impl BackorderPatch {
    pub fn fulfil(now: DateTime<Utc>) -> Self {
        Self {
            status: BackorderStatus::Fulfilled,
            fulfilled_date: Some(now),
            expected_status: Some(BackorderStatus::Pending),
        }
    }

    /// Undoes [`BackorderPatch::fulfil`].
    pub fn reopen() -> Self {
        Self {
            status: BackorderStatus::Pending,
            fulfilled_date: None,
            expected_status: Some(BackorderStatus::Fulfilled),
        }
    }

    pub fn cancel() -> Self {
        Self {
            status: BackorderStatus::Cancelled,
            fulfilled_date: None,
            expected_status: Some(BackorderStatus::Pending),
        }
    }
}

/// Row-level access to the inventory tables.
///
/// Every call is individually atomic, but nothing spans two calls: callers
/// that touch several rows must compensate on failure themselves. All
/// implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Reads the stock row for a pair. Returns None if it was never created.
    async fn get_stock(&self, key: StockKey) -> Result<Option<StockEntry>>;

    /// Lists every stock row.
    async fn list_stock(&self) -> Result<Vec<StockEntry>>;

    /// Creates a stock row. Fails with `AlreadyExists` if the pair has one.
    async fn insert_stock(&self, entry: StockEntry) -> Result<StockEntry>;

    /// Overwrites a stock row's quantity if its version still equals `expected`.
    ///
    /// Returns the updated row carrying the next version. Fails with
    /// `ConcurrencyConflict` on a version mismatch.
    async fn update_stock(
        &self,
        key: StockKey,
        quantity: u32,
        expected: Version,
    ) -> Result<StockEntry>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    async fn insert_order(&self, order: Order) -> Result<()>;

    /// Applies a patch to every listed order. Returns the number of rows changed.
    async fn update_orders(&self, ids: &[OrderId], patch: OrderPatch) -> Result<u64>;

    async fn delete_order(&self, id: OrderId) -> Result<u64>;

    /// Inserts a batch of reservations. The batch lands entirely or not at all.
    async fn insert_reservations(&self, rows: Vec<Reservation>) -> Result<()>;

    async fn find_reservations(&self, filter: ReservationFilter) -> Result<Vec<Reservation>>;

    /// Returns the number of rows changed (0 when the status precondition failed).
    async fn update_reservation(&self, id: ReservationId, patch: ReservationPatch) -> Result<u64>;

    async fn delete_reservations(&self, ids: &[ReservationId]) -> Result<u64>;

    async fn insert_backorder(&self, row: Backorder) -> Result<()>;

    /// Returns matching backorders ordered by `created_at` ascending.
    async fn find_backorders(&self, filter: BackorderFilter) -> Result<Vec<Backorder>>;

    /// Returns the number of rows changed.
    async fn update_backorders(&self, ids: &[BackorderId], patch: BackorderPatch) -> Result<u64>;

    async fn insert_movement(&self, row: StockMovement) -> Result<()>;

    /// Returns matching movements, newest first.
    async fn list_movements(&self, filter: MovementFilter) -> Result<Vec<StockMovement>>;
}

/// Extension trait providing convenience methods for inventory stores.
#[async_trait]
pub trait InventoryStoreExt: InventoryStore {
    /// Sets one order's status.
    async fn set_order_status(&self, id: OrderId, status: OrderStatus) -> Result<u64> {
        self.update_orders(&[id], OrderPatch::status(status)).await
    }

    /// Returns the reservations of an order that still hold stock.
    async fn active_reservations(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        self.find_reservations(
            ReservationFilter::for_order(order_id).status(ReservationStatus::Reserved),
        )
        .await
    }

    /// Returns the pending backorder queue of a pair, oldest first.
    async fn pending_backorders(&self, key: StockKey) -> Result<Vec<Backorder>> {
        self.find_backorders(BackorderFilter::pending_for(key)).await
    }
}

// Blanket implementation for all InventoryStore implementations
impl<T: InventoryStore + ?Sized> InventoryStoreExt for T {}
