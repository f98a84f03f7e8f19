use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{BackorderId, OrderId, ReservationId, StockKey};
use tokio::sync::RwLock;

use crate::model::{Backorder, Order, Reservation, StockEntry, StockMovement, Version};
use crate::store::{
    BackorderFilter, BackorderPatch, InventoryStore, MovementFilter, OrderPatch,
    ReservationFilter, ReservationPatch,
};
use crate::{Result, StoreError};

/// Identifies a store call for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetStock,
    ListStock,
    InsertStock,
    UpdateStock,
    GetOrder,
    InsertOrder,
    UpdateOrders,
    DeleteOrder,
    InsertReservations,
    FindReservations,
    UpdateReservation,
    DeleteReservations,
    InsertBackorder,
    FindBackorders,
    UpdateBackorders,
    InsertMovement,
    ListMovements,
}

impl StoreOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOp::GetStock => "get_stock",
            StoreOp::ListStock => "list_stock",
            StoreOp::InsertStock => "insert_stock",
            StoreOp::UpdateStock => "update_stock",
            StoreOp::GetOrder => "get_order",
            StoreOp::InsertOrder => "insert_order",
            StoreOp::UpdateOrders => "update_orders",
            StoreOp::DeleteOrder => "delete_order",
            StoreOp::InsertReservations => "insert_reservations",
            StoreOp::FindReservations => "find_reservations",
            StoreOp::UpdateReservation => "update_reservation",
            StoreOp::DeleteReservations => "delete_reservations",
            StoreOp::InsertBackorder => "insert_backorder",
            StoreOp::FindBackorders => "find_backorders",
            StoreOp::UpdateBackorders => "update_backorders",
            StoreOp::InsertMovement => "insert_movement",
            StoreOp::ListMovements => "list_movements",
        }
    }
}

#[derive(Debug, Clone)]
struct Fault {
    op: StoreOp,
    key: Option<StockKey>,
    /// Matching calls allowed through before the fault starts firing.
    skip: u32,
    /// How many times the fault fires; `None` means forever.
    shots: Option<u32>,
}

#[derive(Debug, Default)]
struct Tables {
    stock: HashMap<StockKey, StockEntry>,
    orders: HashMap<OrderId, Order>,
    reservations: Vec<Reservation>,
    backorders: Vec<Backorder>,
    movements: Vec<StockMovement>,
}

#[derive(Debug, Default)]
struct Faults {
    rules: Vec<Fault>,
    latency: Option<Duration>,
}

/// In-memory inventory store for tests and the default server binary.
///
/// Offers the same per-call atomicity as the Postgres store and nothing
/// more. Faults can be injected per operation to exercise compensation.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<Mutex<Faults>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call of `op` fail until cleared.
    pub fn fail_on(&self, op: StoreOp) {
        self.push_fault(Fault {
            op,
            key: None,
            skip: 0,
            shots: None,
        });
    }

    /// Makes calls of a stock operation fail only for one pair.
    pub fn fail_on_stock(&self, op: StoreOp, key: StockKey) {
        self.push_fault(Fault {
            op,
            key: Some(key),
            skip: 0,
            shots: None,
        });
    }

    /// Lets `skip` calls of `op` succeed, then fails every later one.
    pub fn fail_after(&self, op: StoreOp, skip: u32) {
        self.push_fault(Fault {
            op,
            key: None,
            skip,
            shots: None,
        });
    }

    /// Lets `skip` calls of `op` succeed, fails exactly the next one, then
    /// lets every later call through.
    pub fn fail_nth(&self, op: StoreOp, skip: u32) {
        self.push_fault(Fault {
            op,
            key: None,
            skip,
            shots: Some(1),
        });
    }

    /// Removes all injected faults and latency.
    pub fn clear_failures(&self) {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        faults.rules.clear();
        faults.latency = None;
    }

    /// Delays every call by `latency` before it touches the tables.
    pub fn set_latency(&self, latency: Duration) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latency = Some(latency);
    }

    fn push_fault(&self, fault: Fault) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rules
            .push(fault);
    }

    async fn check(&self, op: StoreOp, key: Option<StockKey>) -> Result<()> {
        let (latency, fire) = {
            let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
            let mut fire = false;
            for rule in faults.rules.iter_mut() {
                if rule.op != op {
                    continue;
                }
                if rule.key.is_some() && rule.key != key {
                    continue;
                }
                if rule.skip > 0 {
                    rule.skip -= 1;
                    continue;
                }
                match rule.shots {
                    Some(0) => {}
                    Some(n) => {
                        rule.shots = Some(n - 1);
                        fire = true;
                    }
                    None => fire = true,
                }
            }
            (faults.latency, fire)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if fire {
            return Err(StoreError::WriteFailed {
                operation: op.as_str(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    /// Creates or overwrites a stock row, bypassing fault injection.
    pub async fn seed_stock(&self, key: StockKey, quantity: u32) -> StockEntry {
        let entry = StockEntry::new(key, quantity, Utc::now());
        self.tables.write().await.stock.insert(key, entry.clone());
        entry
    }

    /// Creates a pending order, bypassing fault injection.
    pub async fn seed_order(&self, id: OrderId) -> Order {
        let order = Order::new(id, Utc::now());
        self.tables.write().await.orders.insert(id, order.clone());
        order
    }

    /// Returns the quantity on hand for a pair.
    pub async fn stock_quantity(&self, key: StockKey) -> Option<u32> {
        self.tables.read().await.stock.get(&key).map(|e| e.quantity)
    }

    /// Returns a snapshot of every reservation row.
    pub async fn all_reservations(&self) -> Vec<Reservation> {
        self.tables.read().await.reservations.clone()
    }

    /// Returns a snapshot of every backorder row.
    pub async fn all_backorders(&self) -> Vec<Backorder> {
        self.tables.read().await.backorders.clone()
    }

    /// Returns a snapshot of every movement row in insertion order.
    pub async fn all_movements(&self) -> Vec<StockMovement> {
        self.tables.read().await.movements.clone()
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn get_stock(&self, key: StockKey) -> Result<Option<StockEntry>> {
        self.check(StoreOp::GetStock, Some(key)).await?;
        Ok(self.tables.read().await.stock.get(&key).cloned())
    }

    async fn list_stock(&self) -> Result<Vec<StockEntry>> {
        self.check(StoreOp::ListStock, None).await?;
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables.stock.values().cloned().collect();
        rows.sort_by_key(|e| (e.product_id, e.warehouse_id));
        Ok(rows)
    }

    async fn insert_stock(&self, entry: StockEntry) -> Result<StockEntry> {
        let key = entry.key();
        self.check(StoreOp::InsertStock, Some(key)).await?;
        let mut tables = self.tables.write().await;
        if tables.stock.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                table: "stock",
                id: key.to_string(),
            });
        }
        tables.stock.insert(key, entry.clone());
        Ok(entry)
    }

    async fn update_stock(
        &self,
        key: StockKey,
        quantity: u32,
        expected: Version,
    ) -> Result<StockEntry> {
        self.check(StoreOp::UpdateStock, Some(key)).await?;
        let mut tables = self.tables.write().await;
        let entry = tables
            .stock
            .get_mut(&key)
            .ok_or_else(|| StoreError::RowNotFound {
                table: "stock",
                id: key.to_string(),
            })?;

        if entry.version != expected {
            return Err(StoreError::ConcurrencyConflict {
                key,
                expected,
                actual: entry.version,
            });
        }

        entry.quantity = quantity;
        entry.version = entry.version.next();
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        self.check(StoreOp::GetOrder, None).await?;
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        self.check(StoreOp::InsertOrder, None).await?;
        let mut tables = self.tables.write().await;
        if tables.orders.contains_key(&order.id) {
            return Err(StoreError::AlreadyExists {
                table: "orders",
                id: order.id.to_string(),
            });
        }
        tables.orders.insert(order.id, order);
        Ok(())
    }

    async fn update_orders(&self, ids: &[OrderId], patch: OrderPatch) -> Result<u64> {
        self.check(StoreOp::UpdateOrders, None).await?;
        let mut tables = self.tables.write().await;
        let mut affected = 0;
        for id in ids {
            if let Some(order) = tables.orders.get_mut(id) {
                order.status = patch.status;
                if let Some(date) = patch.fulfillment_date {
                    order.fulfillment_date = Some(date);
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn delete_order(&self, id: OrderId) -> Result<u64> {
        self.check(StoreOp::DeleteOrder, None).await?;
        let removed = self.tables.write().await.orders.remove(&id);
        Ok(u64::from(removed.is_some()))
    }

    async fn insert_reservations(&self, rows: Vec<Reservation>) -> Result<()> {
        self.check(StoreOp::InsertReservations, None).await?;
        let mut tables = self.tables.write().await;
        if let Some(dup) = rows
            .iter()
            .find(|r| tables.reservations.iter().any(|e| e.id == r.id))
        {
            return Err(StoreError::AlreadyExists {
                table: "stock_reservations",
                id: dup.id.to_string(),
            });
        }
        tables.reservations.extend(rows);
        Ok(())
    }

    async fn find_reservations(&self, filter: ReservationFilter) -> Result<Vec<Reservation>> {
        self.check(StoreOp::FindReservations, None).await?;
        let tables = self.tables.read().await;
        Ok(tables
            .reservations
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn update_reservation(&self, id: ReservationId, patch: ReservationPatch) -> Result<u64> {
        self.check(StoreOp::UpdateReservation, None).await?;
        let mut tables = self.tables.write().await;
        let Some(row) = tables.reservations.iter_mut().find(|r| r.id == id) else {
            return Ok(0);
        };
        if let Some(expected) = patch.expected_status
            && row.status != expected
        {
            return Ok(0);
        }
        row.status = patch.status;
        row.ship_date = patch.ship_date;
        Ok(1)
    }

    async fn delete_reservations(&self, ids: &[ReservationId]) -> Result<u64> {
        self.check(StoreOp::DeleteReservations, None).await?;
        let mut tables = self.tables.write().await;
        let before = tables.reservations.len();
        tables.reservations.retain(|r| !ids.contains(&r.id));
        Ok((before - tables.reservations.len()) as u64)
    }

    async fn insert_backorder(&self, row: Backorder) -> Result<()> {
        self.check(StoreOp::InsertBackorder, Some(row.key())).await?;
        let mut tables = self.tables.write().await;
        if tables.backorders.iter().any(|b| b.id == row.id) {
            return Err(StoreError::AlreadyExists {
                table: "backorders",
                id: row.id.to_string(),
            });
        }
        tables.backorders.push(row);
        Ok(())
    }

    async fn find_backorders(&self, filter: BackorderFilter) -> Result<Vec<Backorder>> {
        self.check(StoreOp::FindBackorders, filter.key).await?;
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables
            .backorders
            .iter()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        // Stable sort keeps insertion order for identical timestamps.
        rows.sort_by_key(|b| b.created_at);
        Ok(rows)
    }

    async fn update_backorders(&self, ids: &[BackorderId], patch: BackorderPatch) -> Result<u64> {
        self.check(StoreOp::UpdateBackorders, None).await?;
        let mut tables = self.tables.write().await;
        let mut affected = 0;
        for row in tables.backorders.iter_mut().filter(|b| ids.contains(&b.id)) {
            if let Some(expected) = patch.expected_status
                && row.status != expected
            {
                continue;
            }
            row.status = patch.status;
            row.fulfilled_date = patch.fulfilled_date;
            affected += 1;
        }
        Ok(affected)
    }

    async fn insert_movement(&self, row: StockMovement) -> Result<()> {
        self.check(StoreOp::InsertMovement, None).await?;
        self.tables.write().await.movements.push(row);
        Ok(())
    }

    async fn list_movements(&self, filter: MovementFilter) -> Result<Vec<StockMovement>> {
        self.check(StoreOp::ListMovements, None).await?;
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables
            .movements
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        rows.reverse();
        rows.sort_by(|a, b| b.transfer_date.cmp(&a.transfer_date));
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackorderStatus, ReservationStatus};
    use crate::store::InventoryStoreExt;
    use chrono::Duration as ChronoDuration;
    use common::{ProductId, WarehouseId};

    fn key() -> StockKey {
        StockKey::new(ProductId::new(), WarehouseId::new())
    }

    #[tokio::test]
    async fn insert_and_read_stock() {
        let store = InMemoryStore::new();
        let k = key();

        assert!(store.get_stock(k).await.unwrap().is_none());
        store
            .insert_stock(StockEntry::new(k, 10, Utc::now()))
            .await
            .unwrap();

        let entry = store.get_stock(k).await.unwrap().unwrap();
        assert_eq!(entry.quantity, 10);
        assert_eq!(entry.version, Version::first());
    }

    #[tokio::test]
    async fn duplicate_stock_insert_is_rejected() {
        let store = InMemoryStore::new();
        let k = key();
        store.seed_stock(k, 1).await;

        let result = store.insert_stock(StockEntry::new(k, 5, Utc::now())).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists { .. })));
        assert_eq!(store.stock_quantity(k).await, Some(1));
    }

    #[tokio::test]
    async fn conditional_update_bumps_version() {
        let store = InMemoryStore::new();
        let k = key();
        store.seed_stock(k, 10).await;

        let updated = store.update_stock(k, 7, Version::first()).await.unwrap();
        assert_eq!(updated.quantity, 7);
        assert_eq!(updated.version, Version::new(2));
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = InMemoryStore::new();
        let k = key();
        store.seed_stock(k, 10).await;
        store.update_stock(k, 7, Version::first()).await.unwrap();

        let result = store.update_stock(k, 3, Version::first()).await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { .. })
        ));
        assert_eq!(store.stock_quantity(k).await, Some(7));
    }

    #[tokio::test]
    async fn update_missing_stock_is_not_found() {
        let store = InMemoryStore::new();
        let result = store.update_stock(key(), 1, Version::first()).await;
        assert!(matches!(result, Err(StoreError::RowNotFound { .. })));
    }

    #[tokio::test]
    async fn backorders_come_back_oldest_first() {
        let store = InMemoryStore::new();
        let k = key();
        let now = Utc::now();

        let late = Backorder::new(OrderId::new(), k, 1, 0, now + ChronoDuration::seconds(5));
        let early = Backorder::new(OrderId::new(), k, 2, 0, now);
        store.insert_backorder(late.clone()).await.unwrap();
        store.insert_backorder(early.clone()).await.unwrap();

        let queue = store.pending_backorders(k).await.unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].id, early.id);
        assert_eq!(queue[1].id, late.id);
    }

    #[tokio::test]
    async fn backorder_patch_respects_expected_status() {
        let store = InMemoryStore::new();
        let k = key();
        let row = Backorder::new(OrderId::new(), k, 1, 0, Utc::now());
        store.insert_backorder(row.clone()).await.unwrap();

        let changed = store
            .update_backorders(&[row.id], BackorderPatch::fulfil(Utc::now()))
            .await
            .unwrap();
        assert_eq!(changed, 1);

        // Already fulfilled, so a second fulfil touches nothing.
        let changed = store
            .update_backorders(&[row.id], BackorderPatch::fulfil(Utc::now()))
            .await
            .unwrap();
        assert_eq!(changed, 0);

        store
            .update_backorders(&[row.id], BackorderPatch::reopen())
            .await
            .unwrap();
        let rows = store.all_backorders().await;
        assert_eq!(rows[0].status, BackorderStatus::Pending);
        assert!(rows[0].fulfilled_date.is_none());
    }

    #[tokio::test]
    async fn reservation_ship_and_unship() {
        let store = InMemoryStore::new();
        let order_id = OrderId::new();
        let row = Reservation::new(order_id, key(), 2, Utc::now(), ChronoDuration::days(7));
        store.insert_reservations(vec![row.clone()]).await.unwrap();

        let now = Utc::now();
        assert_eq!(
            store
                .update_reservation(row.id, ReservationPatch::ship(now))
                .await
                .unwrap(),
            1
        );
        assert!(store.active_reservations(order_id).await.unwrap().is_empty());

        store
            .update_reservation(row.id, ReservationPatch::unship())
            .await
            .unwrap();
        let active = store.active_reservations(order_id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status, ReservationStatus::Reserved);
        assert!(active[0].ship_date.is_none());
    }

    #[tokio::test]
    async fn injected_fault_fires_until_cleared() {
        let store = InMemoryStore::new();
        let k = key();
        store.seed_stock(k, 5).await;
        store.fail_on(StoreOp::GetStock);

        assert!(matches!(
            store.get_stock(k).await,
            Err(StoreError::WriteFailed { .. })
        ));

        store.clear_failures();
        assert!(store.get_stock(k).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn keyed_fault_only_hits_one_pair() {
        let store = InMemoryStore::new();
        let hit = key();
        let spared = key();
        store.seed_stock(hit, 5).await;
        store.seed_stock(spared, 5).await;
        store.fail_on_stock(StoreOp::UpdateStock, hit);

        assert!(store.update_stock(hit, 1, Version::first()).await.is_err());
        assert!(store.update_stock(spared, 1, Version::first()).await.is_ok());
    }

    #[tokio::test]
    async fn fail_after_lets_first_calls_through() {
        let store = InMemoryStore::new();
        store.fail_after(StoreOp::InsertMovement, 1);
        let row = StockMovement::receipt(key(), 1, Utc::now());

        assert!(store.insert_movement(row.clone()).await.is_ok());
        assert!(store.insert_movement(row).await.is_err());
        assert_eq!(store.all_movements().await.len(), 1);
    }

    #[tokio::test]
    async fn fail_nth_fires_once() {
        let store = InMemoryStore::new();
        store.fail_nth(StoreOp::InsertMovement, 1);
        let row = StockMovement::receipt(key(), 1, Utc::now());

        assert!(store.insert_movement(row.clone()).await.is_ok());
        assert!(store.insert_movement(row.clone()).await.is_err());
        assert!(store.insert_movement(row).await.is_ok());
        assert_eq!(store.all_movements().await.len(), 2);
    }

    #[tokio::test]
    async fn movements_filter_by_warehouse_either_side() {
        let store = InMemoryStore::new();
        let product = ProductId::new();
        let a = WarehouseId::new();
        let b = WarehouseId::new();
        let c = WarehouseId::new();
        let now = Utc::now();

        store
            .insert_movement(StockMovement::transfer(product, 1, a, b, now))
            .await
            .unwrap();
        store
            .insert_movement(StockMovement::transfer(product, 1, c, a, now))
            .await
            .unwrap();
        store
            .insert_movement(StockMovement::transfer(product, 1, b, c, now))
            .await
            .unwrap();

        let rows = store
            .list_movements(MovementFilter::new().warehouse(a))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }
}
