//! Row types for the four inventory tables plus orders.

use chrono::{DateTime, Utc};
use common::{
    BackorderId, MovementId, OrderId, ProductId, ReservationId, StockKey, WarehouseId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a persisted status string has no matching variant.
#[derive(Debug, Clone, Error)]
#[error("unknown {kind} status: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

/// Row version used for optimistic concurrency on stock entries.
///
/// Every successful write to a stock row bumps the version by one, so a
/// conditional write carrying a stale version is rejected.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a freshly created row.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Quantity on hand for one (product, warehouse) pair.
///
/// Reservation is modelled as an immediate decrement: `quantity` is what is
/// still free to reserve, not the physical count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: u32,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockEntry {
    /// Creates a first-version row for a pair that has never held stock.
    pub fn new(key: StockKey, quantity: u32, now: DateTime<Utc>) -> Self {
        Self {
            product_id: key.product_id,
            warehouse_id: key.warehouse_id,
            quantity,
            version: Version::first(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.warehouse_id)
    }
}

/// Lifecycle status of a customer order.
///
/// ```text
/// Pending ──┬──► Processing ──► Shipped
///           └──► Backordered ──► Processing
/// (any non-shipped) ──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Backordered,
    Shipped,
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the order may still be cancelled.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Backordered
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Processing => "Processing",
            OrderStatus::Backordered => "Backordered",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OrderStatus::Pending),
            "Processing" => Ok(OrderStatus::Processing),
            "Backordered" => Ok(OrderStatus::Backordered),
            "Shipped" => Ok(OrderStatus::Shipped),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(UnknownStatus {
                kind: "order",
                value: other.to_string(),
            }),
        }
    }
}

/// A customer order as seen by the fulfillment engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub fulfillment_date: Option<DateTime<Utc>>,
}

impl Order {
    /// Creates a pending order placed at `now`.
    pub fn new(id: OrderId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: OrderStatus::Pending,
            order_date: now,
            fulfillment_date: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Reserved,
    Shipped,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Reserved => "Reserved",
            ReservationStatus::Shipped => "Shipped",
            ReservationStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Reserved" => Ok(ReservationStatus::Reserved),
            "Shipped" => Ok(ReservationStatus::Shipped),
            "Cancelled" => Ok(ReservationStatus::Cancelled),
            other => Err(UnknownStatus {
                kind: "reservation",
                value: other.to_string(),
            }),
        }
    }
}

/// Stock already deducted from the ledger on behalf of an order line.
///
/// The row's existence is the only record that the decrement happened, so a
/// reservation must never be decremented a second time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: u32,
    pub status: ReservationStatus,
    pub reservation_date: DateTime<Utc>,
    /// Advisory only; nothing expires reservations automatically.
    pub expiry_date: DateTime<Utc>,
    pub ship_date: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Creates a new `Reserved` row with the given lifetime. An expiry past
    /// the representable range saturates instead of overflowing.
    pub fn new(
        order_id: OrderId,
        key: StockKey,
        quantity: u32,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            order_id,
            product_id: key.product_id,
            warehouse_id: key.warehouse_id,
            quantity,
            status: ReservationStatus::Reserved,
            reservation_date: now,
            expiry_date: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            ship_date: None,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.warehouse_id)
    }

    /// Returns true if the reservation is still held past its expiry date.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Reserved && self.expiry_date < now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackorderStatus {
    Pending,
    Fulfilled,
    Cancelled,
}

impl BackorderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackorderStatus::Pending => "Pending",
            BackorderStatus::Fulfilled => "Fulfilled",
            BackorderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for BackorderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BackorderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(BackorderStatus::Pending),
            "Fulfilled" => Ok(BackorderStatus::Fulfilled),
            "Cancelled" => Ok(BackorderStatus::Cancelled),
            other => Err(UnknownStatus {
                kind: "backorder",
                value: other.to_string(),
            }),
        }
    }
}

/// Unmet demand queued until supply arrives at the pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backorder {
    pub id: BackorderId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity_needed: u32,
    pub quantity_available_at_creation: u32,
    pub status: BackorderStatus,
    pub created_at: DateTime<Utc>,
    pub fulfilled_date: Option<DateTime<Utc>>,
}

impl Backorder {
    /// Creates a new `Pending` backorder.
    pub fn new(
        order_id: OrderId,
        key: StockKey,
        quantity_needed: u32,
        quantity_available: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BackorderId::new(),
            order_id,
            product_id: key.product_id,
            warehouse_id: key.warehouse_id,
            quantity_needed,
            quantity_available_at_creation: quantity_available,
            status: BackorderStatus::Pending,
            created_at: now,
            fulfilled_date: None,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.warehouse_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementStatus {
    /// Left a warehouse towards a customer.
    Shipped,
    /// Inter-warehouse transfer finished.
    Completed,
    /// Arrived from a supplier.
    Received,
}

impl MovementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementStatus::Shipped => "Shipped",
            MovementStatus::Completed => "Completed",
            MovementStatus::Received => "Received",
        }
    }
}

impl std::fmt::Display for MovementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MovementStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Shipped" => Ok(MovementStatus::Shipped),
            "Completed" => Ok(MovementStatus::Completed),
            "Received" => Ok(MovementStatus::Received),
            other => Err(UnknownStatus {
                kind: "movement",
                value: other.to_string(),
            }),
        }
    }
}

/// Append-only audit row. Never consulted for invariant enforcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Absent for goods received from a supplier.
    pub source_warehouse_id: Option<WarehouseId>,
    /// Absent for goods shipped to a customer.
    pub destination_warehouse_id: Option<WarehouseId>,
    pub status: MovementStatus,
    pub transfer_date: DateTime<Utc>,
    pub order_id: Option<OrderId>,
}

impl StockMovement {
    /// Egress of reserved stock to the customer of `order_id`.
    pub fn shipment(reservation: &Reservation, ship_date: DateTime<Utc>) -> Self {
        Self {
            id: MovementId::new(),
            product_id: reservation.product_id,
            quantity: reservation.quantity,
            source_warehouse_id: Some(reservation.warehouse_id),
            destination_warehouse_id: None,
            status: MovementStatus::Shipped,
            transfer_date: ship_date,
            order_id: Some(reservation.order_id),
        }
    }

    /// Completed move between two warehouses.
    pub fn transfer(
        product_id: ProductId,
        quantity: u32,
        source: WarehouseId,
        destination: WarehouseId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            product_id,
            quantity,
            source_warehouse_id: Some(source),
            destination_warehouse_id: Some(destination),
            status: MovementStatus::Completed,
            transfer_date: now,
            order_id: None,
        }
    }

    /// Goods arriving at a warehouse from outside the network.
    pub fn receipt(key: StockKey, quantity: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: MovementId::new(),
            product_id: key.product_id,
            quantity,
            source_warehouse_id: None,
            destination_warehouse_id: Some(key.warehouse_id),
            status: MovementStatus::Received,
            transfer_date: now,
            order_id: None,
        }
    }
}
