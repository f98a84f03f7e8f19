//! Shared identifier types for the inventory fulfillment system.

mod types;

pub use types::{
    BackorderId, MovementId, OrderId, ProductId, ReservationId, StockKey, WarehouseId,
};
