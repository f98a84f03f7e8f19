pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;
pub mod timeout;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, StoreOp};
pub use model::{
    Backorder, BackorderStatus, MovementStatus, Order, OrderStatus, Reservation,
    ReservationStatus, StockEntry, StockMovement, UnknownStatus, Version,
};
pub use postgres::PostgresStore;
pub use store::{
    BackorderFilter, BackorderPatch, InventoryStore, InventoryStoreExt, MovementFilter,
    OrderPatch, ReservationFilter, ReservationPatch,
};
pub use timeout::{DEFAULT_STORE_TIMEOUT, TimeoutStore};
