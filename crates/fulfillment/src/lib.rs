//! Stock reservation and fulfillment engine.
//!
//! Multi-step inventory operations run against a store with no transactions
//! across calls. Each operation records compensating actions as it writes
//! and unwinds them newest first when a later step fails:
//!
//! 1. Reserve: hold stock for an order line or queue a backorder
//! 2. Ship: flip active reservations to shipped
//! 3. Drain: convert queued backorders into reservations, oldest first
//! 4. Transfer: move stock between warehouses, crediting the source back on failure

mod audit;
pub mod backorder;
pub mod cancellation;
pub mod commands;
pub mod compensation;
pub mod config;
pub mod error;
pub mod ledger;
pub mod receiving;
pub mod reservation;
pub mod service;
pub mod shipment;
pub mod transfer;

pub use backorder::{BackorderDrainer, DrainPlan, DrainReport};
pub use cancellation::{CancelOutcome, OrderCanceller};
pub use commands::{
    CancelOrder, DrainBackorders, PlaceOrder, ReceiveStock, ReserveStock, ShipOrder,
    TransferStock,
};
pub use compensation::{Compensation, CompensationLog};
pub use config::{DEFAULT_RESERVATION_TTL_DAYS, FulfillmentConfig, MAX_RESERVATION_TTL_DAYS};
pub use error::{FulfillmentError, Result};
pub use ledger::StockLedger;
pub use receiving::{ReceiptOutcome, ReceiptProcessor};
pub use reservation::{ReservationManager, ReserveOutcome};
pub use service::{FulfillmentService, PlacedOrder, ReservationView, Restock};
pub use shipment::{ShipmentOutcome, ShipmentProcessor};
pub use transfer::{TransferEngine, TransferOutcome};
