//! Route handlers, grouped by resource.

pub mod fulfillment;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod stock;
