//! Best-effort writes: movement audit rows and order status propagation.
//!
//! Failures here are logged and counted; they never change the outcome of
//! the operation that triggered them.

use common::OrderId;
use store::{InventoryStore, OrderPatch, StockMovement};

use crate::error::FulfillmentError;

fn report(record: &'static str, reason: String) {
    metrics::counter!("fulfillment_audit_write_failures_total", "record" => record).increment(1);
    let err = FulfillmentError::AuditWrite { record, reason };
    tracing::warn!(kind = err.kind(), error = %err, "best-effort write failed");
}

/// Appends movement rows, returning how many were stored.
pub(crate) async fn record_movements<S: InventoryStore>(
    store: &S,
    movements: Vec<StockMovement>,
) -> usize {
    let mut recorded = 0;
    for movement in movements {
        let id = movement.id;
        match store.insert_movement(movement).await {
            Ok(()) => recorded += 1,
            Err(e) => report("stock_movements", format!("movement {id}: {e}")),
        }
    }
    recorded
}

/// Applies `patch` to every listed order.
pub(crate) async fn propagate_order_status<S: InventoryStore>(
    store: &S,
    order_ids: &[OrderId],
    patch: OrderPatch,
) {
    let mut ids = order_ids.to_vec();
    ids.sort();
    ids.dedup();

    match store.update_orders(&ids, patch).await {
        Ok(updated) if updated < ids.len() as u64 => {
            tracing::warn!(
                status = %patch.status,
                expected = ids.len(),
                updated,
                "some orders were missing during status update"
            );
        }
        Ok(_) => {
            tracing::debug!(status = %patch.status, count = ids.len(), "order status updated");
        }
        Err(e) => report("orders", format!("status {}: {e}", patch.status)),
    }
}
