//! Backorder drainer: converts queued demand into reservations, oldest first.

use std::time::Instant;

use chrono::Utc;
use common::{BackorderId, OrderId, ReservationId};
use serde::Serialize;
use store::{
    Backorder, BackorderPatch, InventoryStore, InventoryStoreExt, OrderPatch, OrderStatus,
    Reservation,
};

use crate::audit;
use crate::commands::DrainBackorders;
use crate::compensation::{Compensation, CompensationLog};
use crate::config::FulfillmentConfig;
use crate::error::{FulfillmentError, Result};
use crate::ledger::StockLedger;

/// Result of one pass over a pair's backorder queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Backorders converted into reservations.
    pub fulfilled: Vec<BackorderId>,
    /// Backorders that met some stock but not enough; left pending.
    pub partial: Vec<BackorderId>,
    /// Backorders reached after stock ran out; left pending.
    pub unfulfillable: Vec<BackorderId>,
    pub remaining_stock: u32,
    /// Reservations created for the fulfilled backorders, in the same order.
    pub reservations: Vec<ReservationId>,
}

/// How available stock splits across a FIFO queue. Backorders are never split.
#[derive(Debug, PartialEq, Eq)]
pub struct DrainPlan<'a> {
    pub fulfillable: Vec<&'a Backorder>,
    pub partial: Vec<BackorderId>,
    pub unfulfillable: Vec<BackorderId>,
    pub remaining: u32,
}

impl<'a> DrainPlan<'a> {
    /// Walks `queue` (already oldest first) against `available` units.
    pub fn build(available: u32, queue: &'a [Backorder]) -> Self {
        let mut plan = DrainPlan {
            fulfillable: Vec::new(),
            partial: Vec::new(),
            unfulfillable: Vec::new(),
            remaining: available,
        };

        for backorder in queue {
            if plan.remaining == 0 {
                plan.unfulfillable.push(backorder.id);
            } else if plan.remaining >= backorder.quantity_needed {
                plan.remaining -= backorder.quantity_needed;
                plan.fulfillable.push(backorder);
            } else {
                plan.partial.push(backorder.id);
            }
        }
        plan
    }
}

#[derive(Clone)]
pub struct BackorderDrainer<S> {
    ledger: StockLedger<S>,
    config: FulfillmentConfig,
}

impl<S: InventoryStore> BackorderDrainer<S> {
    pub fn new(ledger: StockLedger<S>, config: FulfillmentConfig) -> Self {
        Self { ledger, config }
    }

    /// Fulfills as many pending backorders of the pair as current stock
    /// allows, in creation order.
    #[tracing::instrument(skip(self, cmd), fields(key = %cmd.key()))]
    pub async fn drain(&self, cmd: DrainBackorders) -> Result<DrainReport> {
        let started = Instant::now();
        let store = self.ledger.store();
        let key = cmd.key();

        let entry = self.ledger.read(key).await?;
        let queue = store.pending_backorders(key).await?;
        let plan = DrainPlan::build(entry.quantity, &queue);

        let mut report = DrainReport {
            fulfilled: plan.fulfillable.iter().map(|b| b.id).collect(),
            partial: plan.partial.clone(),
            unfulfillable: plan.unfulfillable.clone(),
            remaining_stock: entry.quantity,
            reservations: Vec::new(),
        };

        if plan.fulfillable.is_empty() {
            tracing::debug!(pending = queue.len(), "nothing to fulfill");
            return Ok(report);
        }

        let now = Utc::now();
        let reservations: Vec<Reservation> = plan
            .fulfillable
            .iter()
            .map(|b| {
                Reservation::new(
                    b.order_id,
                    key,
                    b.quantity_needed,
                    now,
                    self.config.reservation_ttl,
                )
            })
            .collect();
        let reservation_ids: Vec<ReservationId> = reservations.iter().map(|r| r.id).collect();
        let order_ids: Vec<OrderId> = plan.fulfillable.iter().map(|b| b.order_id).collect();

        let mut log = CompensationLog::new("drain");
        log.record(Compensation::DeleteReservations(reservation_ids.clone()));
        if let Err(e) = store.insert_reservations(reservations).await {
            return Err(log.unwind(&self.ledger, e.into()).await);
        }

        // One row at a time so the log knows exactly which rows this pass flipped.
        for backorder in &plan.fulfillable {
            match store
                .update_backorders(&[backorder.id], BackorderPatch::fulfil(now))
                .await
            {
                Ok(1) => log.record(Compensation::ReopenBackorders(vec![backorder.id])),
                Ok(_) => {
                    let err = FulfillmentError::conflict(format!("backorder {}", backorder.id));
                    return Err(log.unwind(&self.ledger, err).await);
                }
                Err(e) => return Err(log.unwind(&self.ledger, e.into()).await),
            }
        }

        match self.ledger.set(&entry, plan.remaining).await {
            Ok(updated) => report.remaining_stock = updated.quantity,
            Err(e) => return Err(log.unwind(&self.ledger, e).await),
        }
        report.reservations = reservation_ids;

        audit::propagate_order_status(
            store,
            &order_ids,
            OrderPatch::status(OrderStatus::Processing),
        )
        .await;

        metrics::counter!("fulfillment_backorders_fulfilled_total")
            .increment(report.fulfilled.len() as u64);
        metrics::counter!("fulfillment_reservations_total")
            .increment(report.reservations.len() as u64);
        metrics::histogram!("fulfillment_operation_duration_seconds", "operation" => "drain")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(
            fulfilled = report.fulfilled.len(),
            partial = report.partial.len(),
            unfulfillable = report.unfulfillable.len(),
            remaining = report.remaining_stock,
            "backorders drained"
        );

        Ok(report)
    }
}
