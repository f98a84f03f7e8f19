//! Reservation manager: turns an order line into a reservation or a backorder.

use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use store::{Backorder, InventoryStore, OrderPatch, OrderStatus, Reservation, StockEntry};

use crate::audit;
use crate::commands::ReserveStock;
use crate::compensation::{Compensation, CompensationLog};
use crate::config::FulfillmentConfig;
use crate::error::Result;
use crate::ledger::StockLedger;

/// What happened to a reserve request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReserveOutcome {
    /// Stock was deducted and is held for the order.
    Reserved { reservation: Reservation },
    /// Not enough stock; the demand was queued.
    Backordered { backorder: Backorder },
}

impl ReserveOutcome {
    pub fn is_reserved(&self) -> bool {
        matches!(self, ReserveOutcome::Reserved { .. })
    }

    pub fn reservation(&self) -> Option<&Reservation> {
        match self {
            ReserveOutcome::Reserved { reservation } => Some(reservation),
            ReserveOutcome::Backordered { .. } => None,
        }
    }

    pub fn backorder(&self) -> Option<&Backorder> {
        match self {
            ReserveOutcome::Reserved { .. } => None,
            ReserveOutcome::Backordered { backorder } => Some(backorder),
        }
    }
}

#[derive(Clone)]
pub struct ReservationManager<S> {
    ledger: StockLedger<S>,
    config: FulfillmentConfig,
}

impl<S: InventoryStore> ReservationManager<S> {
    pub fn new(ledger: StockLedger<S>, config: FulfillmentConfig) -> Self {
        Self { ledger, config }
    }

    /// Reserves stock for one order line, or backorders it when the row
    /// holds less than requested.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, key = %cmd.key(), quantity = cmd.quantity))]
    pub async fn reserve(&self, cmd: ReserveStock) -> Result<ReserveOutcome> {
        cmd.validate()?;
        let started = Instant::now();

        let entry = self.ledger.read(cmd.key()).await?;
        let outcome = if entry.quantity < cmd.quantity {
            self.backorder(&cmd, &entry).await?
        } else {
            self.hold(&cmd, &entry).await?
        };

        metrics::histogram!("fulfillment_operation_duration_seconds", "operation" => "reserve")
            .record(started.elapsed().as_secs_f64());
        Ok(outcome)
    }

    async fn backorder(&self, cmd: &ReserveStock, entry: &StockEntry) -> Result<ReserveOutcome> {
        let store = self.ledger.store();
        let backorder = Backorder::new(
            cmd.order_id,
            cmd.key(),
            cmd.quantity,
            entry.quantity,
            Utc::now(),
        );
        store.insert_backorder(backorder.clone()).await?;

        metrics::counter!("fulfillment_backorders_total").increment(1);
        tracing::info!(
            backorder_id = %backorder.id,
            available = entry.quantity,
            "insufficient stock, backorder created"
        );

        audit::propagate_order_status(
            store,
            &[cmd.order_id],
            OrderPatch::status(OrderStatus::Backordered),
        )
        .await;

        Ok(ReserveOutcome::Backordered { backorder })
    }

    async fn hold(&self, cmd: &ReserveStock, entry: &StockEntry) -> Result<ReserveOutcome> {
        let store = self.ledger.store();
        let reservation = Reservation::new(
            cmd.order_id,
            cmd.key(),
            cmd.quantity,
            Utc::now(),
            self.config.reservation_ttl,
        );

        // Recorded before the insert: a timed-out insert may still land.
        let mut log = CompensationLog::new("reserve");
        log.record(Compensation::DeleteReservations(vec![reservation.id]));

        if let Err(e) = store.insert_reservations(vec![reservation.clone()]).await {
            return Err(log.unwind(&self.ledger, e.into()).await);
        }

        if let Err(e) = self.ledger.debit(entry, cmd.quantity).await {
            return Err(log.unwind(&self.ledger, e).await);
        }

        metrics::counter!("fulfillment_reservations_total").increment(1);
        tracing::info!(reservation_id = %reservation.id, "stock reserved");

        audit::propagate_order_status(
            store,
            &[cmd.order_id],
            OrderPatch::status(OrderStatus::Processing),
        )
        .await;

        Ok(ReserveOutcome::Reserved { reservation })
    }
}
