//! Order cancellation: releases held stock and withdraws queued demand.

use common::{BackorderId, OrderId, ReservationId};
use serde::Serialize;
use store::{
    BackorderFilter, BackorderPatch, BackorderStatus, InventoryStore, InventoryStoreExt,
    OrderStatus, Reservation, ReservationPatch,
};

use crate::commands::CancelOrder;
use crate::compensation::{Compensation, CompensationLog};
use crate::error::{FulfillmentError, Result};
use crate::ledger::StockLedger;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelOutcome {
    pub order_id: OrderId,
    /// Reservations whose stock went back on the shelf.
    pub released: Vec<ReservationId>,
    pub cancelled_backorders: Vec<BackorderId>,
}

#[derive(Clone)]
pub struct OrderCanceller<S> {
    ledger: StockLedger<S>,
}

impl<S: InventoryStore> OrderCanceller<S> {
    pub fn new(ledger: StockLedger<S>) -> Self {
        Self { ledger }
    }

    /// Cancels an order that has not shipped.
    ///
    /// Each reservation is released on its own: stock is credited back and
    /// the row marked `Cancelled`, or the credit is undone. A failure part
    /// way leaves earlier lines released; calling again finishes the job.
    ///
    /// Reservations are read before pending backorders are withdrawn. A drain
    /// that fulfils one of the order's backorders in between leaves a
    /// `Reserved` row on a `Cancelled` order, which a second cancel refuses
    /// to touch.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn cancel(&self, cmd: CancelOrder) -> Result<CancelOutcome> {
        let store = self.ledger.store();
        let order = store
            .get_order(cmd.order_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("order", cmd.order_id))?;

        if !order.status.can_cancel() {
            return Err(FulfillmentError::validation(format!(
                "order {} is {} and cannot be cancelled",
                order.id, order.status
            )));
        }

        let mut released = Vec::new();
        for reservation in store.active_reservations(cmd.order_id).await? {
            self.release(&reservation).await?;
            released.push(reservation.id);
        }

        let pending: Vec<BackorderId> = store
            .find_backorders(
                BackorderFilter::for_order(cmd.order_id).status(BackorderStatus::Pending),
            )
            .await?
            .into_iter()
            .map(|b| b.id)
            .collect();
        if !pending.is_empty() {
            store
                .update_backorders(&pending, BackorderPatch::cancel())
                .await?;
        }

        store
            .set_order_status(cmd.order_id, OrderStatus::Cancelled)
            .await?;

        metrics::counter!("fulfillment_cancellations_total").increment(1);
        tracing::info!(
            released = released.len(),
            backorders = pending.len(),
            "order cancelled"
        );

        Ok(CancelOutcome {
            order_id: cmd.order_id,
            released,
            cancelled_backorders: pending,
        })
    }

    async fn release(&self, reservation: &Reservation) -> Result<()> {
        let store = self.ledger.store();
        self.ledger
            .adjust(reservation.key(), i64::from(reservation.quantity))
            .await?;

        let mut log = CompensationLog::new("cancel");
        log.record(Compensation::DebitStock {
            key: reservation.key(),
            quantity: reservation.quantity,
        });

        match store
            .update_reservation(reservation.id, ReservationPatch::cancel())
            .await
        {
            Ok(1) => Ok(()),
            Ok(_) => {
                let err = FulfillmentError::conflict(format!("reservation {}", reservation.id));
                Err(log.unwind(&self.ledger, err).await)
            }
            Err(e) => Err(log.unwind(&self.ledger, e.into()).await),
        }
    }
}
