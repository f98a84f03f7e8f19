//! Shipment processor: ships every active reservation of an order.

use std::time::Instant;

use chrono::{DateTime, Utc};
use common::{OrderId, ReservationId};
use serde::Serialize;
use store::{InventoryStore, InventoryStoreExt, OrderPatch, ReservationPatch, StockMovement};

use crate::audit;
use crate::commands::ShipOrder;
use crate::compensation::{Compensation, CompensationLog};
use crate::error::{FulfillmentError, Result};
use crate::ledger::StockLedger;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShipmentOutcome {
    pub order_id: OrderId,
    pub ship_date: DateTime<Utc>,
    pub reservations: Vec<ReservationId>,
    /// Audit rows actually written; may be short of `reservations`.
    pub movements_recorded: usize,
}

#[derive(Clone)]
pub struct ShipmentProcessor<S> {
    ledger: StockLedger<S>,
}

impl<S: InventoryStore> ShipmentProcessor<S> {
    pub fn new(ledger: StockLedger<S>) -> Self {
        Self { ledger }
    }

    /// Flips every `Reserved` reservation of the order to `Shipped`.
    ///
    /// Stock is not touched: it left the ledger when it was reserved.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn ship(&self, cmd: ShipOrder) -> Result<ShipmentOutcome> {
        let started = Instant::now();
        let store = self.ledger.store();
        let ship_date = cmd.ship_date.unwrap_or_else(Utc::now);

        let reservations = store.active_reservations(cmd.order_id).await?;
        if reservations.is_empty() {
            return Err(FulfillmentError::not_found(
                "active reservation for order",
                cmd.order_id,
            ));
        }

        let mut log = CompensationLog::new("ship");
        for reservation in &reservations {
            // Recorded before the write: a timed-out update may still land.
            log.record(Compensation::UnshipReservations(vec![reservation.id]));

            match store
                .update_reservation(reservation.id, ReservationPatch::ship(ship_date))
                .await
            {
                Ok(1) => {}
                Ok(_) => {
                    // Someone else moved the row; it is not ours to unship.
                    log.discard_last();
                    let err = FulfillmentError::conflict(format!("reservation {}", reservation.id));
                    return Err(log.unwind(&self.ledger, err).await);
                }
                Err(e) => return Err(log.unwind(&self.ledger, e.into()).await),
            }
        }

        let movements = reservations
            .iter()
            .map(|r| StockMovement::shipment(r, ship_date))
            .collect();
        let movements_recorded = audit::record_movements(store, movements).await;

        audit::propagate_order_status(store, &[cmd.order_id], OrderPatch::shipped(ship_date))
            .await;

        metrics::counter!("fulfillment_shipments_total").increment(1);
        metrics::histogram!("fulfillment_operation_duration_seconds", "operation" => "ship")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(count = reservations.len(), "order shipped");

        Ok(ShipmentOutcome {
            order_id: cmd.order_id,
            ship_date,
            reservations: reservations.iter().map(|r| r.id).collect(),
            movements_recorded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::{ProductId, StockKey, WarehouseId};
    use store::{
        InMemoryStore, MovementStatus, OrderStatus, Reservation, ReservationStatus, StoreOp,
    };

    async fn seeded(lines: u32) -> (InMemoryStore, ShipmentProcessor<InMemoryStore>, OrderId) {
        let store = InMemoryStore::new();
        let order_id = OrderId::new();
        store.seed_order(order_id).await;
        let rows = (0..lines)
            .map(|_| {
                let key = StockKey::new(ProductId::new(), WarehouseId::new());
                Reservation::new(order_id, key, 2, Utc::now(), Duration::days(7))
            })
            .collect();
        store.insert_reservations(rows).await.unwrap();
        let processor = ShipmentProcessor::new(StockLedger::new(store.clone(), 3));
        (store, processor, order_id)
    }

    #[tokio::test]
    async fn ships_every_reservation() {
        let (store, processor, order_id) = seeded(2).await;
        let ship_date = Utc::now();

        let outcome = processor
            .ship(ShipOrder::new(order_id).at(ship_date))
            .await
            .unwrap();
        assert_eq!(outcome.reservations.len(), 2);
        assert_eq!(outcome.movements_recorded, 2);

        for row in store.all_reservations().await {
            assert_eq!(row.status, ReservationStatus::Shipped);
            assert_eq!(row.ship_date, Some(ship_date));
        }
        let movements = store.all_movements().await;
        assert!(movements.iter().all(|m| m.status == MovementStatus::Shipped
            && m.destination_warehouse_id.is_none()
            && m.order_id == Some(order_id)));

        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(order.fulfillment_date, Some(ship_date));
    }

    #[tokio::test]
    async fn nothing_to_ship_is_not_found() {
        let (store, processor, order_id) = seeded(1).await;
        processor.ship(ShipOrder::new(order_id)).await.unwrap();

        let err = processor.ship(ShipOrder::new(order_id)).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert_eq!(store.all_movements().await.len(), 1);
    }

    #[tokio::test]
    async fn partial_failure_unships_everything() {
        let (store, processor, order_id) = seeded(3).await;
        store.fail_nth(StoreOp::UpdateReservation, 2);

        let err = processor.ship(ShipOrder::new(order_id)).await.unwrap_err();
        assert_eq!(err.kind(), "store_write");

        for row in store.all_reservations().await {
            assert_eq!(row.status, ReservationStatus::Reserved);
            assert!(row.ship_date.is_none());
        }
        assert!(store.all_movements().await.is_empty());
        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn failed_unship_is_reported() {
        let (store, processor, order_id) = seeded(2).await;
        store.fail_after(StoreOp::UpdateReservation, 1);

        let err = processor.ship(ShipOrder::new(order_id)).await.unwrap_err();
        assert_eq!(err.kind(), "compensation_failed");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn racing_ships_leave_the_winner_shipped() {
        let (store, processor, order_id) = seeded(1).await;
        let other = processor.clone();
        store.set_latency(std::time::Duration::from_millis(50));

        let (a, b) = tokio::join!(
            processor.ship(ShipOrder::new(order_id)),
            other.ship(ShipOrder::new(order_id))
        );
        store.set_latency(std::time::Duration::ZERO);

        assert!(a.is_ok() != b.is_ok(), "exactly one ship must win");
        let loser = a.err().or(b.err()).unwrap();
        assert!(matches!(loser.kind(), "conflict" | "not_found"));

        let row = &store.all_reservations().await[0];
        assert_eq!(row.status, ReservationStatus::Shipped);
        assert!(row.ship_date.is_some());
        assert_eq!(store.all_movements().await.len(), 1);

        let err = processor.ship(ShipOrder::new(order_id)).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn audit_failure_still_ships() {
        let (store, processor, order_id) = seeded(1).await;
        store.fail_on(StoreOp::InsertMovement);
        store.fail_on(StoreOp::UpdateOrders);

        let outcome = processor.ship(ShipOrder::new(order_id)).await.unwrap();
        assert_eq!(outcome.movements_recorded, 0);
        assert_eq!(
            store.all_reservations().await[0].status,
            ReservationStatus::Shipped
        );
    }
}
