//! Fulfillment service providing one entry point for every operation.

use chrono::Utc;
use common::{OrderId, StockKey};
use serde::Serialize;
use store::{
    Backorder, BackorderFilter, InventoryStore, MovementFilter, Order, Reservation,
    ReservationFilter, StockEntry, StockMovement,
};

use crate::backorder::{BackorderDrainer, DrainReport};
use crate::cancellation::{CancelOutcome, OrderCanceller};
use crate::commands::{
    CancelOrder, DrainBackorders, PlaceOrder, ReceiveStock, ReserveStock, ShipOrder,
    TransferStock,
};
use crate::compensation::{Compensation, CompensationLog};
use crate::config::FulfillmentConfig;
use crate::error::{FulfillmentError, Result};
use crate::ledger::StockLedger;
use crate::receiving::{ReceiptOutcome, ReceiptProcessor};
use crate::reservation::{ReservationManager, ReserveOutcome};
use crate::shipment::{ShipmentOutcome, ShipmentProcessor};
use crate::transfer::{TransferEngine, TransferOutcome};

/// A reservation as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationView {
    #[serde(flatten)]
    pub reservation: Reservation,
    /// Held past its expiry date. Nothing releases expired stock.
    pub is_expired: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacedOrder {
    pub order_id: OrderId,
    #[serde(flatten)]
    pub outcome: ReserveOutcome,
}

/// Stock landed at a pair, optionally followed by a drain of its queue.
///
/// A drain failure does not undo the stock movement, so it is reported
/// alongside the successful movement instead of as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Restock<T> {
    #[serde(flatten)]
    pub movement: T,
    pub backorders: Option<DrainReport>,
    pub drain_error: Option<String>,
}

/// Facade over the ledger and every fulfillment component.
#[derive(Clone)]
pub struct FulfillmentService<S> {
    ledger: StockLedger<S>,
    config: FulfillmentConfig,
    reservations: ReservationManager<S>,
    shipments: ShipmentProcessor<S>,
    drainer: BackorderDrainer<S>,
    transfers: TransferEngine<S>,
    receipts: ReceiptProcessor<S>,
    cancellations: OrderCanceller<S>,
}

impl<S: InventoryStore + Clone> FulfillmentService<S> {
    pub fn new(store: S, config: FulfillmentConfig) -> Self {
        let ledger = StockLedger::new(store, config.adjust_attempts);
        Self {
            reservations: ReservationManager::new(ledger.clone(), config.clone()),
            shipments: ShipmentProcessor::new(ledger.clone()),
            drainer: BackorderDrainer::new(ledger.clone(), config.clone()),
            transfers: TransferEngine::new(ledger.clone()),
            receipts: ReceiptProcessor::new(ledger.clone()),
            cancellations: OrderCanceller::new(ledger.clone()),
            ledger,
            config,
        }
    }
}

impl<S: InventoryStore> FulfillmentService<S> {
    pub fn store(&self) -> &S {
        self.ledger.store()
    }

    pub fn config(&self) -> &FulfillmentConfig {
        &self.config
    }

    pub async fn reserve(&self, cmd: ReserveStock) -> Result<ReserveOutcome> {
        self.reservations.reserve(cmd).await
    }

    pub async fn ship(&self, cmd: ShipOrder) -> Result<ShipmentOutcome> {
        self.shipments.ship(cmd).await
    }

    pub async fn drain_backorders(&self, cmd: DrainBackorders) -> Result<DrainReport> {
        self.drainer.drain(cmd).await
    }

    /// Transfers stock, then drains the destination queue when asked to.
    pub async fn transfer_stock(&self, cmd: TransferStock) -> Result<Restock<TransferOutcome>> {
        let movement = self.transfers.transfer(&cmd).await?;
        let drain = cmd.drain_backorders;
        Ok(self.restock(movement, cmd.destination(), drain).await)
    }

    /// Books a receipt, then drains the pair's queue when asked to or when
    /// the service is configured to drain on every receipt.
    pub async fn receive_stock(&self, cmd: ReceiveStock) -> Result<Restock<ReceiptOutcome>> {
        let movement = self.receipts.receive(&cmd).await?;
        let drain = cmd.drain_backorders || self.config.auto_drain_on_receipt;
        Ok(self.restock(movement, cmd.key(), drain).await)
    }

    pub async fn cancel_order(&self, cmd: CancelOrder) -> Result<CancelOutcome> {
        self.cancellations.cancel(cmd).await
    }

    /// Creates a pending order and reserves its line. The order is removed
    /// again if the reservation path fails.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<PlacedOrder> {
        cmd.validate()?;
        self.store()
            .insert_order(Order::new(cmd.order_id, Utc::now()))
            .await?;

        let mut log = CompensationLog::new("place_order");
        log.record(Compensation::DeleteOrder(cmd.order_id));

        match self.reservations.reserve(cmd.reserve()).await {
            Ok(outcome) => {
                metrics::counter!("fulfillment_orders_placed_total").increment(1);
                Ok(PlacedOrder {
                    order_id: cmd.order_id,
                    outcome,
                })
            }
            Err(e) => Err(log.unwind(&self.ledger, e).await),
        }
    }

    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.store()
            .get_order(id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("order", id))
    }

    pub async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<ReservationView>> {
        let now = Utc::now();
        let rows = self
            .store()
            .find_reservations(ReservationFilter::for_order(order_id))
            .await?;
        Ok(rows
            .into_iter()
            .map(|reservation| ReservationView {
                is_expired: reservation.is_expired(now),
                reservation,
            })
            .collect())
    }

    pub async fn backorders_for_order(&self, order_id: OrderId) -> Result<Vec<Backorder>> {
        Ok(self
            .store()
            .find_backorders(BackorderFilter::for_order(order_id))
            .await?)
    }

    pub async fn list_stock(&self) -> Result<Vec<StockEntry>> {
        Ok(self.store().list_stock().await?)
    }

    pub async fn list_movements(&self, filter: MovementFilter) -> Result<Vec<StockMovement>> {
        Ok(self.store().list_movements(filter).await?)
    }

    async fn restock<T>(&self, movement: T, key: StockKey, drain: bool) -> Restock<T> {
        if !drain {
            return Restock {
                movement,
                backorders: None,
                drain_error: None,
            };
        }

        match self.drainer.drain(key.into()).await {
            Ok(report) => Restock {
                movement,
                backorders: Some(report),
                drain_error: None,
            },
            Err(e) => {
                tracing::warn!(%key, error = %e, "drain after restock failed");
                Restock {
                    movement,
                    backorders: None,
                    drain_error: Some(e.to_string()),
                }
            }
        }
    }
}
