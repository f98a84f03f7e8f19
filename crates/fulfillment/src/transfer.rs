//! Transfer engine: moves stock between warehouses.

use std::time::Instant;

use chrono::Utc;
use common::{ProductId, WarehouseId};
use serde::Serialize;
use store::{InventoryStore, StockMovement};

use crate::audit;
use crate::commands::TransferStock;
use crate::compensation::{Compensation, CompensationLog};
use crate::error::{FulfillmentError, Result};
use crate::ledger::StockLedger;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferOutcome {
    pub product_id: ProductId,
    pub quantity: u32,
    pub source_warehouse_id: WarehouseId,
    pub destination_warehouse_id: WarehouseId,
    pub source_remaining: u32,
    pub destination_quantity: u32,
    pub movement_recorded: bool,
}

#[derive(Clone)]
pub struct TransferEngine<S> {
    ledger: StockLedger<S>,
}

impl<S: InventoryStore> TransferEngine<S> {
    pub fn new(ledger: StockLedger<S>) -> Self {
        Self { ledger }
    }

    /// Debits the source, credits (or creates) the destination and records
    /// a `Completed` movement. A failed credit puts the stock back on the
    /// source. Backorders are not drained here.
    #[tracing::instrument(skip(self, cmd), fields(
        product_id = %cmd.product_id,
        source = %cmd.source_warehouse_id,
        destination = %cmd.destination_warehouse_id,
        quantity = cmd.quantity
    ))]
    pub async fn transfer(&self, cmd: &TransferStock) -> Result<TransferOutcome> {
        cmd.validate()?;
        let started = Instant::now();

        let source = self.ledger.read(cmd.source()).await?;
        if cmd.quantity > source.quantity {
            return Err(FulfillmentError::InsufficientStock {
                key: cmd.source(),
                requested: cmd.quantity,
                available: source.quantity,
            });
        }

        let debited = self.ledger.debit(&source, cmd.quantity).await?;

        let mut log = CompensationLog::new("transfer");
        log.record(Compensation::CreditStock {
            key: cmd.source(),
            quantity: cmd.quantity,
        });

        let destination = match self.ledger.deposit(cmd.destination(), cmd.quantity).await {
            Ok(entry) => entry,
            Err(e) => return Err(log.unwind(&self.ledger, e).await),
        };

        let movement = StockMovement::transfer(
            cmd.product_id,
            cmd.quantity,
            cmd.source_warehouse_id,
            cmd.destination_warehouse_id,
            Utc::now(),
        );
        let recorded = audit::record_movements(self.ledger.store(), vec![movement]).await;

        metrics::counter!("fulfillment_transfers_total").increment(1);
        metrics::histogram!("fulfillment_operation_duration_seconds", "operation" => "transfer")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(
            source_remaining = debited.quantity,
            destination_quantity = destination.quantity,
            "stock transferred"
        );

        Ok(TransferOutcome {
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            source_warehouse_id: cmd.source_warehouse_id,
            destination_warehouse_id: cmd.destination_warehouse_id,
            source_remaining: debited.quantity,
            destination_quantity: destination.quantity,
            movement_recorded: recorded == 1,
        })
    }
}
