//! Goods receipt: books incoming stock at a warehouse.

use chrono::Utc;
use common::{ProductId, WarehouseId};
use serde::Serialize;
use store::{InventoryStore, StockMovement};

use crate::audit;
use crate::commands::ReceiveStock;
use crate::error::Result;
use crate::ledger::StockLedger;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptOutcome {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: u32,
    pub on_hand: u32,
    pub movement_recorded: bool,
}

#[derive(Clone)]
pub struct ReceiptProcessor<S> {
    ledger: StockLedger<S>,
}

impl<S: InventoryStore> ReceiptProcessor<S> {
    pub fn new(ledger: StockLedger<S>) -> Self {
        Self { ledger }
    }

    /// Credits the pair, creating its stock row on first receipt.
    #[tracing::instrument(skip(self, cmd), fields(key = %cmd.key(), quantity = cmd.quantity))]
    pub async fn receive(&self, cmd: &ReceiveStock) -> Result<ReceiptOutcome> {
        cmd.validate()?;

        let entry = self.ledger.deposit(cmd.key(), cmd.quantity).await?;
        let movement = StockMovement::receipt(cmd.key(), cmd.quantity, Utc::now());
        let recorded = audit::record_movements(self.ledger.store(), vec![movement]).await;

        metrics::counter!("fulfillment_receipts_total").increment(1);
        tracing::info!(on_hand = entry.quantity, "goods received");

        Ok(ReceiptOutcome {
            product_id: cmd.product_id,
            warehouse_id: cmd.warehouse_id,
            quantity: cmd.quantity,
            on_hand: entry.quantity,
            movement_recorded: recorded == 1,
        })
    }
}
