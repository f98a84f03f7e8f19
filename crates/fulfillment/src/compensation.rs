//! Compensating actions for multi-step operations.
//!
//! The store offers no transactions across calls, so each operation records
//! how to undo every write it makes. When a later step fails, the log is
//! unwound newest first.

use common::{BackorderId, OrderId, ReservationId, StockKey};
use store::{BackorderPatch, InventoryStore, ReservationPatch};

use crate::error::{FulfillmentError, Result};
use crate::ledger::StockLedger;

/// A single undo action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Remove reservation rows this operation inserted.
    DeleteReservations(Vec<ReservationId>),
    /// Flip reservations this operation shipped back to `Reserved`.
    UnshipReservations(Vec<ReservationId>),
    /// Return backorders this operation fulfilled to `Pending`.
    ReopenBackorders(Vec<BackorderId>),
    /// Give back stock this operation removed.
    CreditStock { key: StockKey, quantity: u32 },
    /// Take back stock this operation added.
    DebitStock { key: StockKey, quantity: u32 },
    /// Remove an order this operation created.
    DeleteOrder(OrderId),
}

impl Compensation {
    pub fn step(&self) -> &'static str {
        match self {
            Compensation::DeleteReservations(_) => "delete_reservations",
            Compensation::UnshipReservations(_) => "unship_reservations",
            Compensation::ReopenBackorders(_) => "reopen_backorders",
            Compensation::CreditStock { .. } => "credit_stock",
            Compensation::DebitStock { .. } => "debit_stock",
            Compensation::DeleteOrder(_) => "delete_order",
        }
    }

    async fn apply<S: InventoryStore>(&self, ledger: &StockLedger<S>) -> Result<()> {
        let store = ledger.store();
        match self {
            Compensation::DeleteReservations(ids) => {
                store.delete_reservations(ids).await?;
            }
            Compensation::UnshipReservations(ids) => {
                for id in ids {
                    store
                        .update_reservation(*id, ReservationPatch::unship())
                        .await?;
                }
            }
            Compensation::ReopenBackorders(ids) => {
                store
                    .update_backorders(ids, BackorderPatch::reopen())
                    .await?;
            }
            Compensation::CreditStock { key, quantity } => {
                ledger.adjust(*key, i64::from(*quantity)).await?;
            }
            Compensation::DebitStock { key, quantity } => {
                ledger.adjust(*key, -i64::from(*quantity)).await?;
            }
            Compensation::DeleteOrder(id) => {
                store.delete_order(*id).await?;
            }
        }
        Ok(())
    }
}

/// Undo actions recorded by one operation, in the order they were recorded.
#[derive(Debug)]
pub struct CompensationLog {
    operation: &'static str,
    steps: Vec<Compensation>,
}

impl CompensationLog {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, step: Compensation) {
        self.steps.push(step);
    }

    /// Drops the newest step, recorded ahead of a write that turned out
    /// to change nothing.
    pub fn discard_last(&mut self) -> Option<Compensation> {
        self.steps.pop()
    }

    pub fn steps(&self) -> &[Compensation] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every recorded step in reverse and returns the error to surface.
    ///
    /// All steps are attempted even if one fails. If any step fails the
    /// result is [`FulfillmentError::CompensationFailed`] wrapping `original`;
    /// otherwise `original` is returned unchanged.
    #[tracing::instrument(skip(self, ledger, original), fields(operation = self.operation))]
    pub async fn unwind<S: InventoryStore>(
        self,
        ledger: &StockLedger<S>,
        original: FulfillmentError,
    ) -> FulfillmentError {
        if self.steps.is_empty() {
            return original;
        }

        metrics::counter!("fulfillment_compensations_total", "operation" => self.operation)
            .increment(1);
        tracing::warn!(error = %original, steps = self.steps.len(), "compensating");

        let mut failure: Option<(&'static str, String)> = None;
        for step in self.steps.iter().rev() {
            match step.apply(ledger).await {
                Ok(()) => {
                    tracing::debug!(step = step.step(), "compensation step completed");
                }
                Err(e) => {
                    metrics::counter!(
                        "fulfillment_compensation_failures_total",
                        "operation" => self.operation,
                        "step" => step.step()
                    )
                    .increment(1);
                    tracing::error!(
                        step = step.step(),
                        error = %e,
                        original = %original,
                        "compensation step failed"
                    );
                    if failure.is_none() {
                        failure = Some((step.step(), e.to_string()));
                    }
                }
            }
        }

        match failure {
            Some((step, reason)) => FulfillmentError::CompensationFailed {
                step,
                reason,
                original: Box::new(original),
            },
            None => original,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use common::{ProductId, WarehouseId};
    use store::{InMemoryStore, Reservation, StoreOp};

    fn key() -> StockKey {
        StockKey::new(ProductId::new(), WarehouseId::new())
    }

    #[tokio::test]
    async fn empty_log_returns_original() {
        let ledger = StockLedger::new(InMemoryStore::new(), 3);
        let log = CompensationLog::new("test");
        let err = log
            .unwind(&ledger, FulfillmentError::validation("nope"))
            .await;
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn discard_last_drops_only_the_newest_step() {
        let mut log = CompensationLog::new("test");
        let first = ReservationId::new();
        let second = ReservationId::new();
        log.record(Compensation::UnshipReservations(vec![first]));
        log.record(Compensation::UnshipReservations(vec![second]));

        assert_eq!(
            log.discard_last(),
            Some(Compensation::UnshipReservations(vec![second]))
        );
        assert_eq!(log.steps(), &[Compensation::UnshipReservations(vec![first])]);
    }

    #[tokio::test]
    async fn unwinds_newest_first() {
        let store = InMemoryStore::new();
        let key = key();
        store.seed_stock(key, 5).await;
        let ledger = StockLedger::new(store.clone(), 3);

        let row = Reservation::new(
            common::OrderId::new(),
            key,
            2,
            Utc::now(),
            Duration::days(7),
        );
        store.insert_reservations(vec![row.clone()]).await.unwrap();

        let mut log = CompensationLog::new("test");
        log.record(Compensation::DeleteReservations(vec![row.id]));
        log.record(Compensation::CreditStock { key, quantity: 2 });
        assert_eq!(log.steps().len(), 2);

        let err = log
            .unwind(&ledger, FulfillmentError::conflict("stock"))
            .await;
        assert_eq!(err.kind(), "conflict");
        assert!(store.all_reservations().await.is_empty());
        assert_eq!(store.stock_quantity(key).await, Some(7));
    }

    #[tokio::test]
    async fn failed_step_wraps_original() {
        let store = InMemoryStore::new();
        store.fail_on(StoreOp::DeleteReservations);
        let ledger = StockLedger::new(store.clone(), 3);

        let mut log = CompensationLog::new("test");
        log.record(Compensation::DeleteReservations(vec![ReservationId::new()]));

        let err = log
            .unwind(&ledger, FulfillmentError::conflict("stock"))
            .await;
        match err {
            FulfillmentError::CompensationFailed { step, original, .. } => {
                assert_eq!(step, "delete_reservations");
                assert_eq!(original.kind(), "conflict");
            }
            other => panic!("expected compensation failure, got {other:?}"),
        }
    }
}
