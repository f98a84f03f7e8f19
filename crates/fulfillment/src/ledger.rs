//! Stock ledger: the only writer of quantity-on-hand.

use chrono::Utc;
use common::StockKey;
use store::{InventoryStore, StockEntry, StoreError};

use crate::error::{FulfillmentError, Result};

/// Read-compare-write access to stock rows.
///
/// Every write is conditional on the version of the row that was read, so a
/// concurrent writer surfaces as [`FulfillmentError::Conflict`] instead of a
/// lost update.
#[derive(Clone)]
pub struct StockLedger<S> {
    store: S,
    attempts: u32,
}

impl<S: InventoryStore> StockLedger<S> {
    pub fn new(store: S, attempts: u32) -> Self {
        Self {
            store,
            attempts: attempts.max(1),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reads a stock row, failing with `NotFound` when the pair has none.
    pub async fn read(&self, key: StockKey) -> Result<StockEntry> {
        self.store
            .get_stock(key)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("stock", key))
    }

    /// Writes an absolute quantity, conditional on `entry.version`.
    pub async fn set(&self, entry: &StockEntry, quantity: u32) -> Result<StockEntry> {
        let updated = self
            .store
            .update_stock(entry.key(), quantity, entry.version)
            .await?;
        tracing::debug!(
            key = %entry.key(),
            from = entry.quantity,
            to = quantity,
            version = %updated.version,
            "stock written"
        );
        Ok(updated)
    }

    /// Removes `quantity` from a row previously read.
    pub async fn debit(&self, entry: &StockEntry, quantity: u32) -> Result<StockEntry> {
        let remaining = entry.quantity.checked_sub(quantity).ok_or(
            FulfillmentError::InsufficientStock {
                key: entry.key(),
                requested: quantity,
                available: entry.quantity,
            },
        )?;
        self.set(entry, remaining).await
    }

    /// Adds `quantity` to a row previously read.
    pub async fn credit(&self, entry: &StockEntry, quantity: u32) -> Result<StockEntry> {
        let total = entry
            .quantity
            .checked_add(quantity)
            .ok_or_else(|| FulfillmentError::validation("stock quantity would overflow"))?;
        self.set(entry, total).await
    }

    /// Applies a signed delta, re-reading and retrying when the row moves
    /// underneath. Used where the write must land even under contention.
    pub async fn adjust(&self, key: StockKey, delta: i64) -> Result<StockEntry> {
        for attempt in 1..=self.attempts {
            let entry = self.read(key).await?;
            let target = i64::from(entry.quantity) + delta;
            if target < 0 {
                return Err(FulfillmentError::InsufficientStock {
                    key,
                    requested: u32::try_from(delta.unsigned_abs()).unwrap_or(u32::MAX),
                    available: entry.quantity,
                });
            }
            let quantity = u32::try_from(target)
                .map_err(|_| FulfillmentError::validation("stock quantity would overflow"))?;

            match self.store.update_stock(key, quantity, entry.version).await {
                Ok(updated) => return Ok(updated),
                Err(StoreError::ConcurrencyConflict { .. }) => {
                    tracing::debug!(%key, attempt, "stock adjust raced, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(FulfillmentError::conflict(format!("stock {key}")))
    }

    /// Credits a pair, creating its row on first arrival.
    pub async fn deposit(&self, key: StockKey, quantity: u32) -> Result<StockEntry> {
        for attempt in 1..=self.attempts {
            match self.store.get_stock(key).await? {
                Some(entry) => match self.credit(&entry, quantity).await {
                    Err(FulfillmentError::Conflict { .. }) => {
                        tracing::debug!(%key, attempt, "stock deposit raced, retrying");
                    }
                    other => return other,
                },
                None => {
                    let entry = StockEntry::new(key, quantity, Utc::now());
                    match self.store.insert_stock(entry).await {
                        Ok(created) => {
                            tracing::info!(%key, quantity, "stock row created");
                            return Ok(created);
                        }
                        Err(StoreError::AlreadyExists { .. }) => {
                            tracing::debug!(%key, attempt, "stock row appeared, retrying");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        Err(FulfillmentError::conflict(format!("stock {key}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ProductId, WarehouseId};
    use store::{InMemoryStore, StoreOp, Version};

    fn key() -> StockKey {
        StockKey::new(ProductId::new(), WarehouseId::new())
    }

    #[tokio::test]
    async fn read_missing_row_is_not_found() {
        let ledger = StockLedger::new(InMemoryStore::new(), 3);
        let err = ledger.read(key()).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn debit_rejects_overdraw() {
        let store = InMemoryStore::new();
        let key = key();
        let entry = store.seed_stock(key, 3).await;
        let ledger = StockLedger::new(store.clone(), 3);

        let err = ledger.debit(&entry, 4).await.unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::InsufficientStock {
                requested: 4,
                available: 3,
                ..
            }
        ));
        assert_eq!(store.stock_quantity(key).await, Some(3));
    }

    #[tokio::test]
    async fn stale_entry_conflicts() {
        let store = InMemoryStore::new();
        let key = key();
        let entry = store.seed_stock(key, 10).await;
        let ledger = StockLedger::new(store.clone(), 3);

        ledger.debit(&entry, 2).await.unwrap();
        let err = ledger.debit(&entry, 2).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert_eq!(store.stock_quantity(key).await, Some(8));
    }

    #[tokio::test]
    async fn adjust_rereads_the_row() {
        let store = InMemoryStore::new();
        let key = key();
        let entry = store.seed_stock(key, 10).await;
        let ledger = StockLedger::new(store.clone(), 3);
        ledger.debit(&entry, 4).await.unwrap();

        let updated = ledger.adjust(key, 4).await.unwrap();
        assert_eq!(updated.quantity, 10);
        assert_eq!(updated.version, Version::new(3));

        let err = ledger.adjust(key, -11).await.unwrap_err();
        assert_eq!(err.kind(), "insufficient_stock");
    }

    #[tokio::test]
    async fn deposit_creates_then_credits() {
        let store = InMemoryStore::new();
        let key = key();
        let ledger = StockLedger::new(store.clone(), 3);

        let created = ledger.deposit(key, 5).await.unwrap();
        assert_eq!(created.version, Version::first());
        let credited = ledger.deposit(key, 2).await.unwrap();
        assert_eq!(credited.quantity, 7);
    }

    #[tokio::test]
    async fn deposit_surfaces_write_failures() {
        let store = InMemoryStore::new();
        let key = key();
        store.seed_stock(key, 1).await;
        store.fail_on_stock(StoreOp::UpdateStock, key);
        let ledger = StockLedger::new(store.clone(), 3);

        let err = ledger.deposit(key, 2).await.unwrap_err();
        assert_eq!(err.kind(), "store_write");
        assert_eq!(store.stock_quantity(key).await, Some(1));
    }
}
