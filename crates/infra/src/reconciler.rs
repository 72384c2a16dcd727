//! Stock-count reconciler.
//!
//! Turns a physical count into the adjustments that force each balance onto
//! the counted value. One count is one unit of work: every adjustment commits
//! together or none does.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use avicola_core::{DomainResult, FarmId, ItemId, Quantity};
use avicola_inventory::{BalanceKey, CountedBalance, Movement, MovementDetails, plan_stock_count};

use crate::catalog::{CatalogResolver, FarmDirectory, ItemRef};
use crate::ledger::{InventoryLedger, LedgerError};
use crate::ledger_store::LedgerStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockCountLine {
    pub item: ItemRef,
    /// Non-negative counted quantity.
    pub counted: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockCount {
    pub farm_id: FarmId,
    pub lines: Vec<StockCountLine>,
    pub details: MovementDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCountLineResult {
    pub item_id: ItemId,
    pub previous: Quantity,
    pub counted: Quantity,
    /// `counted - previous`.
    pub difference: Decimal,
    /// The Adjust movement, absent when the count matched the balance.
    pub adjustment: Option<Movement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCountResult {
    pub farm_id: FarmId,
    pub lines: Vec<StockCountLineResult>,
}

impl StockCountResult {
    pub fn adjusted_lines(&self) -> usize {
        self.lines.iter().filter(|l| l.adjustment.is_some()).count()
    }
}

#[derive(Debug)]
pub struct StockCountReconciler<S, C> {
    ledger: Arc<InventoryLedger<S, C>>,
}

impl<S, C> Clone for StockCountReconciler<S, C> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
        }
    }
}

impl<S, C> StockCountReconciler<S, C>
where
    S: LedgerStore,
    C: CatalogResolver + FarmDirectory,
{
    pub fn new(ledger: Arc<InventoryLedger<S, C>>) -> Self {
        Self { ledger }
    }

    #[instrument(skip_all, fields(farm_id = %count.farm_id, lines = count.lines.len()))]
    pub async fn apply(&self, count: StockCount) -> Result<StockCountResult, LedgerError> {
        if count.lines.is_empty() {
            return Err(LedgerError::Validation(
                "a stock count needs at least one line".to_string(),
            ));
        }
        let counted: Vec<Quantity> = count
            .lines
            .iter()
            .map(|line| Quantity::new(line.counted))
            .collect::<DomainResult<_>>()?;
        let details = count.details.validated()?;

        self.ledger.ensure_farm(count.farm_id).await?;
        let mut keys: Vec<BalanceKey> = Vec::with_capacity(count.lines.len());
        for line in &count.lines {
            let key = BalanceKey::new(count.farm_id, self.ledger.resolve_item(&line.item).await?);
            if keys.contains(&key) {
                return Err(LedgerError::Validation(format!(
                    "item {} appears more than once in the count",
                    key.item_id
                )));
            }
            keys.push(key);
        }

        let (movements, outcomes) = self
            .ledger
            .run("apply_stock_count", &keys, |balances, at| {
                let lines: Vec<CountedBalance> = balances
                    .iter()
                    .zip(&counted)
                    .map(|(balance, counted)| CountedBalance {
                        balance: balance.clone(),
                        counted: *counted,
                    })
                    .collect();
                plan_stock_count(&lines, &details, at)
            })
            .await?;

        let result = StockCountResult {
            farm_id: count.farm_id,
            lines: outcomes
                .into_iter()
                .map(|o| StockCountLineResult {
                    item_id: o.key.item_id,
                    previous: o.previous,
                    counted: o.counted,
                    difference: o.difference,
                    adjustment: o.movement_index.and_then(|i| movements.get(i).cloned()),
                })
                .collect(),
        };

        info!(adjusted = result.adjusted_lines(), "stock count applied");
        Ok(result)
    }
}
