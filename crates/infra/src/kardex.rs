//! Kardex reporter: running-balance reports and balance audits.
//!
//! Reads one consistent snapshot per call and folds it with the pure replay in
//! `avicola-inventory`. Never writes.

use chrono::{DateTime, Utc};
use tracing::{instrument, warn};

use avicola_inventory::{BalanceKey, Kardex, KardexAudit, audit, replay};

use crate::ledger::{LedgerError, ensure_window, store_failure};
use crate::ledger_store::MovementQuery;

#[derive(Debug, Clone)]
pub struct KardexReporter<Q> {
    query: Q,
}

impl<Q> KardexReporter<Q>
where
    Q: MovementQuery,
{
    pub fn new(query: Q) -> Self {
        Self { query }
    }

    /// Chronological movements for one farm and item with the running balance.
    ///
    /// Movements before `from` collapse into the opening balance.
    #[instrument(skip(self), fields(farm_id = %key.farm_id, item_id = %key.item_id))]
    pub async fn kardex(
        &self,
        key: BalanceKey,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Kardex, LedgerError> {
        ensure_window(from, to)?;
        let snapshot = self
            .query
            .history(key, to)
            .await
            .map_err(|e| store_failure("kardex", e))?;

        Ok(replay(key, &snapshot.movements, from, to))
    }

    /// Compare the materialized balance with a full replay of its movements.
    #[instrument(skip(self), fields(farm_id = %key.farm_id, item_id = %key.item_id))]
    pub async fn audit(&self, key: BalanceKey) -> Result<KardexAudit, LedgerError> {
        let snapshot = self
            .query
            .history(key, None)
            .await
            .map_err(|e| store_failure("kardex_audit", e))?;

        let report = audit(key, snapshot.balance.as_ref(), &snapshot.movements);
        if !report.consistent {
            warn!(
                materialized = %report.materialized,
                replayed = %report.replayed,
                "balance drifted from its movement log"
            );
        }
        Ok(report)
    }
}
