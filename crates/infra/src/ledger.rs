//! Inventory ledger: the posting pipeline (application-level orchestration).
//!
//! ## Execution Flow
//!
//! ```text
//! Command
//!   ↓
//! 1. Validate input (no store access)
//!   ↓
//! 2. Resolve farm and item through the catalog
//!   ↓
//! 3. Load the touched balance rows (absent rows read as zero, version 0)
//!   ↓
//! 4. Decide: pure posting function builds balance writes + movements
//!   ↓
//! 5. Commit atomically with a version check on every written row
//! ```
//!
//! A lost optimistic race at step 5 re-runs steps 3-5 with a linear backoff,
//! up to the configured number of attempts. Business failures (insufficient
//! stock, negative balance, unit mismatch) are decided at step 4 and leave the
//! store untouched.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use avicola_core::{
    DomainError, DomainResult, FarmId, ItemId, MovementId, Quantity, TransferGroupId, Unit,
    ensure_delta,
};
use avicola_inventory::{
    Balance, BalanceKey, Movement, MovementDetails, Posting, post_adjust, post_entry, post_exit,
    post_transfer,
};

use crate::catalog::{CatalogResolver, FarmDirectory, ItemRef};
use crate::config::RetryPolicy;
use crate::ledger_store::{
    LedgerStore, MovementFilter, MovementPage, MovementQuery, Pagination, StoreError,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Malformed input, unknown farm/item, unit mismatch.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { available: Decimal, requested: Decimal },

    #[error("negative balance: current {current}, delta {delta}")]
    NegativeBalance { current: Decimal, delta: Decimal },

    #[error("not found: {0}")]
    NotFound(String),

    /// Still losing optimistic races after every retry.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => LedgerError::Validation(msg),
            DomainError::InsufficientStock {
                available,
                requested,
            } => LedgerError::InsufficientStock {
                available,
                requested,
            },
            DomainError::NegativeBalance { current, delta } => {
                LedgerError::NegativeBalance { current, delta }
            }
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => LedgerError::ConcurrencyConflict(msg),
            StoreError::Persistence(msg) => LedgerError::Persistence(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostEntry {
    pub farm_id: FarmId,
    pub item: ItemRef,
    pub quantity: Decimal,
    /// Defaults to the balance unit.
    pub unit: Option<String>,
    pub details: MovementDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostExit {
    pub farm_id: FarmId,
    pub item: ItemRef,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub details: MovementDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostTransfer {
    pub from_farm_id: FarmId,
    pub to_farm_id: FarmId,
    pub item: ItemRef,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub details: MovementDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostAdjust {
    pub farm_id: FarmId,
    pub item: ItemRef,
    /// Signed, non-zero.
    pub delta: Decimal,
    pub unit: Option<String>,
    pub details: MovementDetails,
}

/// Both legs of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transfer_group_id: TransferGroupId,
    pub outbound: Movement,
    pub inbound: Movement,
}

enum AttemptError {
    Domain(DomainError),
    Store(StoreError),
}

impl From<DomainError> for AttemptError {
    fn from(value: DomainError) -> Self {
        AttemptError::Domain(value)
    }
}

impl From<StoreError> for AttemptError {
    fn from(value: StoreError) -> Self {
        AttemptError::Store(value)
    }
}

/// Posting pipeline over a ledger store and the catalog.
///
/// Holds no mutable state of its own; share it behind an `Arc` and call it
/// from as many tasks as needed.
#[derive(Debug)]
pub struct InventoryLedger<S, C> {
    store: S,
    catalog: C,
    retry: RetryPolicy,
}

impl<S, C> InventoryLedger<S, C> {
    pub fn new(store: S, catalog: C, retry: RetryPolicy) -> Self {
        Self {
            store,
            catalog,
            retry,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}

impl<S, C> InventoryLedger<S, C>
where
    S: LedgerStore,
    C: CatalogResolver + FarmDirectory,
{
    /// Receive stock. Returns the Entry movement.
    #[instrument(skip_all, fields(farm_id = %cmd.farm_id, item = %cmd.item, quantity = %cmd.quantity))]
    pub async fn post_entry(&self, cmd: PostEntry) -> Result<Movement, LedgerError> {
        let quantity = Quantity::positive(cmd.quantity)?;
        let unit = parse_unit(cmd.unit.as_deref())?;
        let details = cmd.details.validated()?;
        let key = self.resolve_key(cmd.farm_id, &cmd.item).await?;

        let (movements, ()) = self
            .run("post_entry", &[key], |balances, at| {
                let balance = &balances[0];
                let unit = unit.as_ref().unwrap_or(&balance.unit);
                Ok((post_entry(balance, quantity, unit, &details, at)?, ()))
            })
            .await?;

        first(movements)
    }

    /// Consume or dispatch stock. Returns the Exit movement.
    #[instrument(skip_all, fields(farm_id = %cmd.farm_id, item = %cmd.item, quantity = %cmd.quantity))]
    pub async fn post_exit(&self, cmd: PostExit) -> Result<Movement, LedgerError> {
        let quantity = Quantity::positive(cmd.quantity)?;
        let unit = parse_unit(cmd.unit.as_deref())?;
        let details = cmd.details.validated()?;
        let key = self.resolve_key(cmd.farm_id, &cmd.item).await?;

        let (movements, ()) = self
            .run("post_exit", &[key], |balances, at| {
                Ok((post_exit(&balances[0], quantity, unit.as_ref(), &details, at)?, ()))
            })
            .await?;

        first(movements)
    }

    /// Move stock between two farms in one unit of work.
    #[instrument(
        skip_all,
        fields(
            from_farm_id = %cmd.from_farm_id,
            to_farm_id = %cmd.to_farm_id,
            item = %cmd.item,
            quantity = %cmd.quantity,
            transfer_group_id = tracing::field::Empty
        )
    )]
    pub async fn post_transfer(&self, cmd: PostTransfer) -> Result<TransferReceipt, LedgerError> {
        if cmd.from_farm_id == cmd.to_farm_id {
            return Err(LedgerError::Validation(
                "source and destination farm must differ".to_string(),
            ));
        }
        let quantity = Quantity::positive(cmd.quantity)?;
        let unit = parse_unit(cmd.unit.as_deref())?;
        let details = cmd.details.validated()?;

        self.ensure_farm(cmd.to_farm_id).await?;
        let source = self.resolve_key(cmd.from_farm_id, &cmd.item).await?;
        let destination = BalanceKey::new(cmd.to_farm_id, source.item_id);

        let group = TransferGroupId::new();
        tracing::Span::current().record("transfer_group_id", tracing::field::display(group));

        let (movements, ()) = self
            .run("post_transfer", &[source, destination], |balances, at| {
                let posting = post_transfer(
                    &balances[0],
                    &balances[1],
                    quantity,
                    unit.as_ref(),
                    &details,
                    group,
                    at,
                )?;
                Ok((posting, ()))
            })
            .await?;

        let mut legs = movements.into_iter();
        match (legs.next(), legs.next()) {
            (Some(outbound), Some(inbound)) => Ok(TransferReceipt {
                transfer_group_id: group,
                outbound,
                inbound,
            }),
            _ => Err(LedgerError::Persistence(
                "store did not return both transfer legs".to_string(),
            )),
        }
    }

    /// Correct a balance by a signed delta. Returns the Adjust movement.
    #[instrument(skip_all, fields(farm_id = %cmd.farm_id, item = %cmd.item, delta = %cmd.delta))]
    pub async fn post_adjust(&self, cmd: PostAdjust) -> Result<Movement, LedgerError> {
        ensure_delta(cmd.delta)?;
        let unit = parse_unit(cmd.unit.as_deref())?;
        let details = cmd.details.validated()?;
        let key = self.resolve_key(cmd.farm_id, &cmd.item).await?;

        let (movements, ()) = self
            .run("post_adjust", &[key], |balances, at| {
                Ok((post_adjust(&balances[0], cmd.delta, unit.as_ref(), &details, at)?, ()))
            })
            .await?;

        first(movements)
    }

    /// Run one unit of work, retrying lost optimistic races.
    ///
    /// `decide` sees the balances for `keys` (same order) and must be pure: it
    /// runs once per attempt. An empty posting commits nothing.
    pub(crate) async fn run<T, F>(
        &self,
        operation: &'static str,
        keys: &[BalanceKey],
        decide: F,
    ) -> Result<(Vec<Movement>, T), LedgerError>
    where
        F: Fn(&[Balance], DateTime<Utc>) -> DomainResult<(Posting, T)> + Send + Sync,
        T: Send,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt: u32 = 1;

        loop {
            match self.attempt(keys, &decide).await {
                Ok(done) => {
                    debug!(operation, attempt, movements = done.0.len(), "posting committed");
                    return Ok(done);
                }
                Err(AttemptError::Domain(err)) => return Err(err.into()),
                Err(AttemptError::Store(StoreError::Concurrency(reason))) => {
                    if attempt >= max_attempts {
                        warn!(operation, attempt, %reason, "concurrency conflict, giving up");
                        return Err(LedgerError::ConcurrencyConflict(reason));
                    }
                    warn!(operation, attempt, %reason, "concurrency conflict, retrying");
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                    attempt += 1;
                }
                Err(AttemptError::Store(err)) => return Err(store_failure(operation, err)),
            }
        }
    }

    async fn attempt<T, F>(
        &self,
        keys: &[BalanceKey],
        decide: &F,
    ) -> Result<(Vec<Movement>, T), AttemptError>
    where
        F: Fn(&[Balance], DateTime<Utc>) -> DomainResult<(Posting, T)> + Send + Sync,
        T: Send,
    {
        let loaded = self.store.load_balances(keys).await?;
        if loaded.len() != keys.len() {
            return Err(StoreError::Persistence(format!(
                "store returned {} rows for {} keys",
                loaded.len(),
                keys.len()
            ))
            .into());
        }

        let at = Utc::now();
        let balances: Vec<Balance> = keys
            .iter()
            .zip(loaded)
            .map(|(key, row)| row.unwrap_or_else(|| Balance::empty(*key, at)))
            .collect();

        let (posting, outcome) = decide(&balances, at)?;
        if posting.is_empty() {
            return Ok((Vec::new(), outcome));
        }

        let committed = self.store.commit(posting).await?;
        Ok((committed, outcome))
    }

    pub(crate) async fn resolve_key(
        &self,
        farm_id: FarmId,
        item: &ItemRef,
    ) -> Result<BalanceKey, LedgerError> {
        self.ensure_farm(farm_id).await?;
        let item_id = self.resolve_item(item).await?;
        Ok(BalanceKey::new(farm_id, item_id))
    }

    /// Unknown farms are a validation failure for postings.
    pub(crate) async fn ensure_farm(&self, farm_id: FarmId) -> Result<(), LedgerError> {
        let exists = self
            .catalog
            .farm_exists(farm_id)
            .await
            .map_err(|e| store_failure("farm_exists", e))?;
        if !exists {
            return Err(LedgerError::Validation(format!("unknown farm {farm_id}")));
        }
        Ok(())
    }

    pub async fn resolve_item(&self, item: &ItemRef) -> Result<ItemId, LedgerError> {
        self.catalog
            .resolve_item(item)
            .await
            .map_err(|e| store_failure("resolve_item", e))?
            .ok_or_else(|| LedgerError::Validation(format!("unknown item {item}")))
    }
}

impl<S, C> InventoryLedger<S, C>
where
    S: LedgerStore + MovementQuery,
    C: CatalogResolver + FarmDirectory,
{
    pub async fn get_movement(&self, id: MovementId) -> Result<Movement, LedgerError> {
        self.store
            .get_movement(id)
            .await
            .map_err(|e| store_failure("get_movement", e))?
            .ok_or_else(|| LedgerError::NotFound(format!("movement {id}")))
    }

    #[instrument(skip(self, filter), fields(farm_id = %farm_id))]
    pub async fn list_movements(
        &self,
        farm_id: FarmId,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, LedgerError> {
        ensure_window(filter.from, filter.to)?;
        self.store
            .query_movements(farm_id, filter, pagination)
            .await
            .map_err(|e| store_failure("list_movements", e))
    }

    /// Balance row for a farm and item; `NotFound` if the pair was never posted.
    pub async fn get_balance(&self, farm_id: FarmId, item: &ItemRef) -> Result<Balance, LedgerError> {
        let item_id = match self.resolve_item(item).await {
            Ok(id) => id,
            Err(LedgerError::Validation(msg)) => return Err(LedgerError::NotFound(msg)),
            Err(other) => return Err(other),
        };
        let key = BalanceKey::new(farm_id, item_id);
        self.store
            .get_balance(key)
            .await
            .map_err(|e| store_failure("get_balance", e))?
            .ok_or_else(|| LedgerError::NotFound(format!("no balance for {key}")))
    }

    pub async fn list_balances(&self, farm_id: FarmId) -> Result<Vec<Balance>, LedgerError> {
        self.store
            .list_balances(farm_id)
            .await
            .map_err(|e| store_failure("list_balances", e))
    }
}

/// Map a store failure, logging the ones that point at broken infrastructure.
pub(crate) fn store_failure(operation: &'static str, err: StoreError) -> LedgerError {
    if let StoreError::Persistence(reason) = &err {
        error!(operation, %reason, "ledger store failure");
    }
    err.into()
}

pub(crate) fn ensure_window(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<(), LedgerError> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => Err(LedgerError::Validation(
            "'from' must not be after 'to'".to_string(),
        )),
        _ => Ok(()),
    }
}

fn parse_unit(raw: Option<&str>) -> DomainResult<Option<Unit>> {
    raw.map(Unit::new).transpose()
}

fn first(movements: Vec<Movement>) -> Result<Movement, LedgerError> {
    movements
        .into_iter()
        .next()
        .ok_or_else(|| LedgerError::Persistence("store returned no movement".to_string()))
}
