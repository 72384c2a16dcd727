use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use avicola_inventory::{Balance, BalanceKey, Movement, Posting};

/// Ledger store operation error.
///
/// These are **infrastructure errors**. Business rule violations never reach
/// the store: they are decided before a posting is built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A balance row was not at the version the posting was decided against,
    /// or the backend reported a serialization failure.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// Anything else: connection loss, constraint violations, corrupt rows.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

/// Transactional store for balances and the append-only movement log.
///
/// ## Commit Semantics
///
/// `commit()`:
/// - Compare-and-swaps every balance write against its expected version, in the
///   order the posting lists them (ascending farm, item)
/// - Bumps each written row's version by one (inserted rows start at 1)
/// - Appends the posting's movements, assigning ids in commit order
/// - Is atomic: either every write and movement lands, or none does
///
/// Any version mismatch is reported as [`StoreError::Concurrency`] and leaves
/// the store untouched.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load balance rows for `keys`, one slot per key, `None` when absent.
    async fn load_balances(&self, keys: &[BalanceKey]) -> Result<Vec<Option<Balance>>, StoreError>;

    /// Atomically apply a posting. Returns the appended movements in posting order.
    async fn commit(&self, posting: Posting) -> Result<Vec<Movement>, StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn load_balances(&self, keys: &[BalanceKey]) -> Result<Vec<Option<Balance>>, StoreError> {
        (**self).load_balances(keys).await
    }

    async fn commit(&self, posting: Posting) -> Result<Vec<Movement>, StoreError> {
        (**self).commit(posting).await
    }
}
