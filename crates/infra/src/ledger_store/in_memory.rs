use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use avicola_core::{FarmId, MovementId};
use avicola_inventory::{Balance, BalanceKey, Movement, Posting};

use super::query::{LedgerSnapshot, MovementFilter, MovementPage, MovementQuery, Pagination};
use super::r#trait::{LedgerStore, StoreError};

#[derive(Debug, Default)]
struct LedgerState {
    balances: BTreeMap<BalanceKey, Balance>,
    /// Movement `n` lives at index `n - 1`.
    movements: Vec<Movement>,
    last_created_at: Option<DateTime<Utc>>,
}

impl LedgerState {
    fn version_of(&self, key: &BalanceKey) -> u64 {
        self.balances.get(key).map(|b| b.version).unwrap_or(0)
    }

    /// Strictly increasing commit timestamps, so time order never contradicts id order.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let at = match self.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(at);
        at
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Every commit runs under one write lock, so a
/// posting is applied entirely or not at all.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, LedgerState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Persistence("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, LedgerState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Persistence("lock poisoned".to_string()))
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn load_balances(&self, keys: &[BalanceKey]) -> Result<Vec<Option<Balance>>, StoreError> {
        let state = self.read()?;
        Ok(keys.iter().map(|k| state.balances.get(k).cloned()).collect())
    }

    async fn commit(&self, posting: Posting) -> Result<Vec<Movement>, StoreError> {
        let (writes, movements) = posting.into_parts();
        let mut state = self.write()?;

        // Check every row before touching any of them.
        for w in &writes {
            let key = w.balance.key();
            let current = state.version_of(&key);
            if !w.expected.matches(current) {
                return Err(StoreError::Concurrency(format!(
                    "{key}: expected {}, found version {current}",
                    w.expected
                )));
            }
        }

        for w in writes {
            let key = w.balance.key();
            let mut next = w.balance;
            next.version = state.version_of(&key) + 1;
            state.balances.insert(key, next);
        }

        let mut committed = Vec::with_capacity(movements.len());
        for m in movements {
            let id = MovementId::new(state.movements.len() as i64 + 1);
            let created_at = state.next_timestamp();
            let stored = m.into_movement(id, created_at);
            state.movements.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }
}

#[async_trait]
impl MovementQuery for InMemoryLedgerStore {
    async fn get_movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        let state = self.read()?;
        let Some(index) = id.get().checked_sub(1).and_then(|i| usize::try_from(i).ok()) else {
            return Ok(None);
        };
        Ok(state.movements.get(index).cloned())
    }

    async fn query_movements(
        &self,
        farm_id: FarmId,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let state = self.read()?;

        // Ids grow with created_at, so reverse insertion order is newest first.
        let matching: Vec<&Movement> = state
            .movements
            .iter()
            .rev()
            .filter(|m| m.farm_id == farm_id && filter.matches(m))
            .collect();

        let total = matching.len() as u64;
        let offset = usize::try_from(pagination.offset()).unwrap_or(usize::MAX);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(pagination.page_size as usize)
            .cloned()
            .collect();

        Ok(MovementPage::new(items, total, pagination))
    }

    async fn get_balance(&self, key: BalanceKey) -> Result<Option<Balance>, StoreError> {
        Ok(self.read()?.balances.get(&key).cloned())
    }

    async fn list_balances(&self, farm_id: FarmId) -> Result<Vec<Balance>, StoreError> {
        let state = self.read()?;
        Ok(state
            .balances
            .values()
            .filter(|b| b.farm_id == farm_id)
            .cloned()
            .collect())
    }

    async fn history(
        &self,
        key: BalanceKey,
        until: Option<DateTime<Utc>>,
    ) -> Result<LedgerSnapshot, StoreError> {
        let state = self.read()?;
        let movements = state
            .movements
            .iter()
            .filter(|m| m.key() == key && until.is_none_or(|until| m.created_at <= until))
            .cloned()
            .collect();

        Ok(LedgerSnapshot {
            balance: state.balances.get(&key).cloned(),
            movements,
        })
    }
}
