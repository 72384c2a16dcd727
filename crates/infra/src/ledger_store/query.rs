//! Read-only queries over balances and the movement log.
//!
//! Nothing here takes row locks. Backends answer each call from one
//! consistent snapshot.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use avicola_core::{FarmId, ItemId, MovementId};
use avicola_inventory::{Balance, BalanceKey, Movement, MovementType};

use super::r#trait::StoreError;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

/// Filter criteria for movement listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    /// Inclusive lower bound on `created_at`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub to: Option<DateTime<Utc>>,
    pub item_id: Option<ItemId>,
    pub movement_type: Option<MovementType>,
}

impl MovementFilter {
    pub fn matches(&self, movement: &Movement) -> bool {
        self.from.is_none_or(|from| movement.created_at >= from)
            && self.to.is_none_or(|to| movement.created_at <= to)
            && self.item_id.is_none_or(|item| movement.item_id == item)
            && self
                .movement_type
                .is_none_or(|ty| movement.movement_type == ty)
    }
}

/// One page of movements, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPage {
    pub items: Vec<Movement>,
    /// Number of movements matching the filter across all pages.
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

impl MovementPage {
    pub fn new(items: Vec<Movement>, total: u64, pagination: Pagination) -> Self {
        let has_more = pagination.offset() + (items.len() as u64) < total;
        Self {
            items,
            total,
            page: pagination.page,
            page_size: pagination.page_size,
            has_more,
        }
    }
}

/// Balance row and movement history for one key, read from the same snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub balance: Option<Balance>,
    /// Movements in id order.
    pub movements: Vec<Movement>,
}

#[async_trait]
pub trait MovementQuery: Send + Sync {
    async fn get_movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError>;

    /// Movements of one farm, ordered `created_at DESC, id DESC`.
    async fn query_movements(
        &self,
        farm_id: FarmId,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError>;

    async fn get_balance(&self, key: BalanceKey) -> Result<Option<Balance>, StoreError>;

    /// Balance rows of one farm, ordered by item.
    async fn list_balances(&self, farm_id: FarmId) -> Result<Vec<Balance>, StoreError>;

    /// Balance row plus every movement for `key` created at or before `until`.
    async fn history(
        &self,
        key: BalanceKey,
        until: Option<DateTime<Utc>>,
    ) -> Result<LedgerSnapshot, StoreError>;
}

#[async_trait]
impl<Q> MovementQuery for Arc<Q>
where
    Q: MovementQuery + ?Sized,
{
    async fn get_movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        (**self).get_movement(id).await
    }

    async fn query_movements(
        &self,
        farm_id: FarmId,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        (**self).query_movements(farm_id, filter, pagination).await
    }

    async fn get_balance(&self, key: BalanceKey) -> Result<Option<Balance>, StoreError> {
        (**self).get_balance(key).await
    }

    async fn list_balances(&self, farm_id: FarmId) -> Result<Vec<Balance>, StoreError> {
        (**self).list_balances(farm_id).await
    }

    async fn history(
        &self,
        key: BalanceKey,
        until: Option<DateTime<Utc>>,
    ) -> Result<LedgerSnapshot, StoreError> {
        (**self).history(key, until).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_caps() {
        assert_eq!(Pagination::new(None, None), Pagination { page: 1, page_size: 50 });
        assert_eq!(Pagination::new(Some(0), Some(10_000)).page_size, MAX_PAGE_SIZE);
        assert_eq!(Pagination::new(Some(0), None).page, 1);
        assert_eq!(Pagination::new(Some(3), Some(20)).offset(), 40);
    }

    #[test]
    fn page_reports_remaining_rows() {
        let p = Pagination::new(Some(2), Some(10));
        assert!(MovementPage::new(Vec::new(), 35, p).has_more);
        assert!(!MovementPage::new(Vec::new(), 10, p).has_more);
    }
}
