//! Master-data collaborators: item catalog and farm directory.
//!
//! The ledger only needs to know that a farm exists and which item id a caller
//! means. Both lookups are read-only.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use avicola_core::{FarmId, ItemId};

use crate::ledger_store::StoreError;

pub use in_memory::InMemoryCatalog;
pub use postgres::PostgresCatalog;

/// How a caller names an item: by numeric id or by catalog code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemRef {
    Id(i64),
    Code(String),
}

impl core::fmt::Display for ItemRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ItemRef::Id(id) => write!(f, "{id}"),
            ItemRef::Code(code) => write!(f, "'{code}'"),
        }
    }
}

impl From<ItemId> for ItemRef {
    fn from(value: ItemId) -> Self {
        ItemRef::Id(value.get())
    }
}

#[async_trait]
pub trait CatalogResolver: Send + Sync {
    /// Canonical item id for `item`, `None` if the catalog does not know it.
    async fn resolve_item(&self, item: &ItemRef) -> Result<Option<ItemId>, StoreError>;
}

#[async_trait]
pub trait FarmDirectory: Send + Sync {
    async fn farm_exists(&self, farm_id: FarmId) -> Result<bool, StoreError>;
}

#[async_trait]
impl<C> CatalogResolver for Arc<C>
where
    C: CatalogResolver + ?Sized,
{
    async fn resolve_item(&self, item: &ItemRef) -> Result<Option<ItemId>, StoreError> {
        (**self).resolve_item(item).await
    }
}

#[async_trait]
impl<D> FarmDirectory for Arc<D>
where
    D: FarmDirectory + ?Sized,
{
    async fn farm_exists(&self, farm_id: FarmId) -> Result<bool, StoreError> {
        (**self).farm_exists(farm_id).await
    }
}
