//! Catalog lookups over the `farms` and `items` master tables.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use avicola_core::{FarmId, ItemId};

use super::{CatalogResolver, FarmDirectory, ItemRef};
use crate::ledger_store::StoreError;
use crate::ledger_store::postgres::map_sqlx_error;

#[derive(Debug, Clone)]
pub struct PostgresCatalog {
    pool: Arc<PgPool>,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl CatalogResolver for PostgresCatalog {
    async fn resolve_item(&self, item: &ItemRef) -> Result<Option<ItemId>, StoreError> {
        let row = match item {
            ItemRef::Id(id) => {
                sqlx::query("SELECT id FROM items WHERE id = $1")
                    .bind(*id)
                    .fetch_optional(&*self.pool)
                    .await
            }
            ItemRef::Code(code) => {
                sqlx::query("SELECT id FROM items WHERE code = $1")
                    .bind(code.trim())
                    .fetch_optional(&*self.pool)
                    .await
            }
        }
        .map_err(|e| map_sqlx_error("resolve_item", e))?;

        row.map(|r| {
            r.try_get::<i64, _>("id")
                .map(ItemId::new)
                .map_err(|e| StoreError::Persistence(format!("failed to read item id: {e}")))
        })
        .transpose()
    }
}

#[async_trait]
impl FarmDirectory for PostgresCatalog {
    async fn farm_exists(&self, farm_id: FarmId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM farms WHERE id = $1) AS present")
            .bind(farm_id.get())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("farm_exists", e))?;

        row.try_get("present")
            .map_err(|e| StoreError::Persistence(format!("failed to read farm lookup: {e}")))
    }
}
