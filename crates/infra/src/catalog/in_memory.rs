use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use avicola_core::{FarmId, ItemId};

use super::{CatalogResolver, FarmDirectory, ItemRef};
use crate::ledger_store::StoreError;

#[derive(Debug, Default)]
struct CatalogState {
    farms: HashSet<FarmId>,
    items: HashSet<ItemId>,
    codes: HashMap<String, ItemId>,
}

/// In-memory farms and items.
///
/// Intended for tests/dev. A permissive catalog accepts every positive farm
/// and item id without registration; codes always need registering.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
    permissive: bool,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permissive() -> Self {
        Self {
            state: RwLock::default(),
            permissive: true,
        }
    }

    pub fn register_farm(&self, farm_id: FarmId) -> Result<(), StoreError> {
        self.write()?.farms.insert(farm_id);
        Ok(())
    }

    pub fn register_item(&self, item_id: ItemId, code: Option<&str>) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.items.insert(item_id);
        if let Some(code) = code {
            state.codes.insert(code.trim().to_string(), item_id);
        }
        Ok(())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, CatalogState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Persistence("lock poisoned".to_string()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, CatalogState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Persistence("lock poisoned".to_string()))
    }
}

#[async_trait]
impl CatalogResolver for InMemoryCatalog {
    async fn resolve_item(&self, item: &ItemRef) -> Result<Option<ItemId>, StoreError> {
        let state = self.read()?;
        Ok(match item {
            ItemRef::Id(id) => {
                let id = ItemId::new(*id);
                (state.items.contains(&id) || (self.permissive && id.get() > 0)).then_some(id)
            }
            ItemRef::Code(code) => state.codes.get(code.trim()).copied(),
        })
    }
}

#[async_trait]
impl FarmDirectory for InMemoryCatalog {
    async fn farm_exists(&self, farm_id: FarmId) -> Result<bool, StoreError> {
        let state = self.read()?;
        Ok(state.farms.contains(&farm_id) || (self.permissive && farm_id.get() > 0))
    }
}
