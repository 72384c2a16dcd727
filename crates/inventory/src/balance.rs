use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use avicola_core::{FarmId, ItemId, Quantity, Unit};

/// Natural key of a balance row.
///
/// The derived ordering (farm first, then item) is the global lock order used
/// whenever one unit of work touches several rows.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BalanceKey {
    pub farm_id: FarmId,
    pub item_id: ItemId,
}

impl BalanceKey {
    pub fn new(farm_id: FarmId, item_id: ItemId) -> Self {
        Self { farm_id, item_id }
    }
}

impl core::fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "farm {} / item {}", self.farm_id, self.item_id)
    }
}

/// Materialized stock on hand for one farm and item.
///
/// This is a cache over the movement log: every change to `quantity` is
/// committed together with the movement that explains it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub farm_id: FarmId,
    pub item_id: ItemId,
    pub quantity: Quantity,
    pub unit: Unit,
    pub location: Option<String>,
    pub lot_number: Option<String>,
    pub expiration_date: Option<NaiveDate>,
    pub unit_cost: Option<Decimal>,
    pub metadata: Option<JsonValue>,
    pub active: bool,
    pub responsible_party: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token; 0 means the row is not persisted yet.
    pub version: u64,
}

impl Balance {
    /// A zero balance that has not been persisted (version 0).
    pub fn empty(key: BalanceKey, at: DateTime<Utc>) -> Self {
        Self {
            farm_id: key.farm_id,
            item_id: key.item_id,
            quantity: Quantity::ZERO,
            unit: Unit::default(),
            location: None,
            lot_number: None,
            expiration_date: None,
            unit_cost: None,
            metadata: None,
            active: true,
            responsible_party: None,
            created_at: at,
            updated_at: at,
            version: 0,
        }
    }

    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.farm_id, self.item_id)
    }

    pub fn is_persisted(&self) -> bool {
        self.version > 0
    }
}
