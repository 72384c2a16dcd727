//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a farm (master data owned by the farm module).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FarmId(i64);

/// Canonical identifier of a catalog item (feed, supply, medication...).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(i64);

/// Identifier of a movement row; assigned by the store in insertion order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(i64);

/// Correlation id shared by the two rows of one transfer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferGroupId(Uuid);

macro_rules! impl_i64_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = i64::from_str(s.trim())
                    .map_err(|e| DomainError::validation(format!("{}: {}", $name, e)))?;
                Ok(Self(value))
            }
        }
    };
}

impl_i64_newtype!(FarmId, "FarmId");
impl_i64_newtype!(ItemId, "ItemId");
impl_i64_newtype!(MovementId, "MovementId");

impl TransferGroupId {
    /// Create a new group id.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
    /// for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransferGroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for TransferGroupId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for TransferGroupId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<TransferGroupId> for Uuid {
    fn from(value: TransferGroupId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_ids() {
        assert_eq!("42".parse::<FarmId>().unwrap(), FarmId::new(42));
        assert_eq!(" 7 ".parse::<ItemId>().unwrap().get(), 7);
    }

    #[test]
    fn rejects_non_numeric_ids() {
        let err = "abc".parse::<FarmId>().unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.starts_with("FarmId")));
    }

    #[test]
    fn ids_order_numerically() {
        assert!(FarmId::new(2) < FarmId::new(10));
    }
}
