use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use avicola_core::{DomainError, DomainResult, FarmId, ItemId, MovementId, Quantity, TransferGroupId, Unit};

use crate::balance::BalanceKey;

pub const REFERENCE_MAX_LEN: usize = 50;
pub const REASON_MAX_LEN: usize = 200;
pub const RESPONSIBLE_PARTY_MAX_LEN: usize = 128;

/// Kind of economic event recorded by a movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementType {
    Entry,
    Exit,
    TransferOut,
    TransferIn,
    Adjust,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Entry => "Entry",
            MovementType::Exit => "Exit",
            MovementType::TransferOut => "TransferOut",
            MovementType::TransferIn => "TransferIn",
            MovementType::Adjust => "Adjust",
        }
    }

    /// Direction implied by the type alone; `None` for adjustments.
    pub fn implied_direction(&self) -> Option<Direction> {
        match self {
            MovementType::Entry | MovementType::TransferIn => Some(Direction::Increase),
            MovementType::Exit | MovementType::TransferOut => Some(Direction::Decrease),
            MovementType::Adjust => None,
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" => Ok(MovementType::Entry),
            "exit" => Ok(MovementType::Exit),
            "transferout" | "transfer_out" => Ok(MovementType::TransferOut),
            "transferin" | "transfer_in" => Ok(MovementType::TransferIn),
            "adjust" => Ok(MovementType::Adjust),
            _ => Err(DomainError::validation(format!(
                "movement_type must be one of: Entry, Exit, TransferOut, TransferIn, Adjust (got '{s}')"
            ))),
        }
    }
}

/// Whether a movement adds to or removes from the balance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Increase => "Increase",
            Direction::Decrease => "Decrease",
        }
    }

    pub fn of_delta(delta: Decimal) -> Self {
        if delta.is_sign_negative() {
            Direction::Decrease
        } else {
            Direction::Increase
        }
    }

    /// Signed contribution of `quantity` to a balance.
    pub fn apply(&self, quantity: Quantity) -> Decimal {
        match self {
            Direction::Increase => quantity.value(),
            Direction::Decrease => -quantity.value(),
        }
    }
}

impl FromStr for Direction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Increase" => Ok(Direction::Increase),
            "Decrease" => Ok(Direction::Decrease),
            _ => Err(DomainError::validation(format!("unknown direction '{s}'"))),
        }
    }
}

/// Descriptive fields a caller attaches to a posting.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MovementDetails {
    pub reference: Option<String>,
    pub reason: Option<String>,
    pub metadata: Option<JsonValue>,
    pub responsible_party: Option<String>,
}

impl MovementDetails {
    /// Normalize and validate caller-supplied details.
    ///
    /// Blank strings become `None`; metadata must be a JSON object.
    pub fn new(
        reference: Option<String>,
        reason: Option<String>,
        metadata: Option<JsonValue>,
        responsible_party: Option<String>,
    ) -> DomainResult<Self> {
        let reference = bounded("reference", reference, REFERENCE_MAX_LEN)?;
        let reason = bounded("reason", reason, REASON_MAX_LEN)?;
        let responsible_party =
            bounded("responsible_party", responsible_party, RESPONSIBLE_PARTY_MAX_LEN)?;

        let metadata = match metadata {
            None | Some(JsonValue::Null) => None,
            Some(v @ JsonValue::Object(_)) => Some(v),
            Some(_) => return Err(DomainError::validation("metadata must be a JSON object")),
        };

        Ok(Self {
            reference,
            reason,
            metadata,
            responsible_party,
        })
    }

    /// Re-run normalization on details built field by field.
    pub fn validated(self) -> DomainResult<Self> {
        Self::new(self.reference, self.reason, self.metadata, self.responsible_party)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    fn metadata_document(&self) -> JsonValue {
        self.metadata
            .clone()
            .unwrap_or_else(|| JsonValue::Object(Default::default()))
    }
}

fn bounded(field: &str, value: Option<String>, max: usize) -> DomainResult<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if value.chars().count() > max {
        return Err(DomainError::validation(format!(
            "{field} cannot exceed {max} characters"
        )));
    }
    Ok(Some(value.to_string()))
}

/// A movement ready to be appended (not yet assigned an id or timestamp).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub farm_id: FarmId,
    pub item_id: ItemId,
    pub quantity: Quantity,
    pub movement_type: MovementType,
    pub direction: Direction,
    pub unit: Unit,
    pub reference: Option<String>,
    pub reason: Option<String>,
    pub transfer_group_id: Option<TransferGroupId>,
    pub metadata: JsonValue,
    pub responsible_party: Option<String>,
}

impl NewMovement {
    pub(crate) fn build(
        key: BalanceKey,
        movement_type: MovementType,
        direction: Direction,
        quantity: Quantity,
        unit: Unit,
        details: &MovementDetails,
        transfer_group_id: Option<TransferGroupId>,
    ) -> Self {
        Self {
            farm_id: key.farm_id,
            item_id: key.item_id,
            quantity,
            movement_type,
            direction,
            unit,
            reference: details.reference.clone(),
            reason: details.reason.clone(),
            transfer_group_id,
            metadata: details.metadata_document(),
            responsible_party: details.responsible_party.clone(),
        }
    }

    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.farm_id, self.item_id)
    }

    pub fn signed_quantity(&self) -> Decimal {
        self.direction.apply(self.quantity)
    }

    /// Stamp the store-assigned identity onto this movement.
    pub fn into_movement(self, id: MovementId, created_at: DateTime<Utc>) -> Movement {
        Movement {
            id,
            farm_id: self.farm_id,
            item_id: self.item_id,
            quantity: self.quantity,
            movement_type: self.movement_type,
            direction: self.direction,
            unit: self.unit,
            reference: self.reference,
            reason: self.reason,
            transfer_group_id: self.transfer_group_id,
            metadata: self.metadata,
            responsible_party: self.responsible_party,
            created_at,
        }
    }
}

/// An appended, immutable movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// Monotonically increasing position in the movement log.
    pub id: MovementId,
    pub farm_id: FarmId,
    pub item_id: ItemId,
    pub quantity: Quantity,
    pub movement_type: MovementType,
    pub direction: Direction,
    pub unit: Unit,
    pub reference: Option<String>,
    pub reason: Option<String>,
    pub transfer_group_id: Option<TransferGroupId>,
    pub metadata: JsonValue,
    pub responsible_party: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Movement {
    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.farm_id, self.item_id)
    }

    pub fn signed_quantity(&self) -> Decimal {
        self.direction.apply(self.quantity)
    }
}
