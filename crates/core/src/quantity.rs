//! Stock quantities and units of measure.
//!
//! Quantities are fixed-point decimals with at most [`QUANTITY_SCALE`] fractional
//! digits, matching the `NUMERIC(18,3)` columns they are persisted into.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Maximum number of fractional digits a quantity may carry.
pub const QUANTITY_SCALE: u32 = 3;

/// Maximum length of a unit code.
pub const UNIT_MAX_LEN: usize = 20;

/// Largest magnitude a `NUMERIC(18,3)` column holds.
pub const QUANTITY_MAX: Decimal = Decimal::from_parts(2_808_348_671, 232_830_643, 0, false, 3);

/// Unit assigned to a balance row that has never been given one.
pub const DEFAULT_UNIT: &str = "kg";

/// Validate that a decimal fits the persisted precision and range.
pub fn ensure_scale(value: Decimal, what: &str) -> DomainResult<()> {
    if value.normalize().scale() > QUANTITY_SCALE {
        return Err(DomainError::validation(format!(
            "{what} supports at most {QUANTITY_SCALE} fractional digits"
        )));
    }
    if value.abs() > QUANTITY_MAX {
        return Err(DomainError::validation(format!(
            "{what} cannot exceed {QUANTITY_MAX}"
        )));
    }
    Ok(())
}

/// Validate a signed, non-zero adjustment delta.
pub fn ensure_delta(delta: Decimal) -> DomainResult<()> {
    if delta.is_zero() {
        return Err(DomainError::validation("delta cannot be zero"));
    }
    ensure_scale(delta, "delta")
}

/// Non-negative stock quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    /// Any non-negative quantity (balances, physical counts).
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        ensure_scale(value, "quantity")?;
        Ok(Self(value.normalize()))
    }

    /// A strictly positive quantity (entries, exits, transfers).
    pub fn positive(value: Decimal) -> DomainResult<Self> {
        if value <= Decimal::ZERO {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        Self::new(value)
    }

    /// Magnitude of a signed delta.
    pub fn abs_of(delta: Decimal) -> DomainResult<Self> {
        Self::new(delta.abs())
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Add, failing with a validation error past [`QUANTITY_MAX`].
    pub fn checked_add(self, other: Quantity) -> DomainResult<Quantity> {
        let sum = self
            .0
            .checked_add(other.0)
            .ok_or_else(|| DomainError::validation("quantity overflow"))?;
        if sum > QUANTITY_MAX {
            return Err(DomainError::validation(format!(
                "resulting quantity {sum} exceeds {QUANTITY_MAX}"
            )));
        }
        Ok(Quantity(sum.normalize()))
    }

    /// Subtract, returning `None` when the result would be negative.
    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        if other.0 > self.0 {
            return None;
        }
        Some(Quantity((self.0 - other.0).normalize()))
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

/// Unit of measure code (e.g. `kg`, `bag`, `l`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Unit(String);

impl Unit {
    pub fn new(code: impl AsRef<str>) -> DomainResult<Self> {
        let code = code.as_ref().trim();
        if code.is_empty() {
            return Err(DomainError::validation("unit cannot be empty"));
        }
        if code.chars().count() > UNIT_MAX_LEN {
            return Err(DomainError::validation(format!(
                "unit cannot exceed {UNIT_MAX_LEN} characters"
            )));
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Unit {
    fn default() -> Self {
        Self(DEFAULT_UNIT.to_string())
    }
}

impl core::fmt::Display for Unit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
