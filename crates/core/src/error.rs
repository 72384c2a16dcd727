//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// stock rules). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. non-positive quantity, unknown item).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An exit or transfer asked for more than is on hand.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        available: Decimal,
        requested: Decimal,
    },

    /// An adjustment would leave the balance below zero.
    #[error("negative balance: current {current}, delta {delta}")]
    NegativeBalance { current: Decimal, delta: Decimal },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn insufficient_stock(available: Decimal, requested: Decimal) -> Self {
        Self::InsufficientStock {
            available,
            requested,
        }
    }

    pub fn negative_balance(current: Decimal, delta: Decimal) -> Self {
        Self::NegativeBalance { current, delta }
    }
}
