//! `avicola-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod quantity;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::{FarmId, ItemId, MovementId, TransferGroupId};
pub use quantity::{DEFAULT_UNIT, QUANTITY_MAX, QUANTITY_SCALE, Quantity, Unit, ensure_delta, ensure_scale};
pub use version::ExpectedVersion;
