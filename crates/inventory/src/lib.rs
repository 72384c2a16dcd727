//! Farm inventory ledger domain.
//!
//! This crate contains the business rules for stock balances and the movement
//! log, implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage).

pub mod balance;
pub mod kardex;
pub mod movement;
pub mod posting;

#[cfg(test)]
mod ledger_properties;

pub use balance::{Balance, BalanceKey};
pub use kardex::{Kardex, KardexAudit, KardexLine, audit, replay};
pub use movement::{Direction, Movement, MovementDetails, MovementType, NewMovement};
pub use posting::{
    BalanceWrite, CountOutcome, CountedBalance, PHYSICAL_COUNT_REASON, Posting, plan_stock_count,
    post_adjust, post_entry, post_exit, post_transfer,
};
