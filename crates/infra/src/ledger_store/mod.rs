//! Balance store and append-only movement log.
//!
//! This module defines the infrastructure-facing boundary the ledger commits
//! postings through, plus the read-only queries reporters use.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use query::{LedgerSnapshot, MovementFilter, MovementPage, MovementQuery, Pagination};
pub use r#trait::{LedgerStore, StoreError};
