//! Infrastructure layer: ledger stores, catalog lookups, config, and the
//! posting pipeline that ties them together.

pub mod catalog;
pub mod config;
pub mod db;
pub mod kardex;
pub mod ledger;
pub mod ledger_store;
pub mod reconciler;

mod integration_tests;

pub use catalog::{CatalogResolver, FarmDirectory, InMemoryCatalog, ItemRef, PostgresCatalog};
pub use config::{AppConfig, ConfigError, DatabaseConfig, RetryPolicy};
pub use kardex::KardexReporter;
pub use ledger::{
    InventoryLedger, LedgerError, PostAdjust, PostEntry, PostExit, PostTransfer, TransferReceipt,
};
pub use ledger_store::{
    InMemoryLedgerStore, LedgerSnapshot, LedgerStore, MovementFilter, MovementPage, MovementQuery,
    Pagination, PostgresLedgerStore, StoreError,
};
pub use reconciler::{
    StockCount, StockCountLine, StockCountLineResult, StockCountReconciler, StockCountResult,
};
