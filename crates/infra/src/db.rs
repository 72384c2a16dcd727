//! Database wiring: connection pool and schema bootstrap.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::ledger_store::StoreError;
use crate::ledger_store::postgres::map_sqlx_error;

/// Ledger schema (master tables, balances, movement log, append-only trigger).
pub const SCHEMA: &str = include_str!("../migrations/0001_inventory_ledger.sql");

#[instrument(skip(config), fields(max_connections = config.max_connections), err)]
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

/// Create the ledger tables if they do not exist yet.
#[instrument(skip(pool), err)]
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    info!("inventory ledger schema ready");
    Ok(())
}
