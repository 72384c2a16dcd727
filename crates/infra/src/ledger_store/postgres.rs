//! Postgres-backed ledger store.
//!
//! Balances live in `farm_inventory_balances`, the movement log in
//! `farm_inventory_movements` (see `migrations/0001_inventory_ledger.sql`).
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Concurrency` | Two units inserted the same balance row |
//! | Database (serialization failure) | `40001` | `Concurrency` | Snapshot conflict |
//! | Database (deadlock detected) | `40P01` | `Concurrency` | Lock cycle broken by the server |
//! | Database (other) | Any other | `Persistence` | FK/check violations, trigger rejections |
//! | PoolClosed / other | N/A | `Persistence` | Network errors, connection failures |
//!
//! ## Commit Protocol
//!
//! One transaction per posting. Balance writes run first, in the posting's
//! key order, each as a compare-and-swap on `version`; the `UPDATE` takes the
//! row lock, so movement ids assigned afterwards follow commit order per key.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use avicola_core::{FarmId, ItemId, MovementId, Quantity, TransferGroupId, Unit};
use avicola_inventory::{Balance, BalanceKey, BalanceWrite, Movement, NewMovement, Posting};

use super::query::{LedgerSnapshot, MovementFilter, MovementPage, MovementQuery, Pagination};
use super::r#trait::{LedgerStore, StoreError};

const BALANCE_COLUMNS: &str = "farm_id, item_id, quantity, unit, location, lot_number, \
     expiration_date, unit_cost, metadata, active, responsible_party, version, created_at, updated_at";

const MOVEMENT_COLUMNS: &str = "id, farm_id, item_id, quantity, movement_type, direction, unit, \
     reference, reason, transfer_group_id, metadata, responsible_party, created_at";

/// Postgres-backed balance store and movement log.
///
/// `Send + Sync`; all work goes through the SQLx connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self, keys), fields(key_count = keys.len()), err)]
    pub async fn fetch_balances(
        &self,
        keys: &[BalanceKey],
    ) -> Result<Vec<Option<Balance>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let farm_ids: Vec<i64> = keys.iter().map(|k| k.farm_id.get()).collect();
        let item_ids: Vec<i64> = keys.iter().map(|k| k.item_id.get()).collect();

        let sql = format!(
            "SELECT {BALANCE_COLUMNS} FROM farm_inventory_balances \
             WHERE (farm_id, item_id) IN (SELECT * FROM UNNEST($1::bigint[], $2::bigint[]))"
        );
        let rows = sqlx::query(&sql)
            .bind(farm_ids)
            .bind(item_ids)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_balances", e))?;

        let mut found = HashMap::with_capacity(rows.len());
        for row in &rows {
            let balance = balance_from_row(row)?;
            found.insert(balance.key(), balance);
        }

        Ok(keys.iter().map(|k| found.get(k).cloned()).collect())
    }

    /// Apply a posting in one transaction.
    ///
    /// Any failure drops the transaction, which rolls back every write.
    #[instrument(
        skip(self, posting),
        fields(
            writes = posting.writes().len(),
            movements = posting.movements().len(),
            first_movement_id = tracing::field::Empty
        ),
        err
    )]
    pub async fn commit_posting(&self, posting: Posting) -> Result<Vec<Movement>, StoreError> {
        let (writes, movements) = posting.into_parts();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for write in &writes {
            write_balance(&mut tx, write).await?;
        }

        let mut committed = Vec::with_capacity(movements.len());
        for movement in movements {
            committed.push(insert_movement(&mut tx, movement).await?);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        if let Some(first) = committed.first() {
            Span::current().record("first_movement_id", first.id.get());
        }
        Ok(committed)
    }

    /// Read-only transaction that sees one snapshot for all its statements.
    async fn begin_snapshot(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_snapshot", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        Ok(tx)
    }
}

fn bind_balance<'q>(
    query: Query<'q, Postgres, PgArguments>,
    b: &'q Balance,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(b.farm_id.get())
        .bind(b.item_id.get())
        .bind(b.quantity.value())
        .bind(b.unit.as_str())
        .bind(b.location.as_deref())
        .bind(b.lot_number.as_deref())
        .bind(b.expiration_date)
        .bind(b.unit_cost)
        .bind(b.metadata.clone())
        .bind(b.active)
        .bind(b.responsible_party.as_deref())
        .bind(b.updated_at)
}

async fn write_balance(
    tx: &mut Transaction<'_, Postgres>,
    write: &BalanceWrite,
) -> Result<(), StoreError> {
    let balance = &write.balance;
    let key = balance.key();

    let executed = if write.expected.is_absent() {
        bind_balance(
            sqlx::query(
                r#"
                INSERT INTO farm_inventory_balances (
                    farm_id, item_id, quantity, unit, location, lot_number,
                    expiration_date, unit_cost, metadata, active, responsible_party,
                    updated_at, created_at, version
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 1)
                ON CONFLICT (farm_id, item_id) DO NOTHING
                "#,
            ),
            balance,
        )
        .bind(balance.created_at)
        .execute(&mut **tx)
        .await
    } else {
        bind_balance(
            sqlx::query(
                r#"
                UPDATE farm_inventory_balances
                SET quantity = $3,
                    unit = $4,
                    location = $5,
                    lot_number = $6,
                    expiration_date = $7,
                    unit_cost = $8,
                    metadata = $9,
                    active = $10,
                    responsible_party = $11,
                    updated_at = $12,
                    version = version + 1
                WHERE farm_id = $1 AND item_id = $2 AND version = $13
                "#,
            ),
            balance,
        )
        .bind(version_param(write.expected.get())?)
        .execute(&mut **tx)
        .await
    };
    let result = executed.map_err(|e| map_sqlx_error("write_balance", e))?;

    if result.rows_affected() != 1 {
        return Err(StoreError::Concurrency(format!(
            "{key}: balance is no longer at {}",
            write.expected
        )));
    }
    Ok(())
}

async fn insert_movement(
    tx: &mut Transaction<'_, Postgres>,
    movement: NewMovement,
) -> Result<Movement, StoreError> {
    let row = sqlx::query(
        r#"
        INSERT INTO farm_inventory_movements (
            farm_id, item_id, quantity, movement_type, direction, unit,
            reference, reason, transfer_group_id, metadata, responsible_party,
            created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, clock_timestamp())
        RETURNING id, created_at
        "#,
    )
    .bind(movement.farm_id.get())
    .bind(movement.item_id.get())
    .bind(movement.quantity.value())
    .bind(movement.movement_type.as_str())
    .bind(movement.direction.as_str())
    .bind(movement.unit.as_str())
    .bind(movement.reference.as_deref())
    .bind(movement.reason.as_deref())
    .bind(movement.transfer_group_id.map(|g| *g.as_uuid()))
    .bind(&movement.metadata)
    .bind(movement.responsible_party.as_deref())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_movement", e))?;

    let id: i64 = row
        .try_get("id")
        .map_err(|e| StoreError::Persistence(format!("failed to read movement id: {e}")))?;
    let created_at: DateTime<Utc> = row
        .try_get("created_at")
        .map_err(|e| StoreError::Persistence(format!("failed to read created_at: {e}")))?;

    Ok(movement.into_movement(MovementId::new(id), created_at))
}

fn version_param(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version)
        .map_err(|_| StoreError::Persistence(format!("version {version} out of range")))
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn load_balances(&self, keys: &[BalanceKey]) -> Result<Vec<Option<Balance>>, StoreError> {
        self.fetch_balances(keys).await
    }

    async fn commit(&self, posting: Posting) -> Result<Vec<Movement>, StoreError> {
        self.commit_posting(posting).await
    }
}

#[async_trait]
impl MovementQuery for PostgresLedgerStore {
    async fn get_movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM farm_inventory_movements WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_movement", e))?;

        row.as_ref().map(movement_from_row).transpose()
    }

    #[instrument(skip(self, filter), fields(farm_id = %farm_id, total = tracing::field::Empty), err)]
    async fn query_movements(
        &self,
        farm_id: FarmId,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let item_param: Option<i64> = filter.item_id.map(|id| id.get());
        let type_param: Option<&str> = filter.movement_type.as_ref().map(|t| t.as_str());

        let mut tx = self.begin_snapshot().await?;

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM farm_inventory_movements
            WHERE farm_id = $1
                AND ($2::timestamptz IS NULL OR created_at >= $2)
                AND ($3::timestamptz IS NULL OR created_at <= $3)
                AND ($4::bigint IS NULL OR item_id = $4)
                AND ($5::text IS NULL OR movement_type = $5)
            "#,
        )
        .bind(farm_id.get())
        .bind(filter.from)
        .bind(filter.to)
        .bind(item_param)
        .bind(type_param)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("count_movements", e))?;

        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| StoreError::Persistence(format!("failed to read total: {e}")))?;

        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM farm_inventory_movements \
             WHERE farm_id = $1 \
                 AND ($2::timestamptz IS NULL OR created_at >= $2) \
                 AND ($3::timestamptz IS NULL OR created_at <= $3) \
                 AND ($4::bigint IS NULL OR item_id = $4) \
                 AND ($5::text IS NULL OR movement_type = $5) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $6 OFFSET $7"
        );
        let offset = i64::try_from(pagination.offset()).unwrap_or(i64::MAX);
        let rows = sqlx::query(&sql)
            .bind(farm_id.get())
            .bind(filter.from)
            .bind(filter.to)
            .bind(item_param)
            .bind(type_param)
            .bind(i64::from(pagination.page_size))
            .bind(offset)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("query_movements", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_snapshot", e))?;

        let items = rows
            .iter()
            .map(movement_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Span::current().record("total", total);
        Ok(MovementPage::new(items, total.max(0) as u64, pagination))
    }

    async fn get_balance(&self, key: BalanceKey) -> Result<Option<Balance>, StoreError> {
        let sql = format!(
            "SELECT {BALANCE_COLUMNS} FROM farm_inventory_balances WHERE farm_id = $1 AND item_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(key.farm_id.get())
            .bind(key.item_id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_balance", e))?;

        row.as_ref().map(balance_from_row).transpose()
    }

    async fn list_balances(&self, farm_id: FarmId) -> Result<Vec<Balance>, StoreError> {
        let sql = format!(
            "SELECT {BALANCE_COLUMNS} FROM farm_inventory_balances WHERE farm_id = $1 ORDER BY item_id"
        );
        let rows = sqlx::query(&sql)
            .bind(farm_id.get())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_balances", e))?;

        rows.iter().map(balance_from_row).collect()
    }

    #[instrument(skip(self), fields(farm_id = %key.farm_id, item_id = %key.item_id), err)]
    async fn history(
        &self,
        key: BalanceKey,
        until: Option<DateTime<Utc>>,
    ) -> Result<LedgerSnapshot, StoreError> {
        let mut tx = self.begin_snapshot().await?;

        let sql = format!(
            "SELECT {BALANCE_COLUMNS} FROM farm_inventory_balances WHERE farm_id = $1 AND item_id = $2"
        );
        let balance_row = sqlx::query(&sql)
            .bind(key.farm_id.get())
            .bind(key.item_id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("history_balance", e))?;

        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM farm_inventory_movements \
             WHERE farm_id = $1 AND item_id = $2 \
                 AND ($3::timestamptz IS NULL OR created_at <= $3) \
             ORDER BY id ASC"
        );
        let movement_rows = sqlx::query(&sql)
            .bind(key.farm_id.get())
            .bind(key.item_id.get())
            .bind(until)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("history_movements", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_snapshot", e))?;

        Ok(LedgerSnapshot {
            balance: balance_row.as_ref().map(balance_from_row).transpose()?,
            movements: movement_rows
                .iter()
                .map(movement_from_row)
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

/// Map SQLx errors to StoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                // Unique violation: another unit inserted the same balance row.
                Some("23505") => StoreError::Concurrency(msg),
                // Serialization failure / deadlock: the unit can be re-run.
                Some("40001") | Some("40P01") => StoreError::Concurrency(msg),
                _ => StoreError::Persistence(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Persistence(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::RowNotFound => {
            StoreError::Persistence(format!("unexpected row not found in {operation}"))
        }
        _ => StoreError::Persistence(format!("sqlx error in {operation}: {err}")),
    }
}

// SQLx row types

#[derive(Debug)]
struct BalanceRow {
    farm_id: i64,
    item_id: i64,
    quantity: Decimal,
    unit: String,
    location: Option<String>,
    lot_number: Option<String>,
    expiration_date: Option<NaiveDate>,
    unit_cost: Option<Decimal>,
    metadata: Option<JsonValue>,
    active: bool,
    responsible_party: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for BalanceRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(BalanceRow {
            farm_id: row.try_get("farm_id")?,
            item_id: row.try_get("item_id")?,
            quantity: row.try_get("quantity")?,
            unit: row.try_get("unit")?,
            location: row.try_get("location")?,
            lot_number: row.try_get("lot_number")?,
            expiration_date: row.try_get("expiration_date")?,
            unit_cost: row.try_get("unit_cost")?,
            metadata: row.try_get("metadata")?,
            active: row.try_get("active")?,
            responsible_party: row.try_get("responsible_party")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<BalanceRow> for Balance {
    type Error = StoreError;

    fn try_from(row: BalanceRow) -> Result<Self, Self::Error> {
        let corrupt = |e: avicola_core::DomainError| {
            StoreError::Persistence(format!(
                "corrupt balance row (farm {}, item {}): {e}",
                row.farm_id, row.item_id
            ))
        };

        Ok(Balance {
            farm_id: FarmId::new(row.farm_id),
            item_id: ItemId::new(row.item_id),
            quantity: Quantity::new(row.quantity).map_err(corrupt)?,
            unit: Unit::new(&row.unit).map_err(corrupt)?,
            location: row.location,
            lot_number: row.lot_number,
            expiration_date: row.expiration_date,
            unit_cost: row.unit_cost,
            metadata: row.metadata,
            active: row.active,
            responsible_party: row.responsible_party,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: u64::try_from(row.version).unwrap_or(0),
        })
    }
}

fn balance_from_row(row: &PgRow) -> Result<Balance, StoreError> {
    let raw = BalanceRow::from_row(row)
        .map_err(|e| StoreError::Persistence(format!("failed to decode balance row: {e}")))?;
    Balance::try_from(raw)
}

#[derive(Debug)]
struct MovementRow {
    id: i64,
    farm_id: i64,
    item_id: i64,
    quantity: Decimal,
    movement_type: String,
    direction: String,
    unit: String,
    reference: Option<String>,
    reason: Option<String>,
    transfer_group_id: Option<Uuid>,
    metadata: JsonValue,
    responsible_party: Option<String>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            id: row.try_get("id")?,
            farm_id: row.try_get("farm_id")?,
            item_id: row.try_get("item_id")?,
            quantity: row.try_get("quantity")?,
            movement_type: row.try_get("movement_type")?,
            direction: row.try_get("direction")?,
            unit: row.try_get("unit")?,
            reference: row.try_get("reference")?,
            reason: row.try_get("reason")?,
            transfer_group_id: row.try_get("transfer_group_id")?,
            metadata: row.try_get("metadata")?,
            responsible_party: row.try_get("responsible_party")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<MovementRow> for Movement {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let corrupt = |e: avicola_core::DomainError| {
            StoreError::Persistence(format!("corrupt movement row {}: {e}", row.id))
        };

        Ok(Movement {
            id: MovementId::new(row.id),
            farm_id: FarmId::new(row.farm_id),
            item_id: ItemId::new(row.item_id),
            quantity: Quantity::new(row.quantity).map_err(corrupt)?,
            movement_type: row.movement_type.parse().map_err(corrupt)?,
            direction: row.direction.parse().map_err(corrupt)?,
            unit: Unit::new(&row.unit).map_err(corrupt)?,
            reference: row.reference,
            reason: row.reason,
            transfer_group_id: row.transfer_group_id.map(TransferGroupId::from_uuid),
            metadata: row.metadata,
            responsible_party: row.responsible_party,
            created_at: row.created_at,
        })
    }
}

fn movement_from_row(row: &PgRow) -> Result<Movement, StoreError> {
    let raw = MovementRow::from_row(row)
        .map_err(|e| StoreError::Persistence(format!("failed to decode movement row: {e}")))?;
    Movement::try_from(raw)
}
