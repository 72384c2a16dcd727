//! Ledger wiring behind the HTTP layer.
//!
//! The ledger is generic over its store and catalog, so the two deployments
//! (in-memory for dev/tests, Postgres when `DATABASE_URL` is set) are kept as
//! enum variants and every call is delegated to whichever one is running.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use avicola_core::{FarmId, MovementId};
use avicola_infra::{
    AppConfig, InMemoryCatalog, InMemoryLedgerStore, InventoryLedger, ItemRef, KardexReporter,
    LedgerError, MovementFilter, MovementPage, Pagination, PostAdjust, PostEntry, PostExit,
    PostTransfer, PostgresCatalog, PostgresLedgerStore, RetryPolicy, StockCount,
    StockCountReconciler, StockCountResult, StoreError, TransferReceipt, db,
};
use avicola_inventory::{Balance, BalanceKey, Kardex, KardexAudit, Movement};

type InMemoryLedger = InventoryLedger<Arc<InMemoryLedgerStore>, Arc<InMemoryCatalog>>;
type PersistentLedger = InventoryLedger<Arc<PostgresLedgerStore>, Arc<PostgresCatalog>>;

#[derive(Clone)]
pub enum AppServices {
    InMemory {
        ledger: Arc<InMemoryLedger>,
        reconciler: StockCountReconciler<Arc<InMemoryLedgerStore>, Arc<InMemoryCatalog>>,
        kardex: KardexReporter<Arc<InMemoryLedgerStore>>,
    },
    Persistent {
        ledger: Arc<PersistentLedger>,
        reconciler: StockCountReconciler<Arc<PostgresLedgerStore>, Arc<PostgresCatalog>>,
        kardex: KardexReporter<Arc<PostgresLedgerStore>>,
    },
}

/// Run the same expression against whichever ledger variant is active.
macro_rules! delegate {
    ($services:expr, |$ledger:ident, $reconciler:ident, $kardex:ident| $body:expr) => {
        match $services {
            AppServices::InMemory {
                ledger: $ledger,
                reconciler: $reconciler,
                kardex: $kardex,
            } => $body,
            AppServices::Persistent {
                ledger: $ledger,
                reconciler: $reconciler,
                kardex: $kardex,
            } => $body,
        }
    };
}

/// Build services from configuration: Postgres when a database is
/// configured, in-memory otherwise.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, StoreError> {
    let Some(database) = &config.database else {
        tracing::warn!("DATABASE_URL not set; running on in-memory ledger stores");
        return Ok(AppServices::in_memory(
            Arc::new(InMemoryCatalog::permissive()),
            config.retry,
        ));
    };

    let pool = db::connect(database).await?;
    db::ensure_schema(&pool).await?;

    let store = Arc::new(PostgresLedgerStore::new(pool.clone()));
    let catalog = Arc::new(PostgresCatalog::new(pool));
    Ok(AppServices::persistent(store, catalog, config.retry))
}

impl AppServices {
    pub fn in_memory(catalog: Arc<InMemoryCatalog>, retry: RetryPolicy) -> Self {
        let store = Arc::new(InMemoryLedgerStore::new());
        let ledger = Arc::new(InventoryLedger::new(store.clone(), catalog, retry));
        AppServices::InMemory {
            reconciler: StockCountReconciler::new(ledger.clone()),
            kardex: KardexReporter::new(store),
            ledger,
        }
    }

    pub fn persistent(
        store: Arc<PostgresLedgerStore>,
        catalog: Arc<PostgresCatalog>,
        retry: RetryPolicy,
    ) -> Self {
        let ledger = Arc::new(InventoryLedger::new(store.clone(), catalog, retry));
        AppServices::Persistent {
            reconciler: StockCountReconciler::new(ledger.clone()),
            kardex: KardexReporter::new(store),
            ledger,
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            AppServices::InMemory { .. } => "in_memory",
            AppServices::Persistent { .. } => "postgres",
        }
    }

    pub async fn post_entry(&self, cmd: PostEntry) -> Result<Movement, LedgerError> {
        delegate!(self, |ledger, _r, _k| ledger.post_entry(cmd).await)
    }

    pub async fn post_exit(&self, cmd: PostExit) -> Result<Movement, LedgerError> {
        delegate!(self, |ledger, _r, _k| ledger.post_exit(cmd).await)
    }

    pub async fn post_transfer(&self, cmd: PostTransfer) -> Result<TransferReceipt, LedgerError> {
        delegate!(self, |ledger, _r, _k| ledger.post_transfer(cmd).await)
    }

    pub async fn post_adjust(&self, cmd: PostAdjust) -> Result<Movement, LedgerError> {
        delegate!(self, |ledger, _r, _k| ledger.post_adjust(cmd).await)
    }

    pub async fn apply_stock_count(&self, count: StockCount) -> Result<StockCountResult, LedgerError> {
        delegate!(self, |_l, reconciler, _k| reconciler.apply(count).await)
    }

    pub async fn get_movement(&self, id: MovementId) -> Result<Movement, LedgerError> {
        delegate!(self, |ledger, _r, _k| ledger.get_movement(id).await)
    }

    pub async fn list_movements(
        &self,
        farm_id: FarmId,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, LedgerError> {
        delegate!(self, |ledger, _r, _k| {
            ledger.list_movements(farm_id, filter, pagination).await
        })
    }

    pub async fn get_balance(&self, farm_id: FarmId, item: &ItemRef) -> Result<Balance, LedgerError> {
        delegate!(self, |ledger, _r, _k| ledger.get_balance(farm_id, item).await)
    }

    pub async fn list_balances(&self, farm_id: FarmId) -> Result<Vec<Balance>, LedgerError> {
        delegate!(self, |ledger, _r, _k| ledger.list_balances(farm_id).await)
    }

    pub async fn kardex(
        &self,
        farm_id: FarmId,
        item: &ItemRef,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Kardex, LedgerError> {
        let key = self.report_key(farm_id, item).await?;
        delegate!(self, |_l, _r, kardex| kardex.kardex(key, from, to).await)
    }

    pub async fn audit(&self, farm_id: FarmId, item: &ItemRef) -> Result<KardexAudit, LedgerError> {
        let key = self.report_key(farm_id, item).await?;
        delegate!(self, |_l, _r, kardex| kardex.audit(key).await)
    }

    /// Reports on an item the catalog does not know are `NotFound`.
    async fn report_key(&self, farm_id: FarmId, item: &ItemRef) -> Result<BalanceKey, LedgerError> {
        let resolved = delegate!(self, |ledger, _r, _k| ledger.resolve_item(item).await);
        match resolved {
            Ok(item_id) => Ok(BalanceKey::new(farm_id, item_id)),
            Err(LedgerError::Validation(msg)) => Err(LedgerError::NotFound(msg)),
            Err(other) => Err(other),
        }
    }
}
