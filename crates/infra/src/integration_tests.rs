//! Integration tests for the full posting pipeline.
//!
//! Tests: Command → catalog → decide → LedgerStore → Kardex
//!
//! Verifies:
//! - Postings update balances and append explaining movements
//! - Failed postings leave balances and the log untouched
//! - Optimistic concurrency conflicts are retried, then surfaced

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use serde_json::json;

    use avicola_core::{FarmId, ItemId, MovementId, Quantity, Unit};
    use avicola_inventory::{
        Balance, BalanceKey, Direction, Movement, MovementDetails, MovementType, PHYSICAL_COUNT_REASON,
        Posting,
    };

    use crate::catalog::{InMemoryCatalog, ItemRef};
    use crate::config::RetryPolicy;
    use crate::kardex::KardexReporter;
    use crate::ledger::{InventoryLedger, LedgerError, PostAdjust, PostEntry, PostExit, PostTransfer};
    use crate::ledger_store::{
        InMemoryLedgerStore, LedgerStore, MovementFilter, MovementQuery, Pagination, StoreError,
    };
    use crate::reconciler::{StockCount, StockCountLine, StockCountReconciler};

    type Ledger<S> = InventoryLedger<S, InMemoryCatalog>;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn key(farm: i64, item: i64) -> BalanceKey {
        BalanceKey::new(FarmId::new(farm), ItemId::new(item))
    }

    fn catalog() -> InMemoryCatalog {
        let catalog = InMemoryCatalog::new();
        catalog.register_farm(FarmId::new(1)).unwrap();
        catalog.register_farm(FarmId::new(2)).unwrap();
        catalog.register_item(ItemId::new(10), Some("MAIZ-01")).unwrap();
        catalog.register_item(ItemId::new(11), Some("SOYA-02")).unwrap();
        catalog
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    fn setup() -> (Arc<Ledger<Arc<InMemoryLedgerStore>>>, Arc<InMemoryLedgerStore>) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let ledger = Arc::new(InventoryLedger::new(store.clone(), catalog(), fast_retry(5)));
        (ledger, store)
    }

    fn entry(farm: i64, item: i64, quantity: &str) -> PostEntry {
        PostEntry {
            farm_id: FarmId::new(farm),
            item: ItemRef::Id(item),
            quantity: dec(quantity),
            unit: Some("kg".to_string()),
            details: MovementDetails::default(),
        }
    }

    fn exit(farm: i64, item: i64, quantity: &str) -> PostExit {
        PostExit {
            farm_id: FarmId::new(farm),
            item: ItemRef::Id(item),
            quantity: dec(quantity),
            unit: None,
            details: MovementDetails::default(),
        }
    }

    fn adjust(farm: i64, item: i64, delta: &str) -> PostAdjust {
        PostAdjust {
            farm_id: FarmId::new(farm),
            item: ItemRef::Id(item),
            delta: dec(delta),
            unit: None,
            details: MovementDetails::default(),
        }
    }

    fn transfer(from: i64, to: i64, item: i64, quantity: &str) -> PostTransfer {
        PostTransfer {
            from_farm_id: FarmId::new(from),
            to_farm_id: FarmId::new(to),
            item: ItemRef::Id(item),
            quantity: dec(quantity),
            unit: None,
            details: MovementDetails::default(),
        }
    }

    async fn quantity_of<S: LedgerStore>(store: &S, k: BalanceKey) -> Decimal {
        store.load_balances(&[k]).await.unwrap()[0]
            .as_ref()
            .map(|b| b.quantity.value())
            .unwrap_or(Decimal::ZERO)
    }

    async fn movements_of(store: &InMemoryLedgerStore, k: BalanceKey) -> Vec<Movement> {
        store.history(k, None).await.unwrap().movements
    }

    #[tokio::test]
    async fn entry_on_empty_pair_creates_balance_and_movement() {
        let (ledger, store) = setup();

        let m = ledger.post_entry(entry(1, 10, "100")).await.unwrap();

        assert_eq!(m.movement_type, MovementType::Entry);
        assert_eq!(m.direction, Direction::Increase);
        assert_eq!(m.quantity.value(), dec("100"));
        assert_eq!(m.unit.as_str(), "kg");
        assert_eq!(m.metadata, json!({}));
        assert_eq!(quantity_of(&store, key(1, 10)).await, dec("100"));
        assert_eq!(movements_of(&store, key(1, 10)).await.len(), 1);
    }

    #[tokio::test]
    async fn exit_beyond_balance_is_rejected_and_changes_nothing() {
        let (ledger, store) = setup();
        ledger.post_entry(entry(1, 10, "100")).await.unwrap();

        let err = ledger.post_exit(exit(1, 10, "150")).await.unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                available: dec("100"),
                requested: dec("150"),
            }
        );
        assert_eq!(quantity_of(&store, key(1, 10)).await, dec("100"));
        assert_eq!(movements_of(&store, key(1, 10)).await.len(), 1);
    }

    #[tokio::test]
    async fn exit_on_untouched_pair_is_insufficient_stock() {
        let (ledger, store) = setup();
        let err = ledger.post_exit(exit(1, 11, "1")).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { .. }));
        assert!(store.get_balance(key(1, 11)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transfer_moves_stock_with_paired_movements() {
        let (ledger, store) = setup();
        ledger.post_entry(entry(1, 10, "100")).await.unwrap();

        let receipt = ledger.post_transfer(transfer(1, 2, 10, "40")).await.unwrap();

        assert_eq!(quantity_of(&store, key(1, 10)).await, dec("60"));
        assert_eq!(quantity_of(&store, key(2, 10)).await, dec("40"));
        assert_eq!(receipt.outbound.movement_type, MovementType::TransferOut);
        assert_eq!(receipt.outbound.farm_id, FarmId::new(1));
        assert_eq!(receipt.inbound.movement_type, MovementType::TransferIn);
        assert_eq!(receipt.inbound.farm_id, FarmId::new(2));
        assert_eq!(receipt.outbound.transfer_group_id, Some(receipt.transfer_group_id));
        assert_eq!(receipt.inbound.transfer_group_id, Some(receipt.transfer_group_id));
    }

    #[tokio::test]
    async fn short_transfer_leaves_both_farms_untouched() {
        let (ledger, store) = setup();
        ledger.post_entry(entry(1, 10, "10")).await.unwrap();
        ledger.post_entry(entry(2, 10, "5")).await.unwrap();

        let err = ledger.post_transfer(transfer(1, 2, 10, "11")).await.unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientStock { .. }));
        assert_eq!(quantity_of(&store, key(1, 10)).await, dec("10"));
        assert_eq!(quantity_of(&store, key(2, 10)).await, dec("5"));
        let page = store
            .query_movements(FarmId::new(1), MovementFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn transfer_to_same_farm_is_validation() {
        let (ledger, _) = setup();
        let err = ledger.post_transfer(transfer(1, 1, 10, "1")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn adjust_records_magnitude_and_direction() {
        let (ledger, store) = setup();
        ledger.post_entry(entry(1, 10, "60")).await.unwrap();

        let m = ledger.post_adjust(adjust(1, 10, "-10")).await.unwrap();

        assert_eq!(quantity_of(&store, key(1, 10)).await, dec("50"));
        assert_eq!(m.movement_type, MovementType::Adjust);
        assert_eq!(m.quantity.value(), dec("10"));
        assert_eq!(m.direction, Direction::Decrease);
    }

    #[tokio::test]
    async fn adjust_below_zero_is_negative_balance() {
        let (ledger, store) = setup();
        ledger.post_entry(entry(1, 10, "5")).await.unwrap();

        let err = ledger.post_adjust(adjust(1, 10, "-5.5")).await.unwrap_err();

        assert_eq!(
            err,
            LedgerError::NegativeBalance {
                current: dec("5"),
                delta: dec("-5.5"),
            }
        );
        assert_eq!(quantity_of(&store, key(1, 10)).await, dec("5"));
    }

    #[tokio::test]
    async fn positive_adjust_creates_missing_row() {
        let (ledger, store) = setup();
        ledger.post_adjust(adjust(2, 11, "2.125")).await.unwrap();
        assert_eq!(quantity_of(&store, key(2, 11)).await, dec("2.125"));
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_any_write() {
        let (ledger, store) = setup();

        let cases = vec![
            ledger.post_entry(entry(1, 10, "0")).await,
            ledger.post_entry(entry(1, 10, "-3")).await,
            ledger.post_entry(entry(1, 10, "1.0001")).await,
            ledger.post_entry(entry(9, 10, "1")).await,
            ledger.post_entry(entry(1, 99, "1")).await,
            ledger.post_adjust(adjust(1, 10, "0")).await,
        ];
        for result in cases {
            assert!(matches!(result, Err(LedgerError::Validation(_))), "{result:?}");
        }

        let mut bad_metadata = entry(1, 10, "1");
        bad_metadata.details.metadata = Some(json!("not an object"));
        assert!(matches!(
            ledger.post_entry(bad_metadata).await,
            Err(LedgerError::Validation(_))
        ));

        let mut long_reference = entry(1, 10, "1");
        long_reference.details.reference = Some("x".repeat(51));
        assert!(matches!(
            ledger.post_entry(long_reference).await,
            Err(LedgerError::Validation(_))
        ));

        assert!(store.list_balances(FarmId::new(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn quantities_beyond_column_range_are_validation_errors() {
        let (ledger, store) = setup();

        let result = ledger.post_entry(entry(1, 10, "10000000000000000000")).await;
        assert!(matches!(result, Err(LedgerError::Validation(_))), "{result:?}");
        assert!(store.list_balances(FarmId::new(1)).await.unwrap().is_empty());

        ledger.post_entry(entry(1, 10, "999999999999999")).await.unwrap();
        ledger.post_entry(entry(2, 10, "5")).await.unwrap();
        let before = movements_of(&store, key(1, 10)).await.len();

        let crossing = vec![
            ledger.post_entry(entry(1, 10, "1")).await.map(|_| ()),
            ledger.post_adjust(adjust(1, 10, "1")).await.map(|_| ()),
            ledger.post_transfer(transfer(2, 1, 10, "1")).await.map(|_| ()),
        ];
        for result in crossing {
            assert!(matches!(result, Err(LedgerError::Validation(_))), "{result:?}");
        }

        assert_eq!(quantity_of(&store, key(1, 10)).await, dec("999999999999999"));
        assert_eq!(quantity_of(&store, key(2, 10)).await, dec("5"));
        assert_eq!(movements_of(&store, key(1, 10)).await.len(), before);

        ledger.post_entry(entry(1, 10, "0.999")).await.unwrap();
        assert_eq!(quantity_of(&store, key(1, 10)).await, dec("999999999999999.999"));
    }

    #[tokio::test]
    async fn item_can_be_named_by_code() {
        let (ledger, store) = setup();
        let mut cmd = entry(1, 0, "3");
        cmd.item = ItemRef::Code("SOYA-02".to_string());

        let m = ledger.post_entry(cmd).await.unwrap();

        assert_eq!(m.item_id, ItemId::new(11));
        assert_eq!(quantity_of(&store, key(1, 11)).await, dec("3"));
    }

    #[tokio::test]
    async fn unit_mismatch_on_stocked_balance_is_rejected() {
        let (ledger, store) = setup();
        ledger.post_entry(entry(1, 10, "5")).await.unwrap();

        let mut bags = exit(1, 10, "1");
        bags.unit = Some("bag".to_string());
        assert!(matches!(
            ledger.post_exit(bags).await,
            Err(LedgerError::Validation(msg)) if msg.contains("unit mismatch")
        ));

        // Once empty, the balance may switch unit.
        ledger.post_exit(exit(1, 10, "5")).await.unwrap();
        let mut switch = entry(1, 10, "2");
        switch.unit = Some("bag".to_string());
        ledger.post_entry(switch).await.unwrap();

        let balance = store.get_balance(key(1, 10)).await.unwrap().unwrap();
        assert_eq!(balance.unit, Unit::new("bag").unwrap());
    }

    #[tokio::test]
    async fn responsible_party_and_details_reach_the_movement() {
        let (ledger, store) = setup();
        let mut cmd = entry(1, 10, "4");
        cmd.details = MovementDetails::new(
            Some("GR-118".into()),
            Some("feed delivery".into()),
            Some(json!({"truck": "T-9"})),
            Some("ana@granja".into()),
        )
        .unwrap();

        let m = ledger.post_entry(cmd).await.unwrap();
        assert_eq!(m.reference.as_deref(), Some("GR-118"));
        assert_eq!(m.responsible_party.as_deref(), Some("ana@granja"));

        let fetched = ledger.get_movement(m.id).await.unwrap();
        assert_eq!(fetched, m);
        let balance = store.get_balance(key(1, 10)).await.unwrap().unwrap();
        assert_eq!(balance.responsible_party.as_deref(), Some("ana@granja"));
    }

    #[tokio::test]
    async fn stock_count_forces_counted_values() {
        let (ledger, store) = setup();
        ledger.post_entry(entry(1, 10, "50")).await.unwrap();
        ledger.post_entry(entry(1, 11, "7")).await.unwrap();
        let reconciler = StockCountReconciler::new(ledger.clone());

        let result = reconciler
            .apply(StockCount {
                farm_id: FarmId::new(1),
                lines: vec![
                    StockCountLine { item: ItemRef::Id(10), counted: dec("45") },
                    StockCountLine { item: ItemRef::Code("SOYA-02".into()), counted: dec("7") },
                ],
                details: MovementDetails::default(),
            })
            .await
            .unwrap();

        assert_eq!(quantity_of(&store, key(1, 10)).await, dec("45"));
        assert_eq!(quantity_of(&store, key(1, 11)).await, dec("7"));
        assert_eq!(result.adjusted_lines(), 1);

        let line = &result.lines[0];
        assert_eq!(line.difference, dec("-5"));
        let adjustment = line.adjustment.as_ref().unwrap();
        assert_eq!(adjustment.movement_type, MovementType::Adjust);
        assert_eq!(adjustment.quantity, Quantity::new(dec("5")).unwrap());
        assert_eq!(adjustment.direction, Direction::Decrease);
        assert_eq!(adjustment.reason.as_deref(), Some(PHYSICAL_COUNT_REASON));
        assert!(result.lines[1].adjustment.is_none());
    }

    #[tokio::test]
    async fn matching_count_appends_nothing() {
        let (ledger, store) = setup();
        ledger.post_entry(entry(1, 10, "8")).await.unwrap();
        let reconciler = StockCountReconciler::new(ledger.clone());

        let result = reconciler
            .apply(StockCount {
                farm_id: FarmId::new(1),
                lines: vec![StockCountLine { item: ItemRef::Id(10), counted: dec("8") }],
                details: MovementDetails::default(),
            })
            .await
            .unwrap();

        assert_eq!(result.adjusted_lines(), 0);
        assert_eq!(movements_of(&store, key(1, 10)).await.len(), 1);
    }

    #[tokio::test]
    async fn invalid_count_is_rejected_as_a_whole() {
        let (ledger, store) = setup();
        ledger.post_entry(entry(1, 10, "8")).await.unwrap();
        let reconciler = StockCountReconciler::new(ledger.clone());

        let duplicate = StockCount {
            farm_id: FarmId::new(1),
            lines: vec![
                StockCountLine { item: ItemRef::Id(10), counted: dec("1") },
                StockCountLine { item: ItemRef::Code("MAIZ-01".into()), counted: dec("2") },
            ],
            details: MovementDetails::default(),
        };
        assert!(matches!(reconciler.apply(duplicate).await, Err(LedgerError::Validation(_))));

        let negative = StockCount {
            farm_id: FarmId::new(1),
            lines: vec![
                StockCountLine { item: ItemRef::Id(10), counted: dec("1") },
                StockCountLine { item: ItemRef::Id(11), counted: dec("-1") },
            ],
            details: MovementDetails::default(),
        };
        assert!(matches!(reconciler.apply(negative).await, Err(LedgerError::Validation(_))));

        let empty = StockCount {
            farm_id: FarmId::new(1),
            lines: Vec::new(),
            details: MovementDetails::default(),
        };
        assert!(matches!(reconciler.apply(empty).await, Err(LedgerError::Validation(_))));

        assert_eq!(quantity_of(&store, key(1, 10)).await, dec("8"));
        assert_eq!(movements_of(&store, key(1, 10)).await.len(), 1);
    }

    #[tokio::test]
    async fn kardex_over_full_history_matches_balance() {
        let (ledger, store) = setup();
        ledger.post_entry(entry(1, 10, "100")).await.unwrap();
        ledger.post_transfer(transfer(1, 2, 10, "40")).await.unwrap();
        ledger.post_adjust(adjust(1, 10, "-10")).await.unwrap();
        ledger.post_exit(exit(1, 10, "0.5")).await.unwrap();
        let _ = ledger.post_exit(exit(1, 10, "1000")).await;

        let reporter = KardexReporter::new(store.clone());
        let kardex = reporter.kardex(key(1, 10), None, None).await.unwrap();

        let running: Vec<Decimal> = kardex.lines.iter().map(|l| l.balance_after).collect();
        assert_eq!(running, vec![dec("100"), dec("60"), dec("50"), dec("49.5")]);
        assert_eq!(kardex.closing_balance, quantity_of(&store, key(1, 10)).await);

        for k in [key(1, 10), key(2, 10), key(1, 11)] {
            assert!(reporter.audit(k).await.unwrap().consistent);
        }
    }

    #[tokio::test]
    async fn kardex_window_uses_opening_balance() {
        let (ledger, store) = setup();
        ledger.post_entry(entry(1, 10, "100")).await.unwrap();
        let second = ledger.post_exit(exit(1, 10, "30")).await.unwrap();
        ledger.post_entry(entry(1, 10, "5")).await.unwrap();

        let reporter = KardexReporter::new(store.clone());
        let kardex = reporter
            .kardex(key(1, 10), Some(second.created_at), Some(second.created_at))
            .await
            .unwrap();

        assert_eq!(kardex.opening_balance, dec("100"));
        assert_eq!(kardex.lines.len(), 1);
        assert_eq!(kardex.lines[0].movement_id, second.id);
        assert_eq!(kardex.closing_balance, dec("70"));

        let inverted = reporter
            .kardex(key(1, 10), Some(second.created_at), Some(second.created_at - chrono::Duration::seconds(1)))
            .await;
        assert!(matches!(inverted, Err(LedgerError::Validation(_))));
    }

    #[tokio::test]
    async fn listing_and_lookup_through_the_ledger() {
        let (ledger, _) = setup();
        ledger.post_entry(entry(1, 10, "1")).await.unwrap();
        ledger.post_entry(entry(1, 11, "2")).await.unwrap();
        ledger.post_exit(exit(1, 10, "1")).await.unwrap();

        let page = ledger
            .list_movements(
                FarmId::new(1),
                MovementFilter {
                    item_id: Some(ItemId::new(10)),
                    ..MovementFilter::default()
                },
                Pagination::new(Some(1), Some(1)),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert!(page.has_more);
        assert_eq!(page.items[0].movement_type, MovementType::Exit);

        let balances = ledger.list_balances(FarmId::new(1)).await.unwrap();
        assert_eq!(balances.len(), 2);
        assert_eq!(balances[0].item_id, ItemId::new(10));

        let balance = ledger.get_balance(FarmId::new(1), &ItemRef::Id(11)).await.unwrap();
        assert_eq!(balance.quantity.value(), dec("2"));
        assert!(matches!(
            ledger.get_balance(FarmId::new(2), &ItemRef::Id(11)).await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            ledger.get_movement(MovementId::new(999)).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    /// Store that fails the first `failures` commits with a fixed error.
    struct FlakyStore {
        inner: InMemoryLedgerStore,
        failures: AtomicU32,
        error: StoreError,
        commits: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32, error: StoreError) -> Self {
            Self {
                inner: InMemoryLedgerStore::new(),
                failures: AtomicU32::new(failures),
                error,
                commits: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl LedgerStore for FlakyStore {
        async fn load_balances(&self, keys: &[BalanceKey]) -> Result<Vec<Option<Balance>>, StoreError> {
            self.inner.load_balances(keys).await
        }

        async fn commit(&self, posting: Posting) -> Result<Vec<Movement>, StoreError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(self.error.clone());
            }
            self.inner.commit(posting).await
        }
    }

    #[tokio::test]
    async fn lost_races_are_retried_transparently() {
        let store = Arc::new(FlakyStore::new(2, StoreError::Concurrency("stale".into())));
        let ledger = InventoryLedger::new(store.clone(), catalog(), fast_retry(5));

        ledger.post_entry(entry(1, 10, "3")).await.unwrap();

        assert_eq!(store.commits.load(Ordering::SeqCst), 3);
        assert_eq!(quantity_of(&store.inner, key(1, 10)).await, dec("3"));
    }

    #[tokio::test]
    async fn conflict_surfaces_after_retries_are_exhausted() {
        let store = Arc::new(FlakyStore::new(10, StoreError::Concurrency("stale".into())));
        let ledger = InventoryLedger::new(store.clone(), catalog(), fast_retry(3));

        let err = ledger.post_entry(entry(1, 10, "3")).await.unwrap_err();

        assert!(matches!(err, LedgerError::ConcurrencyConflict(_)));
        assert_eq!(store.commits.load(Ordering::SeqCst), 3);
        assert_eq!(quantity_of(&store.inner, key(1, 10)).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn persistence_failures_are_not_retried() {
        let store = Arc::new(FlakyStore::new(1, StoreError::Persistence("disk on fire".into())));
        let ledger = InventoryLedger::new(store.clone(), catalog(), fast_retry(5));

        let err = ledger.post_entry(entry(1, 10, "3")).await.unwrap_err();

        assert_eq!(err, LedgerError::Persistence("disk on fire".into()));
        assert_eq!(store.commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_exits_never_oversell() {
        const STOCK: usize = 20;
        const CALLERS: usize = 50;

        let store = Arc::new(InMemoryLedgerStore::new());
        // Each conflict implies another caller committed, so CALLERS attempts always suffice.
        let ledger = Arc::new(InventoryLedger::new(
            store.clone(),
            catalog(),
            fast_retry(CALLERS as u32 + 1),
        ));
        ledger.post_entry(entry(1, 10, &STOCK.to_string())).await.unwrap();

        let mut handles = Vec::with_capacity(CALLERS);
        for _ in 0..CALLERS {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move { ledger.post_exit(exit(1, 10, "1")).await }));
        }

        let mut succeeded = 0;
        let mut short = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(LedgerError::InsufficientStock { .. }) => short += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(succeeded, STOCK);
        assert_eq!(short, CALLERS - STOCK);
        assert_eq!(quantity_of(&store, key(1, 10)).await, Decimal::ZERO);

        let audit = KardexReporter::new(store.clone()).audit(key(1, 10)).await.unwrap();
        assert!(audit.consistent);
        assert_eq!(audit.movement_count, STOCK + 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn opposite_transfers_conserve_stock() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let ledger = Arc::new(InventoryLedger::new(store.clone(), catalog(), fast_retry(200)));
        ledger.post_entry(entry(1, 10, "100")).await.unwrap();
        ledger.post_entry(entry(2, 10, "100")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..40 {
            let ledger = ledger.clone();
            let (from, to) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
            handles.push(tokio::spawn(async move {
                ledger.post_transfer(transfer(from, to, 10, "1")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let a = quantity_of(&store, key(1, 10)).await;
        let b = quantity_of(&store, key(2, 10)).await;
        assert_eq!(a + b, dec("200"));
        assert_eq!(a, dec("100"));
    }
}
