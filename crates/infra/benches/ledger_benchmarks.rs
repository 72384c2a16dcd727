use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::runtime::Runtime;

use avicola_core::{FarmId, ItemId};
use avicola_infra::{
    InMemoryCatalog, InMemoryLedgerStore, InventoryLedger, ItemRef, LedgerStore, MovementQuery,
    PostEntry, PostExit, PostTransfer, RetryPolicy, StockCount, StockCountLine,
    StockCountReconciler,
};
use avicola_inventory::{BalanceKey, MovementDetails, replay};

type Ledger = InventoryLedger<Arc<InMemoryLedgerStore>, Arc<InMemoryCatalog>>;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn setup() -> (Arc<Ledger>, Arc<InMemoryLedgerStore>) {
    let store = Arc::new(InMemoryLedgerStore::new());
    let ledger = Arc::new(InventoryLedger::new(
        store.clone(),
        Arc::new(InMemoryCatalog::permissive()),
        RetryPolicy::new(5, Duration::ZERO),
    ));
    (ledger, store)
}

fn entry(farm: i64, item: i64, quantity: i64) -> PostEntry {
    PostEntry {
        farm_id: FarmId::new(farm),
        item: ItemRef::Id(item),
        quantity: Decimal::from(quantity),
        unit: None,
        details: MovementDetails::default(),
    }
}

fn bench_posting_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("posting_latency");
    let rt = runtime();

    group.bench_function("entry_fresh_pair", |b| {
        let (ledger, _) = setup();
        let mut item = 0;
        b.iter(|| {
            item += 1;
            rt.block_on(ledger.post_entry(entry(1, black_box(item), 10)))
                .unwrap();
        });
    });

    group.bench_function("entry_then_exit_same_pair", |b| {
        let (ledger, _) = setup();
        b.iter(|| {
            rt.block_on(async {
                ledger.post_entry(entry(1, 10, 5)).await.unwrap();
                ledger
                    .post_exit(PostExit {
                        farm_id: FarmId::new(1),
                        item: ItemRef::Id(10),
                        quantity: black_box(Decimal::from(5)),
                        unit: None,
                        details: MovementDetails::default(),
                    })
                    .await
                    .unwrap();
            });
        });
    });

    group.bench_function("transfer_round_trip", |b| {
        let (ledger, _) = setup();
        rt.block_on(ledger.post_entry(entry(1, 10, 1_000))).unwrap();
        b.iter(|| {
            rt.block_on(async {
                for (from, to) in [(1, 2), (2, 1)] {
                    ledger
                        .post_transfer(PostTransfer {
                            from_farm_id: FarmId::new(from),
                            to_farm_id: FarmId::new(to),
                            item: ItemRef::Id(10),
                            quantity: Decimal::from(7),
                            unit: None,
                            details: MovementDetails::default(),
                        })
                        .await
                        .unwrap();
                }
            });
        });
    });

    group.finish();
}

fn bench_kardex_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("kardex_replay");
    let rt = runtime();

    for movement_count in [10, 100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*movement_count as u64));
        group.bench_with_input(
            BenchmarkId::new("replay_full_history", movement_count),
            movement_count,
            |b, &count| {
                let (ledger, store) = setup();
                rt.block_on(async {
                    for i in 0..count {
                        ledger.post_entry(entry(1, 10, (i % 10) + 1)).await.unwrap();
                    }
                });
                let key = BalanceKey::new(FarmId::new(1), ItemId::new(10));
                let history = rt.block_on(store.history(key, None)).unwrap();

                b.iter(|| {
                    black_box(replay(key, black_box(&history.movements), None, None));
                });
            },
        );
    }

    group.finish();
}

fn bench_stock_count_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("stock_count_batch");
    let rt = runtime();

    for line_count in [1, 10, 100].iter() {
        group.throughput(Throughput::Elements(*line_count as u64));
        group.bench_with_input(
            BenchmarkId::new("apply_count", line_count),
            line_count,
            |b, &lines| {
                let (ledger, store) = setup();
                let reconciler = StockCountReconciler::new(ledger.clone());
                rt.block_on(async {
                    for item in 1..=lines {
                        ledger.post_entry(entry(1, item, 50)).await.unwrap();
                    }
                });

                let mut round = 0i64;
                b.iter(|| {
                    round += 1;
                    let count = StockCount {
                        farm_id: FarmId::new(1),
                        lines: (1..=lines)
                            .map(|item| StockCountLine {
                                item: ItemRef::Id(item),
                                counted: Decimal::from(40 + round % 2 * 10),
                            })
                            .collect(),
                        details: MovementDetails::default(),
                    };
                    black_box(rt.block_on(reconciler.apply(count)).unwrap());
                });

                let key = BalanceKey::new(FarmId::new(1), ItemId::new(1));
                black_box(rt.block_on(store.load_balances(&[key])).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_posting_latency,
    bench_kardex_replay,
    bench_stock_count_batch
);
criterion_main!(benches);
