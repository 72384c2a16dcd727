//! Property tests: postings applied in sequence keep the balance cache and the
//! movement log in agreement.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;

use avicola_core::{DomainError, FarmId, ItemId, MovementId, Quantity, TransferGroupId, Unit};

use crate::{
    Balance, BalanceKey, CountedBalance, Movement, MovementDetails, Posting, audit, plan_stock_count,
    post_adjust, post_entry, post_exit, post_transfer, replay,
};

const ITEM: i64 = 10;

#[derive(Debug, Clone)]
enum Op {
    Entry { farm: i64, tenths: i64 },
    Exit { farm: i64, tenths: i64 },
    Adjust { farm: i64, tenths: i64 },
    Transfer { from: i64, to: i64, tenths: i64 },
    Count { farm: i64, tenths: i64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..=3, 1i64..=5_000).prop_map(|(farm, tenths)| Op::Entry { farm, tenths }),
        (1i64..=3, 1i64..=5_000).prop_map(|(farm, tenths)| Op::Exit { farm, tenths }),
        (1i64..=3, -5_000i64..=5_000)
            .prop_filter("non-zero delta", |(_, t)| *t != 0)
            .prop_map(|(farm, tenths)| Op::Adjust { farm, tenths }),
        (1i64..=3, 1i64..=3, 1i64..=5_000).prop_map(|(from, to, tenths)| Op::Transfer { from, to, tenths }),
        (1i64..=3, 0i64..=5_000).prop_map(|(farm, tenths)| Op::Count { farm, tenths }),
    ]
}

/// Minimal stand-in for a store: checks versions and appends, nothing more.
#[derive(Default)]
struct Book {
    balances: HashMap<BalanceKey, Balance>,
    movements: Vec<Movement>,
}

impl Book {
    fn load(&self, farm: i64) -> Balance {
        let key = BalanceKey::new(FarmId::new(farm), ItemId::new(ITEM));
        self.balances
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Balance::empty(key, Utc::now()))
    }

    fn commit(&mut self, posting: Posting) {
        let (writes, movements) = posting.into_parts();
        for w in writes {
            let current = self.balances.get(&w.balance.key()).map(|b| b.version).unwrap_or(0);
            assert!(w.expected.matches(current), "stale write in single-threaded book");
            let mut next = w.balance;
            next.version = current + 1;
            self.balances.insert(next.key(), next);
        }
        let t0 = Utc::now();
        for m in movements {
            let id = self.movements.len() as i64 + 1;
            self.movements.push(m.into_movement(MovementId::new(id), t0 + Duration::microseconds(id)));
        }
    }

    fn total(&self) -> Decimal {
        self.balances.values().map(|b| b.quantity.value()).sum()
    }
}

fn run(book: &mut Book, op: &Op) -> Result<(), DomainError> {
    let details = MovementDetails::default();
    let now = Utc::now();
    let posting = match *op {
        Op::Entry { farm, tenths } => post_entry(
            &book.load(farm),
            Quantity::positive(Decimal::new(tenths, 1))?,
            &Unit::default(),
            &details,
            now,
        )?,
        Op::Exit { farm, tenths } => post_exit(
            &book.load(farm),
            Quantity::positive(Decimal::new(tenths, 1))?,
            None,
            &details,
            now,
        )?,
        Op::Adjust { farm, tenths } => {
            post_adjust(&book.load(farm), Decimal::new(tenths, 1), None, &details, now)?
        }
        Op::Transfer { from, to, tenths } => post_transfer(
            &book.load(from),
            &book.load(to),
            Quantity::positive(Decimal::new(tenths, 1))?,
            None,
            &details,
            TransferGroupId::new(),
            now,
        )?,
        Op::Count { farm, tenths } => {
            let line = CountedBalance {
                balance: book.load(farm),
                counted: Quantity::new(Decimal::new(tenths, 1))?,
            };
            plan_stock_count(&[line], &details, now)?.0
        }
    };
    book.commit(posting);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    /// Property: after any sequence of postings (failed ones included), every
    /// balance equals the signed sum of its movements and is never negative.
    #[test]
    fn balances_are_rederivable_from_the_log(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut book = Book::default();

        for op in &ops {
            let movements_before = book.movements.len();
            let balances_before = book.balances.clone();
            if run(&mut book, op).is_err() {
                prop_assert_eq!(book.movements.len(), movements_before);
                prop_assert_eq!(&book.balances, &balances_before);
            }
        }

        for (key, balance) in &book.balances {
            prop_assert!(balance.quantity.value() >= Decimal::ZERO);
            let report = audit(*key, Some(balance), &book.movements);
            prop_assert!(report.consistent, "drift at {}: {:?}", key, report);
        }
    }

    /// Property: transfers conserve total stock across farms.
    #[test]
    fn transfers_conserve_total_stock(
        seed in prop::collection::vec((1i64..=3, 1i64..=5_000), 1..5),
        transfers in prop::collection::vec((1i64..=3, 1i64..=3, 1i64..=5_000), 1..30),
    ) {
        let mut book = Book::default();
        for (farm, tenths) in seed {
            run(&mut book, &Op::Entry { farm, tenths }).unwrap();
        }
        let total = book.total();

        for (from, to, tenths) in transfers {
            let _ = run(&mut book, &Op::Transfer { from, to, tenths });
            prop_assert_eq!(book.total(), total);
        }
    }

    /// Property: a count always lands the balance on the counted value.
    #[test]
    fn count_forces_counted_value(start in 0i64..=5_000, counted in 0i64..=5_000) {
        let mut book = Book::default();
        if start > 0 {
            run(&mut book, &Op::Entry { farm: 1, tenths: start }).unwrap();
        }
        let before = book.movements.len();

        run(&mut book, &Op::Count { farm: 1, tenths: counted }).unwrap();

        prop_assert_eq!(book.load(1).quantity.value(), Decimal::new(counted, 1));
        let appended = book.movements.len() - before;
        prop_assert_eq!(appended, usize::from(start != counted));
        if let Some(m) = book.movements.get(before) {
            prop_assert_eq!(m.quantity.value(), Decimal::new((counted - start).abs(), 1));
        }

        let key = BalanceKey::new(FarmId::new(1), ItemId::new(ITEM));
        let k = replay(key, &book.movements, None, None);
        prop_assert_eq!(k.closing_balance, Decimal::new(counted, 1));
    }
}
