//! Posting decisions (pure, deterministic).
//!
//! Each function takes the balances loaded inside a unit of work and returns a
//! [`Posting`]: the new balance states (guarded by the version they were read
//! at) plus the movements that explain them. Nothing here performs IO; the
//! store commits a posting atomically or not at all.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use avicola_core::{
    DomainError, DomainResult, ExpectedVersion, Quantity, TransferGroupId, Unit, ensure_delta,
};

use crate::balance::{Balance, BalanceKey};
use crate::movement::{Direction, MovementDetails, MovementType, NewMovement};

/// Reason recorded on adjustments produced by a physical count.
pub const PHYSICAL_COUNT_REASON: &str = "physical count";

/// New state for one balance row, valid only if the row is still at `expected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceWrite {
    pub expected: ExpectedVersion,
    pub balance: Balance,
}

/// The complete effect of one ledger call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Posting {
    writes: Vec<BalanceWrite>,
    movements: Vec<NewMovement>,
}

impl Posting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance writes in global key order.
    pub fn writes(&self) -> &[BalanceWrite] {
        &self.writes
    }

    /// Movements in the order they must be appended.
    pub fn movements(&self) -> &[NewMovement] {
        &self.movements
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.movements.is_empty()
    }

    pub fn into_parts(self) -> (Vec<BalanceWrite>, Vec<NewMovement>) {
        (self.writes, self.movements)
    }

    /// Keys touched by this posting, in global lock order.
    pub fn keys(&self) -> Vec<BalanceKey> {
        self.writes.iter().map(|w| w.balance.key()).collect()
    }

    /// Combine two postings that touch disjoint rows.
    pub fn merge(&mut self, other: Posting) -> DomainResult<()> {
        for write in other.writes {
            self.push_write(write)?;
        }
        self.movements.extend(other.movements);
        Ok(())
    }

    fn push_write(&mut self, write: BalanceWrite) -> DomainResult<()> {
        let key = write.balance.key();
        match self.writes.binary_search_by_key(&key, |w| w.balance.key()) {
            Ok(_) => Err(DomainError::validation(format!(
                "{key} appears more than once in one posting"
            ))),
            Err(pos) => {
                self.writes.insert(pos, write);
                Ok(())
            }
        }
    }

    fn single(original: &Balance, next: Balance, movement: NewMovement) -> Self {
        Self {
            writes: vec![BalanceWrite {
                expected: ExpectedVersion::exact(original.version),
                balance: next,
            }],
            movements: vec![movement],
        }
    }
}

/// Unit the movement will be recorded in.
///
/// A non-zero balance keeps its unit; a zero balance may switch.
fn resolve_unit(balance: &Balance, requested: Option<&Unit>) -> DomainResult<Unit> {
    match requested {
        None => Ok(balance.unit.clone()),
        Some(unit) if *unit == balance.unit || balance.quantity.is_zero() => Ok(unit.clone()),
        Some(unit) => Err(DomainError::validation(format!(
            "unit mismatch for {}: balance is kept in '{}', request used '{}'",
            balance.key(),
            balance.unit,
            unit
        ))),
    }
}

fn touched(
    balance: &Balance,
    quantity: Quantity,
    unit: &Unit,
    details: &MovementDetails,
    at: DateTime<Utc>,
) -> Balance {
    let mut next = balance.clone();
    next.quantity = quantity;
    next.unit = unit.clone();
    next.updated_at = at;
    if details.responsible_party.is_some() {
        next.responsible_party = details.responsible_party.clone();
    }
    next
}

fn increased(
    balance: &Balance,
    quantity: Quantity,
    unit: &Unit,
    details: &MovementDetails,
    at: DateTime<Utc>,
) -> DomainResult<Balance> {
    let new_quantity = balance.quantity.checked_add(quantity)?;
    Ok(touched(balance, new_quantity, unit, details, at))
}

fn decreased(
    balance: &Balance,
    quantity: Quantity,
    unit: &Unit,
    details: &MovementDetails,
    at: DateTime<Utc>,
) -> DomainResult<Balance> {
    let new_quantity = balance
        .quantity
        .checked_sub(quantity)
        .ok_or_else(|| DomainError::insufficient_stock(balance.quantity.value(), quantity.value()))?;
    Ok(touched(balance, new_quantity, unit, details, at))
}

/// Receive stock into a farm.
pub fn post_entry(
    balance: &Balance,
    quantity: Quantity,
    unit: &Unit,
    details: &MovementDetails,
    at: DateTime<Utc>,
) -> DomainResult<Posting> {
    if quantity.is_zero() {
        return Err(DomainError::validation("quantity must be greater than zero"));
    }
    let unit = resolve_unit(balance, Some(unit))?;
    let next = increased(balance, quantity, &unit, details, at)?;
    let movement = NewMovement::build(
        balance.key(),
        MovementType::Entry,
        Direction::Increase,
        quantity,
        unit,
        details,
        None,
    );
    Ok(Posting::single(balance, next, movement))
}

/// Consume or dispatch stock from a farm.
pub fn post_exit(
    balance: &Balance,
    quantity: Quantity,
    unit: Option<&Unit>,
    details: &MovementDetails,
    at: DateTime<Utc>,
) -> DomainResult<Posting> {
    if quantity.is_zero() {
        return Err(DomainError::validation("quantity must be greater than zero"));
    }
    let unit = resolve_unit(balance, unit)?;
    let next = decreased(balance, quantity, &unit, details, at)?;
    let movement = NewMovement::build(
        balance.key(),
        MovementType::Exit,
        Direction::Decrease,
        quantity,
        unit,
        details,
        None,
    );
    Ok(Posting::single(balance, next, movement))
}

/// Move stock between two farms as one posting.
///
/// Movements are ordered TransferOut, TransferIn and share `group`.
pub fn post_transfer(
    source: &Balance,
    destination: &Balance,
    quantity: Quantity,
    unit: Option<&Unit>,
    details: &MovementDetails,
    group: TransferGroupId,
    at: DateTime<Utc>,
) -> DomainResult<Posting> {
    if source.farm_id == destination.farm_id {
        return Err(DomainError::validation(
            "source and destination farm must differ",
        ));
    }
    if source.item_id != destination.item_id {
        return Err(DomainError::validation(
            "transfer must move a single item",
        ));
    }
    if quantity.is_zero() {
        return Err(DomainError::validation("quantity must be greater than zero"));
    }

    let unit = resolve_unit(source, unit)?;
    let unit = resolve_unit(destination, Some(&unit))?;

    let next_source = decreased(source, quantity, &unit, details, at)?;
    let next_destination = increased(destination, quantity, &unit, details, at)?;

    let out = NewMovement::build(
        source.key(),
        MovementType::TransferOut,
        Direction::Decrease,
        quantity,
        unit.clone(),
        details,
        Some(group),
    );
    let inbound = NewMovement::build(
        destination.key(),
        MovementType::TransferIn,
        Direction::Increase,
        quantity,
        unit,
        details,
        Some(group),
    );

    let mut posting = Posting::single(source, next_source, out);
    posting.merge(Posting::single(destination, next_destination, inbound))?;
    Ok(posting)
}

/// Correct a balance by a signed delta.
///
/// The movement stores `|delta|` and the delta's sign as its direction.
pub fn post_adjust(
    balance: &Balance,
    delta: Decimal,
    unit: Option<&Unit>,
    details: &MovementDetails,
    at: DateTime<Utc>,
) -> DomainResult<Posting> {
    ensure_delta(delta)?;
    let unit = resolve_unit(balance, unit)?;
    let magnitude = Quantity::abs_of(delta)?;
    let direction = Direction::of_delta(delta);

    let next = match direction {
        Direction::Increase => increased(balance, magnitude, &unit, details, at)?,
        Direction::Decrease => match balance.quantity.checked_sub(magnitude) {
            Some(q) => touched(balance, q, &unit, details, at),
            None => return Err(DomainError::negative_balance(balance.quantity.value(), delta)),
        },
    };

    let movement = NewMovement::build(
        balance.key(),
        MovementType::Adjust,
        direction,
        magnitude,
        unit,
        details,
        None,
    );
    Ok(Posting::single(balance, next, movement))
}

/// One line of a physical count, already resolved to a balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountedBalance {
    pub balance: Balance,
    pub counted: Quantity,
}

/// Per-line result of planning a stock count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountOutcome {
    pub key: BalanceKey,
    pub previous: Quantity,
    pub counted: Quantity,
    /// Signed difference `counted - previous`.
    pub difference: Decimal,
    /// Index into the posting's movements, when an adjustment was needed.
    pub movement_index: Option<usize>,
}

/// Force each counted balance to its counted value.
///
/// Lines whose count already matches produce no movement. All adjustments land
/// in a single posting so the count commits as one unit.
pub fn plan_stock_count(
    lines: &[CountedBalance],
    details: &MovementDetails,
    at: DateTime<Utc>,
) -> DomainResult<(Posting, Vec<CountOutcome>)> {
    let details = details.clone().with_reason(PHYSICAL_COUNT_REASON);
    let mut posting = Posting::new();
    let mut outcomes = Vec::with_capacity(lines.len());

    for line in lines {
        let previous = line.balance.quantity;
        let difference = line.counted.value() - previous.value();

        let movement_index = if difference.is_zero() {
            None
        } else {
            let index = posting.movements.len();
            posting.merge(post_adjust(&line.balance, difference, None, &details, at)?)?;
            Some(index)
        };

        outcomes.push(CountOutcome {
            key: line.balance.key(),
            previous,
            counted: line.counted,
            difference,
            movement_index,
        });
    }

    Ok((posting, outcomes))
}
