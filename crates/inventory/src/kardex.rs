//! Kardex: chronological replay of the movement log.
//!
//! The replay never looks at the balance row. It is the oracle the materialized
//! balance is checked against.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use avicola_core::{FarmId, ItemId, MovementId, Quantity, TransferGroupId, Unit};

use crate::balance::{Balance, BalanceKey};
use crate::movement::{Direction, Movement, MovementType};

/// One movement in a kardex, with the balance right after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KardexLine {
    pub movement_id: MovementId,
    pub created_at: DateTime<Utc>,
    pub movement_type: MovementType,
    pub direction: Direction,
    pub quantity: Quantity,
    pub signed_quantity: Decimal,
    pub balance_after: Decimal,
    pub unit: Unit,
    pub reference: Option<String>,
    pub reason: Option<String>,
    pub transfer_group_id: Option<TransferGroupId>,
}

/// Running-balance trace for one (farm, item) over a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kardex {
    pub farm_id: FarmId,
    pub item_id: ItemId,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Balance accumulated by movements before `from`.
    pub opening_balance: Decimal,
    pub closing_balance: Decimal,
    pub lines: Vec<KardexLine>,
}

/// Replay movements for `key` inside `[from, to]`.
///
/// Movements are folded in insertion order (id), never by timestamp or payload.
/// Movements before `from` only feed the opening balance; movements after `to`
/// and movements for other keys are ignored.
pub fn replay(
    key: BalanceKey,
    movements: &[Movement],
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Kardex {
    let mut ordered: Vec<&Movement> = movements
        .iter()
        .filter(|m| m.key() == key)
        .filter(|m| to.is_none_or(|to| m.created_at <= to))
        .collect();
    ordered.sort_by_key(|m| m.id);

    let mut running = Decimal::ZERO;
    let mut opening = Decimal::ZERO;
    let mut lines = Vec::new();

    for m in ordered {
        running += m.signed_quantity();

        if from.is_some_and(|from| m.created_at < from) {
            opening = running;
            continue;
        }

        lines.push(KardexLine {
            movement_id: m.id,
            created_at: m.created_at,
            movement_type: m.movement_type,
            direction: m.direction,
            quantity: m.quantity,
            signed_quantity: m.signed_quantity(),
            balance_after: running,
            unit: m.unit.clone(),
            reference: m.reference.clone(),
            reason: m.reason.clone(),
            transfer_group_id: m.transfer_group_id,
        });
    }

    Kardex {
        farm_id: key.farm_id,
        item_id: key.item_id,
        from,
        to,
        opening_balance: opening,
        closing_balance: running,
        lines,
    }
}

/// Result of checking a materialized balance against its log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KardexAudit {
    pub farm_id: FarmId,
    pub item_id: ItemId,
    pub materialized: Decimal,
    pub replayed: Decimal,
    pub movement_count: usize,
    pub consistent: bool,
}

/// Compare the balance row (absent = zero) with a full replay of its movements.
pub fn audit(key: BalanceKey, balance: Option<&Balance>, movements: &[Movement]) -> KardexAudit {
    let kardex = replay(key, movements, None, None);
    let materialized = balance.map(|b| b.quantity.value()).unwrap_or(Decimal::ZERO);

    KardexAudit {
        farm_id: key.farm_id,
        item_id: key.item_id,
        materialized,
        replayed: kardex.closing_balance,
        movement_count: kardex.lines.len(),
        consistent: materialized == kardex.closing_balance,
    }
}
