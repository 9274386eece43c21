//! Coin selection over compressed records
//!
//! Picks the fewest records whose amounts cover a requested amount. Taking
//! the largest records first is optimal for cardinality: for any `k`, the
//! `k` largest records have the largest possible sum, so the first prefix of
//! the descending order that reaches the amount is a minimum-size cover.

use itertools::Itertools;
use thiserror::Error;

use crate::types::CompressedRecord;

/// Records chosen for one operation plus the residual change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionResult {
    pub selected: Vec<CompressedRecord>,
    /// `sum(selected) - requested`. Informational; the program emits change.
    pub change_amount: u64,
    pub selected_total: u64,
}

impl SelectionResult {
    pub fn hashes(&self) -> Vec<crate::types::RecordHash> {
        self.selected.iter().map(|r| r.hash).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Insufficient balance: requested {requested}, available {available}")]
pub struct InsufficientBalance {
    pub requested: u64,
    pub available: u128,
}

/// Deterministic order for selection: amount descending, then hash ascending.
pub fn sort_records_for_selection(records: Vec<CompressedRecord>) -> Vec<CompressedRecord> {
    records
        .into_iter()
        .sorted_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.hash.cmp(&b.hash)))
        .collect()
}

/// Select a minimal-cardinality subset of `records` covering `amount`.
///
/// Ties between equal amounts keep their order in `records`. Fails when the
/// total of all records is below `amount`. Never touches the network.
pub fn select_for_amount(
    records: &[CompressedRecord],
    amount: u64,
) -> Result<SelectionResult, InsufficientBalance> {
    let available: u128 = records.iter().map(|r| u128::from(r.amount)).sum();
    if available < u128::from(amount) {
        return Err(InsufficientBalance {
            requested: amount,
            available,
        });
    }

    // Stable sort: equal amounts stay in caller order.
    let mut ordered: Vec<&CompressedRecord> = records.iter().collect();
    ordered.sort_by(|a, b| b.amount.cmp(&a.amount));

    let mut selected = Vec::new();
    let mut running: u128 = 0;
    for record in ordered {
        if running >= u128::from(amount) {
            break;
        }
        running += u128::from(record.amount);
        selected.push(record.clone());
    }

    // `running` covers `amount` and is bounded by the sum of at most a few
    // u64s that the program itself must be able to add, so it fits in u64.
    let selected_total = u64::try_from(running).map_err(|_| InsufficientBalance {
        requested: amount,
        available,
    })?;

    Ok(SelectionResult {
        selected,
        change_amount: selected_total - amount,
        selected_total,
    })
}
