// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Oldest-first spend allocation.
//!
//! Two strategies, tried in order:
//!
//! 1. **Lookahead.** Each positive transaction offers its points minus every
//!    later negative of the same payer. Used as long as nothing has been
//!    spent yet and the offers cover the request without taking more from a
//!    payer than its balance.
//! 2. **Lots.** Every positive transaction opens a lot holding its points.
//!    Walking the history in chronological order, each negative transaction
//!    is charged to the oldest open lots of its payer, so a later correction
//!    is reserved against the earliest points it could apply to, and only
//!    once. Points a payer has already spent (stored transactions minus
//!    current balance) are then reserved the same way. Whatever is left in
//!    the lots is spendable, and sums to exactly the payer's balance.
//!
//! Either way the surviving points are drained oldest first across all
//! payers.

use crate::LedgerError;
use crate::base::Payer;
use crate::transaction::{Balances, SpendEntry, Transaction};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};

/// Lots still open per payer, oldest first, as indices into the history.
type OpenLots<'a> = HashMap<&'a Payer, VecDeque<usize>>;

/// Computes the per-payer deductions for spending `amount` points.
///
/// `history` must already be in chronological order. Entries are returned
/// in the order each payer was first charged. Nothing is mutated.
///
/// # Errors
///
/// [`LedgerError::InternalFailure`] if the history and balances disagree,
/// or if the lots run out before `amount` is covered.
pub(crate) fn allocate(
    history: &[Transaction],
    balances: &Balances,
    amount: i64,
) -> Result<Vec<SpendEntry>, LedgerError> {
    match lookahead(history, balances, amount) {
        Some(entries) => Ok(entries),
        None => allocate_from_lots(history, balances, amount),
    }
}

/// Later negative transactions of one payer, with suffix sums.
struct Corrections {
    timestamps: Vec<DateTime<Utc>>,
    /// `suffix[i]` is the sum of points from the `i`-th correction onwards.
    suffix: Vec<i64>,
}

impl Corrections {
    /// Sum of the corrections dated strictly after `timestamp`.
    fn after(&self, timestamp: DateTime<Utc>) -> i64 {
        let index = self.timestamps.partition_point(|at| *at <= timestamp);
        self.suffix[index]
    }
}

/// Lookahead allocation, or `None` when it does not apply.
///
/// Declines once any payer has spent points, since its offers know nothing
/// about earlier spends, and whenever its offers cannot cover `amount`
/// within every payer's balance.
fn lookahead(
    history: &[Transaction],
    balances: &Balances,
    amount: i64,
) -> Option<Vec<SpendEntry>> {
    let mut stored: HashMap<&Payer, i64> = HashMap::new();
    let mut negatives: HashMap<&Payer, Vec<&Transaction>> = HashMap::new();
    for transaction in history {
        let total = stored.entry(&transaction.payer).or_insert(0);
        *total = total.saturating_add(transaction.points);
        if transaction.points < 0 {
            negatives.entry(&transaction.payer).or_default().push(transaction);
        }
    }

    let untouched = stored
        .iter()
        .all(|(payer, total)| balances.get(*payer).copied().unwrap_or(0) == *total);
    if !untouched {
        return None;
    }

    let corrections: HashMap<&Payer, Corrections> = negatives
        .into_iter()
        .map(|(payer, list)| {
            let mut suffix = vec![0i64; list.len() + 1];
            for (i, transaction) in list.iter().enumerate().rev() {
                suffix[i] = suffix[i + 1].saturating_add(transaction.points);
            }
            let timestamps = list.iter().map(|t| t.timestamp).collect();
            (payer, Corrections { timestamps, suffix })
        })
        .collect();

    let mut entries: Vec<SpendEntry> = Vec::new();
    let mut positions: HashMap<&Payer, usize> = HashMap::new();
    let mut remaining = amount;

    for transaction in history {
        if remaining == 0 {
            break;
        }
        let pending = corrections
            .get(&transaction.payer)
            .map_or(0, |c| c.after(transaction.timestamp));
        let available = transaction.points.saturating_add(pending);
        if available <= 0 {
            continue;
        }
        let deduction = available.min(remaining);
        remaining -= deduction;
        charge(&mut entries, &mut positions, &transaction.payer, deduction);
    }

    let within_balances = entries
        .iter()
        .all(|entry| -entry.points <= balances.get(&entry.payer).copied().unwrap_or(0));
    (remaining == 0 && within_balances).then_some(entries)
}

/// Adds `deduction` to the payer's entry, opening one on first charge.
fn charge<'a>(
    entries: &mut Vec<SpendEntry>,
    positions: &mut HashMap<&'a Payer, usize>,
    payer: &'a Payer,
    deduction: i64,
) {
    match positions.get(payer) {
        Some(&position) => entries[position].points -= deduction,
        None => {
            positions.insert(payer, entries.len());
            entries.push(SpendEntry {
                payer: payer.clone(),
                points: -deduction,
            });
        }
    }
}

fn allocate_from_lots(
    history: &[Transaction],
    balances: &Balances,
    amount: i64,
) -> Result<Vec<SpendEntry>, LedgerError> {
    let mut lots = vec![0i64; history.len()];
    let mut open: OpenLots<'_> = HashMap::new();

    for (index, transaction) in history.iter().enumerate() {
        if transaction.points > 0 {
            lots[index] = transaction.points;
            open.entry(&transaction.payer).or_default().push_back(index);
        } else if transaction.points < 0 {
            let queue = open.entry(&transaction.payer).or_default();
            let shortfall = reserve(queue, &mut lots, -transaction.points);
            if shortfall > 0 {
                return Err(LedgerError::internal(format!(
                    "transaction {} leaves {} short by {shortfall} points",
                    transaction.id, transaction.payer
                )));
            }
        }
    }

    for (payer, queue) in open.iter_mut() {
        let unreserved: i64 = queue.iter().map(|&index| lots[index]).sum();
        let balance = balances.get(*payer).copied().unwrap_or(0);
        let spent = unreserved - balance;
        if spent < 0 {
            return Err(LedgerError::internal(format!(
                "balance of {payer} exceeds its unreserved points by {}",
                -spent
            )));
        }
        if reserve(queue, &mut lots, spent) > 0 {
            return Err(LedgerError::internal(format!(
                "balance of {payer} is negative"
            )));
        }
    }

    let mut entries: Vec<SpendEntry> = Vec::new();
    let mut positions: HashMap<&Payer, usize> = HashMap::new();
    let mut remaining = amount;

    for (index, transaction) in history.iter().enumerate() {
        if remaining == 0 {
            break;
        }
        let available = lots[index];
        if available <= 0 {
            continue;
        }
        let deduction = available.min(remaining);
        remaining -= deduction;
        charge(&mut entries, &mut positions, &transaction.payer, deduction);
    }

    if remaining > 0 {
        return Err(LedgerError::internal(format!(
            "history exhausted with {remaining} of {amount} points unallocated"
        )));
    }

    Ok(entries)
}

/// Takes `amount` points from the front of `queue`, closing drained lots.
///
/// Returns how much could not be covered.
fn reserve(queue: &mut VecDeque<usize>, lots: &mut [i64], mut amount: i64) -> i64 {
    while amount > 0 {
        let Some(&front) = queue.front() else {
            break;
        };
        let taken = lots[front].min(amount);
        lots[front] -= taken;
        amount -= taken;
        if lots[front] == 0 {
            queue.pop_front();
        }
    }
    amount
}
