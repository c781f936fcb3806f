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

//! Ledger engine.
//!
//! The [`Ledger`] is the central component: it validates every change
//! against the full transaction history before letting it reach the store,
//! and decides how a spend is split across payers.
//!
//! # Operations
//!
//! - **Add**: stores a batch of transactions once the merged history is
//!   known to keep every payer non-negative at every point in time.
//! - **Spend**: deducts points oldest first, honouring later negative
//!   corrections of the same payer.
//! - **Balances**: returns a snapshot of the per-payer totals.
//!
//! # Thread Safety
//!
//! The store sits behind a [`RwLock`]. Adds, spends and resets hold the write
//! lock for their whole read-validate-write sequence; reads share the read
//! lock and never observe a half-applied change.

use crate::allocation::allocate;
use crate::base::Payer;
use crate::store::{InMemoryStore, LedgerStore};
use crate::transaction::{
    Balances, NewTransaction, SpendEntry, Timestamped, Transaction, sort_chronologically,
    total_points,
};
use crate::LedgerError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, error, warn};

/// Reward-points ledger over a [`LedgerStore`].
///
/// # Invariants
///
/// - Every payer's balance is non-negative after every successful call.
/// - The sum of balances equals the sum of stored points minus everything
///   spent.
/// - A rejected call leaves transactions and balances untouched.
pub struct Ledger<S = InMemoryStore> {
    store: RwLock<S>,
}

impl Ledger<InMemoryStore> {
    /// Creates a ledger over an empty in-memory store.
    pub fn new() -> Self {
        Self::with_store(InMemoryStore::new())
    }
}

impl Default for Ledger<InMemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: LedgerStore> Ledger<S> {
    pub fn with_store(store: S) -> Self {
        Self {
            store: RwLock::new(store),
        }
    }

    /// Validates and stores a batch of transactions.
    ///
    /// The batch is merged with the stored history and replayed oldest first
    /// from empty balances; transactions sharing a timestamp keep their
    /// insertion order, stored ones before the batch. Each payer's current
    /// balance plus its share of the batch must also stay non-negative, so
    /// points already spent are never counted twice.
    ///
    /// Returns the full transaction list after the append.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidRequest`] - Empty batch or point overflow.
    /// - [`LedgerError::NegativeBalance`] - Some payer would dip below zero.
    /// - [`LedgerError::InternalFailure`] - The store failed.
    pub fn add_transactions(
        &self,
        items: Vec<NewTransaction>,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let count = items.len();
        self.try_add(items)
            .inspect(|stored| debug!(added = count, total = stored.len(), "transactions added"))
            .inspect_err(|err| log_failure("add_transactions", err))
    }

    fn try_add(&self, items: Vec<NewTransaction>) -> Result<Vec<Transaction>, LedgerError> {
        if items.is_empty() {
            return Err(LedgerError::invalid("at least one transaction is required"));
        }

        let mut store = self.store.write();
        let existing = store.transactions()?;
        let balances = store.balances()?;
        validate_additions(&existing, &balances, &items)?;

        Ok(store.add_transactions(items)?)
    }

    /// Spends `points` across payers, oldest points first.
    ///
    /// Returns one entry per payer charged, in the order each was first
    /// charged; entry points are negative.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidRequest`] - `points` is zero or negative.
    /// - [`LedgerError::InsufficientPoints`] - `points` exceeds the total balance.
    /// - [`LedgerError::InternalFailure`] - The store failed or the history
    ///   could not cover a feasible spend.
    pub fn spend_points(&self, points: i64) -> Result<Vec<SpendEntry>, LedgerError> {
        self.try_spend(points)
            .inspect(|spent| debug!(points, payers = spent.len(), "points spent"))
            .inspect_err(|err| log_failure("spend_points", err))
    }

    fn try_spend(&self, points: i64) -> Result<Vec<SpendEntry>, LedgerError> {
        if points <= 0 {
            return Err(LedgerError::invalid("points to spend must be positive"));
        }

        let mut store = self.store.write();
        let balances = store.balances()?;
        let available = total_points(&balances);
        if points > available {
            return Err(LedgerError::InsufficientPoints {
                requested: points,
                available,
            });
        }

        let mut history = store.transactions()?;
        sort_chronologically(&mut history);
        let spent = allocate(&history, &balances, points)?;

        let deltas: Vec<(Payer, i64)> = spent
            .iter()
            .map(|entry| (entry.payer.clone(), entry.points))
            .collect();
        store.update_balances(&deltas)?;

        Ok(spent)
    }

    /// Snapshot of the current balance per payer.
    pub fn balances(&self) -> Result<Balances, LedgerError> {
        self.store
            .read()
            .balances()
            .map_err(LedgerError::from)
            .inspect_err(|err| log_failure("balances", err))
    }

    /// Snapshot of all stored transactions in insertion order.
    pub fn transactions(&self) -> Result<Vec<Transaction>, LedgerError> {
        self.store
            .read()
            .transactions()
            .map_err(LedgerError::from)
            .inspect_err(|err| log_failure("transactions", err))
    }

    /// Drops all transactions and balances. Intended for test setup.
    pub fn reset(&self) -> Result<(), LedgerError> {
        self.store.write().clear()?;
        debug!("ledger reset");
        Ok(())
    }
}

fn log_failure(operation: &'static str, err: &LedgerError) {
    if err.is_client_error() {
        warn!(operation, error = %err, "request rejected");
    } else {
        error!(operation, error = ?err, "ledger failure");
    }
}

/// One entry on the merged timeline used for validation.
struct Posting<'a> {
    payer: &'a Payer,
    points: i64,
    timestamp: DateTime<Utc>,
}

impl Timestamped for Posting<'_> {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl<'a> From<&'a Transaction> for Posting<'a> {
    fn from(transaction: &'a Transaction) -> Self {
        Self {
            payer: &transaction.payer,
            points: transaction.points,
            timestamp: transaction.timestamp,
        }
    }
}

impl<'a> From<&'a NewTransaction> for Posting<'a> {
    fn from(transaction: &'a NewTransaction) -> Self {
        Self {
            payer: &transaction.payer,
            points: transaction.points,
            timestamp: transaction.timestamp,
        }
    }
}

/// Dry-run of a batch against the stored history. Mutates nothing.
fn validate_additions(
    existing: &[Transaction],
    balances: &Balances,
    candidates: &[NewTransaction],
) -> Result<(), LedgerError> {
    let mut timeline: Vec<Posting<'_>> = existing
        .iter()
        .map(Posting::from)
        .chain(candidates.iter().map(Posting::from))
        .collect();
    sort_chronologically(&mut timeline);

    let mut running: HashMap<&Payer, i64> = HashMap::new();
    for posting in &timeline {
        let balance = running.entry(posting.payer).or_insert(0);
        *balance = checked_credit(*balance, posting.points, posting.payer)?;
        if *balance < 0 {
            return Err(LedgerError::NegativeBalance {
                payer: posting.payer.clone(),
                timestamp: posting.timestamp,
            });
        }
    }

    // Spent points are not part of the history, so the replay above cannot
    // see them.
    let mut settled: HashMap<&Payer, (i64, DateTime<Utc>)> = HashMap::new();
    for candidate in candidates {
        let current = balances.get(&candidate.payer).copied().unwrap_or(0);
        let (balance, latest) = settled
            .entry(&candidate.payer)
            .or_insert((current, candidate.timestamp));
        *balance = checked_credit(*balance, candidate.points, &candidate.payer)?;
        *latest = (*latest).max(candidate.timestamp);
    }
    if let Some((payer, (_, timestamp))) = settled
        .into_iter()
        .filter(|(_, (balance, _))| *balance < 0)
        .min_by_key(|(_, (_, timestamp))| *timestamp)
    {
        return Err(LedgerError::NegativeBalance {
            payer: payer.clone(),
            timestamp,
        });
    }

    Ok(())
}

fn checked_credit(balance: i64, points: i64, payer: &Payer) -> Result<i64, LedgerError> {
    balance
        .checked_add(points)
        .ok_or_else(|| LedgerError::invalid(format!("point total overflows for {payer}")))
}
