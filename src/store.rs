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

//! Transaction storage and balance bookkeeping.
//!
//! The store applies no policy: it appends what it is given and adjusts
//! balances by whatever deltas it receives. Validation lives in the
//! [`Ledger`](crate::Ledger), which only calls the mutating methods once a
//! change is known to be safe.

use crate::base::{Payer, TransactionId};
use crate::error::StoreError;
use crate::transaction::{Balances, NewTransaction, Transaction};

/// Storage backend for a [`Ledger`](crate::Ledger).
///
/// All reads return owned snapshots; callers may sort or filter them freely.
pub trait LedgerStore {
    /// Appends each item with a fresh id and credits its payer.
    ///
    /// Returns the full transaction list after the append.
    fn add_transactions(
        &mut self,
        items: Vec<NewTransaction>,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// All stored transactions in insertion order.
    fn transactions(&self) -> Result<Vec<Transaction>, StoreError>;

    /// Current balance per payer.
    fn balances(&self) -> Result<Balances, StoreError>;

    /// Adds each delta to the matching payer's balance.
    fn update_balances(&mut self, deltas: &[(Payer, i64)]) -> Result<(), StoreError>;

    /// Drops every transaction and balance.
    fn clear(&mut self) -> Result<(), StoreError>;
}

/// Volatile, process-local store.
#[derive(Debug)]
pub struct InMemoryStore {
    transactions: Vec<Transaction>,
    balances: Balances,
    /// Next id to hand out. Not rewound by `clear`.
    next_id: u64,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self {
            transactions: Vec::new(),
            balances: Balances::new(),
            next_id: 1,
        }
    }

    fn credit(&mut self, payer: &Payer, points: i64) {
        match self.balances.get_mut(payer) {
            Some(balance) => *balance += points,
            None => {
                self.balances.insert(payer.clone(), points);
            }
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for InMemoryStore {
    fn add_transactions(
        &mut self,
        items: Vec<NewTransaction>,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.transactions.reserve(items.len());
        for item in items {
            let id = TransactionId(self.next_id);
            self.next_id += 1;
            self.credit(&item.payer, item.points);
            self.transactions.push(item.into_transaction(id));
        }
        Ok(self.transactions.clone())
    }

    fn transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.transactions.clone())
    }

    fn balances(&self) -> Result<Balances, StoreError> {
        Ok(self.balances.clone())
    }

    fn update_balances(&mut self, deltas: &[(Payer, i64)]) -> Result<(), StoreError> {
        for (payer, delta) in deltas {
            self.credit(payer, *delta);
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.transactions.clear();
        self.balances.clear();
        Ok(())
    }
}
