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

//! # Points Ledger
//!
//! This library tracks reward points awarded by multiple payers and spends
//! them under a deterministic oldest-first rule.
//!
//! ## Core Components
//!
//! - [`Ledger`]: Validates additions and allocates spends
//! - [`LedgerStore`]: Storage backend trait, with [`InMemoryStore`] as the default
//! - [`Transaction`]: A stored, immutable point award or correction
//! - [`LedgerError`]: Error types for rejected or failed operations
//!
//! ## Example
//!
//! ```
//! use points_ledger_rs::{Ledger, NewTransaction, Payer};
//!
//! let ledger = Ledger::new();
//!
//! ledger
//!     .add_transactions(vec![
//!         NewTransaction::parse("DANNON", 1000, "2020-11-02T14:00:00Z").unwrap(),
//!         NewTransaction::parse("UNILEVER", 200, "2020-10-31T11:00:00Z").unwrap(),
//!     ])
//!     .unwrap();
//!
//! // UNILEVER's points are older, so they go first
//! let spent = ledger.spend_points(500).unwrap();
//! assert_eq!(spent[0].payer, Payer::from("UNILEVER"));
//! assert_eq!(spent[0].points, -200);
//!
//! let balances = ledger.balances().unwrap();
//! assert_eq!(balances.get("DANNON"), Some(&700));
//! assert_eq!(balances.get("UNILEVER"), Some(&0));
//! ```
//!
//! ## Thread Safety
//!
//! A [`Ledger`] can be shared across threads. Mutations are serialized by an
//! internal lock; reads see a consistent snapshot.

mod allocation;
mod base;
pub mod config;
mod engine;
pub mod error;
mod store;
mod transaction;

pub use base::{Payer, TransactionId};
pub use engine::Ledger;
pub use error::{LedgerError, StoreError};
pub use store::{InMemoryStore, LedgerStore};
pub use transaction::{
    Balances, NewTransaction, SpendEntry, Transaction, parse_timestamp, total_points,
};
