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

//! Transaction records and the values exchanged with callers.
//!
//! A [`NewTransaction`] is what callers hand in; the store turns it into a
//! [`Transaction`] by assigning an id. Spends never produce transactions,
//! only [`SpendEntry`] values describing the per-payer deduction.

use crate::LedgerError;
use crate::base::{Payer, TransactionId};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Running point total per payer.
pub type Balances = BTreeMap<Payer, i64>;

/// Sum of all balances.
///
/// Saturates instead of wrapping; balances are validated with checked
/// arithmetic on the way in, so saturation is never reached in practice.
pub fn total_points(balances: &Balances) -> i64 {
    balances
        .values()
        .fold(0i64, |sum, points| sum.saturating_add(*points))
}

/// A stored, immutable transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub payer: Payer,
    pub points: i64,
    pub timestamp: DateTime<Utc>,
}

/// A transaction that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub payer: Payer,
    pub points: i64,
    pub timestamp: DateTime<Utc>,
}

impl NewTransaction {
    pub fn new(payer: impl Into<Payer>, points: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            payer: payer.into(),
            points,
            timestamp,
        }
    }

    /// Builds a candidate from raw boundary values.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidRequest`] if the payer is blank or the
    /// timestamp is not a recognised ISO-8601 form.
    pub fn parse(payer: &str, points: i64, timestamp: &str) -> Result<Self, LedgerError> {
        if payer.trim().is_empty() {
            return Err(LedgerError::invalid("payer must not be empty"));
        }
        let timestamp = parse_timestamp(timestamp)?;
        Ok(Self::new(payer, points, timestamp))
    }

    pub(crate) fn into_transaction(self, id: TransactionId) -> Transaction {
        Transaction {
            id,
            payer: self.payer,
            points: self.points,
            timestamp: self.timestamp,
        }
    }
}

/// Points deducted from one payer by a spend. `points` is negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendEntry {
    pub payer: Payer,
    pub points: i64,
}

/// Parses an ISO-8601 timestamp.
///
/// Accepts RFC 3339 (`2020-11-02T14:00:00Z`, `2020-11-02T14:00:00+02:00`),
/// a zone-less date-time read as UTC, and a bare date read as midnight UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, LedgerError> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| LedgerError::invalid(format!("invalid timestamp '{raw}'")))
}

/// Anything placed on the ledger's timeline.
pub(crate) trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for Transaction {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for NewTransaction {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Sorts oldest first. Ties keep their relative order.
pub(crate) fn sort_chronologically<T: Timestamped>(items: &mut [T]) {
    // slice::sort_by_key is stable
    items.sort_by_key(|item| item.timestamp());
}
