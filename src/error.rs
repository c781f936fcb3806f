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

//! Error types for ledger operations.

use crate::base::Payer;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

/// Message returned to untrusted callers in place of internal detail.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong";

/// Ledger operation errors.
///
/// Every variant except [`LedgerError::InternalFailure`] is caused by the
/// caller's input and is safe to show verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Malformed input or a non-positive spend amount
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// A transaction would drive its payer below zero at some point in time
    #[error(
        "Transaction for {payer} at {} would make balance negative",
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    )]
    NegativeBalance {
        payer: Payer,
        timestamp: DateTime<Utc>,
    },

    /// Requested spend exceeds the total of all balances
    #[error("Not enough points available")]
    InsufficientPoints { requested: i64, available: i64 },

    /// Store failure or a broken allocation invariant
    #[error("Internal failure: {detail}")]
    InternalFailure { detail: String },
}

impl LedgerError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub(crate) fn internal(detail: impl Into<String>) -> Self {
        Self::InternalFailure {
            detail: detail.into(),
        }
    }

    /// Returns `true` when the caller, not the ledger, is at fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::InternalFailure { .. })
    }

    /// Message suitable for a response body.
    ///
    /// Internal failures collapse to [`GENERIC_FAILURE_MESSAGE`] unless
    /// `expose_internal` is set.
    pub fn public_message(&self, expose_internal: bool) -> String {
        match self {
            Self::InternalFailure { .. } if !expose_internal => GENERIC_FAILURE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

/// Failure reported by a [`LedgerStore`](crate::LedgerStore) backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("store failure: {0}")]
pub struct StoreError(pub String);

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        LedgerError::internal(err.to_string())
    }
}
