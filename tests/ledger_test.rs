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

//! Ledger public API integration tests.

use points_ledger_rs::{
    Balances, Ledger, LedgerError, NewTransaction, Payer, SpendEntry, TransactionId, total_points,
};

fn tx(payer: &str, points: i64, timestamp: &str) -> NewTransaction {
    NewTransaction::parse(payer, points, timestamp).unwrap()
}

fn spent(payer: &str, points: i64) -> SpendEntry {
    SpendEntry {
        payer: Payer::from(payer),
        points,
    }
}

fn balances(entries: &[(&str, i64)]) -> Balances {
    entries
        .iter()
        .map(|(payer, points)| (Payer::from(*payer), *points))
        .collect()
}

fn fetch_ledger() -> Ledger {
    let ledger = Ledger::new();
    ledger
        .add_transactions(vec![
            tx("DANNON", 300, "2020-10-31T10:00:00Z"),
            tx("UNILEVER", 200, "2020-10-31T11:00:00Z"),
            tx("DANNON", -200, "2020-10-31T15:00:00Z"),
            tx("MILLER COORS", 10000, "2020-11-01T14:00:00Z"),
            tx("DANNON", 1000, "2020-11-02T14:00:00Z"),
        ])
        .unwrap();
    ledger
}

#[test]
fn add_updates_balances() {
    let ledger = Ledger::new();
    ledger
        .add_transactions(vec![
            tx("SHOPIFY", 300, "2024-06-30T10:00:00Z"),
            tx("AMAZON", 200, "2024-06-30T11:00:00Z"),
        ])
        .unwrap();

    assert_eq!(
        ledger.balances().unwrap(),
        balances(&[("SHOPIFY", 300), ("AMAZON", 200)])
    );
}

#[test]
fn add_returns_full_history_with_fresh_ids() {
    let ledger = Ledger::new();
    ledger
        .add_transactions(vec![tx("A", 10, "2024-01-01T00:00:00Z")])
        .unwrap();
    let stored = ledger
        .add_transactions(vec![tx("B", 20, "2023-01-01T00:00:00Z")])
        .unwrap();

    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].payer, Payer::from("A"));
    assert_eq!(stored[1].payer, Payer::from("B"));
    assert_ne!(stored[0].id, stored[1].id);
}

#[test]
fn negative_first_transaction_is_rejected() {
    let ledger = Ledger::new();
    let result = ledger.add_transactions(vec![tx("A", -50, "2024-01-01T01:00:00Z")]);

    assert_eq!(
        result,
        Err(LedgerError::NegativeBalance {
            payer: Payer::from("A"),
            timestamp: points_ledger_rs::parse_timestamp("2024-01-01T01:00:00Z").unwrap(),
        })
    );
    assert!(ledger.transactions().unwrap().is_empty());
    assert!(ledger.balances().unwrap().is_empty());
}

#[test]
fn batch_is_validated_in_chronological_order() {
    let ledger = Ledger::new();
    // Correction listed first but dated after the earning.
    ledger
        .add_transactions(vec![
            tx("A", -50, "2024-01-01T01:00:00Z"),
            tx("A", 100, "2024-01-01T00:00:00Z"),
        ])
        .unwrap();

    assert_eq!(ledger.balances().unwrap(), balances(&[("A", 50)]));
}

#[test]
fn correction_dated_before_stored_earning_is_rejected() {
    let ledger = Ledger::new();
    ledger
        .add_transactions(vec![tx("A", 100, "2024-01-02T00:00:00Z")])
        .unwrap();

    let result = ledger.add_transactions(vec![tx("A", -10, "2024-01-01T00:00:00Z")]);

    assert!(matches!(result, Err(LedgerError::NegativeBalance { .. })));
    assert_eq!(ledger.balances().unwrap(), balances(&[("A", 100)]));
}

#[test]
fn same_timestamp_correction_follows_stored_earning() {
    let ledger = Ledger::new();
    ledger
        .add_transactions(vec![tx("A", 100, "2024-01-01T00:00:00Z")])
        .unwrap();

    ledger
        .add_transactions(vec![tx("A", -100, "2024-01-01T00:00:00Z")])
        .unwrap();

    assert_eq!(ledger.balances().unwrap(), balances(&[("A", 0)]));
    assert_eq!(ledger.transactions().unwrap().len(), 2);
}

#[test]
fn same_timestamp_batch_keeps_input_order() {
    let ledger = Ledger::new();
    let result = ledger.add_transactions(vec![
        tx("A", -50, "2024-01-01T00:00:00Z"),
        tx("A", 100, "2024-01-01T00:00:00Z"),
    ]);

    assert_eq!(
        result,
        Err(LedgerError::NegativeBalance {
            payer: Payer::from("A"),
            timestamp: points_ledger_rs::parse_timestamp("2024-01-01T00:00:00Z").unwrap(),
        })
    );
    assert!(ledger.transactions().unwrap().is_empty());
}

#[test]
fn rejected_batch_stores_nothing() {
    let ledger = Ledger::new();
    let result = ledger.add_transactions(vec![
        tx("A", 100, "2024-01-01T00:00:00Z"),
        tx("B", -1, "2024-01-01T00:00:00Z"),
    ]);

    assert!(matches!(result, Err(LedgerError::NegativeBalance { .. })));
    assert!(ledger.transactions().unwrap().is_empty());
}

#[test]
fn empty_batch_is_invalid() {
    let ledger = Ledger::new();
    let result = ledger.add_transactions(Vec::new());
    assert!(matches!(result, Err(LedgerError::InvalidRequest { .. })));
}

#[test]
fn spend_takes_oldest_points_first() {
    let ledger = Ledger::new();
    ledger
        .add_transactions(vec![
            tx("DANNON", 1000, "2020-11-02T14:00:00Z"),
            tx("UNILEVER", 200, "2020-10-31T11:00:00Z"),
        ])
        .unwrap();

    let result = ledger.spend_points(500).unwrap();

    assert_eq!(result, [spent("UNILEVER", -200), spent("DANNON", -300)]);
    assert_eq!(
        ledger.balances().unwrap(),
        balances(&[("DANNON", 700), ("UNILEVER", 0)])
    );
}

#[test]
fn spend_honours_later_corrections() {
    let ledger = fetch_ledger();

    let result = ledger.spend_points(5000).unwrap();

    assert_eq!(
        result,
        [
            spent("DANNON", -100),
            spent("UNILEVER", -200),
            spent("MILLER COORS", -4700),
        ]
    );
    assert_eq!(
        ledger.balances().unwrap(),
        balances(&[("DANNON", 1000), ("UNILEVER", 0), ("MILLER COORS", 5300)])
    );
}

#[test]
fn spend_skips_earnings_consumed_by_later_corrections() {
    let ledger = Ledger::new();
    ledger
        .add_transactions(vec![
            tx("A", 100, "2024-01-01T01:00:00Z"),
            tx("A", 100, "2024-01-01T02:00:00Z"),
            tx("B", 100, "2024-01-01T03:00:00Z"),
            tx("A", -150, "2024-01-01T04:00:00Z"),
        ])
        .unwrap();

    let result = ledger.spend_points(50).unwrap();

    assert_eq!(result, [spent("B", -50)]);
    assert_eq!(
        ledger.balances().unwrap(),
        balances(&[("A", 50), ("B", 50)])
    );
}

#[test]
fn spend_reduces_total_exactly() {
    let ledger = Ledger::new();
    ledger
        .add_transactions(vec![
            tx("SHOPIFY", 300, "2024-06-30T10:00:00Z"),
            tx("AMAZON", 200, "2024-06-30T11:00:00Z"),
        ])
        .unwrap();

    let result = ledger.spend_points(100).unwrap();

    assert_eq!(result, [spent("SHOPIFY", -100)]);
    assert_eq!(result.iter().map(|e| e.points).sum::<i64>(), -100);
    assert_eq!(total_points(&ledger.balances().unwrap()), 400);
}

#[test]
fn successive_spends_never_reuse_points() {
    let ledger = Ledger::new();
    ledger
        .add_transactions(vec![
            tx("SHOPIFY", 300, "2024-06-30T10:00:00Z"),
            tx("AMAZON", 200, "2024-06-30T11:00:00Z"),
        ])
        .unwrap();

    ledger.spend_points(250).unwrap();
    let second = ledger.spend_points(100).unwrap();

    assert_eq!(second, [spent("SHOPIFY", -50), spent("AMAZON", -50)]);
    assert_eq!(
        ledger.balances().unwrap(),
        balances(&[("SHOPIFY", 0), ("AMAZON", 150)])
    );
}

#[test]
fn spend_more_than_available_fails() {
    let ledger = Ledger::new();
    ledger
        .add_transactions(vec![
            tx("SHOPIFY", 300, "2024-06-30T10:00:00Z"),
            tx("AMAZON", 200, "2024-06-30T11:00:00Z"),
        ])
        .unwrap();

    let result = ledger.spend_points(1000);

    assert_eq!(
        result,
        Err(LedgerError::InsufficientPoints {
            requested: 1000,
            available: 500,
        })
    );
    assert_eq!(
        ledger.balances().unwrap(),
        balances(&[("SHOPIFY", 300), ("AMAZON", 200)])
    );
}

#[test]
fn spend_on_empty_ledger_fails() {
    let ledger = Ledger::new();
    assert!(matches!(
        ledger.spend_points(1),
        Err(LedgerError::InsufficientPoints { .. })
    ));
}

#[test]
fn non_positive_spend_is_invalid() {
    let ledger = fetch_ledger();
    let before = ledger.balances().unwrap();

    assert!(matches!(
        ledger.spend_points(0),
        Err(LedgerError::InvalidRequest { .. })
    ));
    assert!(matches!(
        ledger.spend_points(-5),
        Err(LedgerError::InvalidRequest { .. })
    ));
    assert_eq!(ledger.balances().unwrap(), before);
}

#[test]
fn spend_everything_leaves_zero_balances() {
    let ledger = fetch_ledger();

    ledger.spend_points(11300).unwrap();

    let after = ledger.balances().unwrap();
    assert!(after.values().all(|&points| points == 0));
}

#[test]
fn spent_points_cannot_be_corrected_away() {
    let ledger = Ledger::new();
    ledger
        .add_transactions(vec![tx("A", 100, "2024-01-01T00:00:00Z")])
        .unwrap();
    ledger.spend_points(80).unwrap();

    let result = ledger.add_transactions(vec![tx("A", -50, "2024-01-02T00:00:00Z")]);

    assert!(matches!(result, Err(LedgerError::NegativeBalance { .. })));
    assert_eq!(ledger.balances().unwrap(), balances(&[("A", 20)]));
}

#[test]
fn earning_added_after_spend_is_spendable() {
    let ledger = Ledger::new();
    ledger
        .add_transactions(vec![tx("A", 100, "2024-01-02T00:00:00Z")])
        .unwrap();
    ledger.spend_points(100).unwrap();
    ledger
        .add_transactions(vec![tx("B", 40, "2024-01-01T00:00:00Z")])
        .unwrap();

    let result = ledger.spend_points(40).unwrap();

    assert_eq!(result, [spent("B", -40)]);
}

#[test]
fn spend_does_not_create_transactions() {
    let ledger = fetch_ledger();
    let before = ledger.transactions().unwrap();

    ledger.spend_points(10).unwrap();

    assert_eq!(ledger.transactions().unwrap(), before);
}

#[test]
fn reset_clears_everything() {
    let ledger = fetch_ledger();

    ledger.reset().unwrap();

    assert!(ledger.transactions().unwrap().is_empty());
    assert!(ledger.balances().unwrap().is_empty());
    let stored = ledger
        .add_transactions(vec![tx("A", 1, "2024-01-01T00:00:00Z")])
        .unwrap();
    assert!(stored[0].id > TransactionId(5));
}
