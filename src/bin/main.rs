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

use clap::{Parser, Subcommand};
use csv::{ReaderBuilder, Trim, Writer};
use points_ledger_rs::{Balances, Ledger, LedgerError, NewTransaction, SpendEntry};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Points Ledger - Replay reward-point transactions from CSV
///
/// Loads every valid row of the input file as one batch, then prints either
/// the resulting balances or the allocation of a spend.
#[derive(Parser, Debug)]
#[command(name = "points-ledger")]
#[command(about = "A reward-points ledger that spends the oldest points first", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the balance of every payer
    Balances {
        /// Path to CSV file with transactions
        ///
        /// Expected format: payer,points,timestamp
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
    /// Spend points and print how much each payer gave up
    Spend {
        /// Path to CSV file with transactions
        #[arg(value_name = "FILE")]
        input: PathBuf,
        /// Number of points to spend
        #[arg(value_name = "POINTS")]
        points: i64,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Err(e) = run(args.command, std::io::stdout()) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run<W: Write>(command: Command, out: W) -> Result<(), CliError> {
    match command {
        Command::Balances { input } => {
            let ledger = open_ledger(&input)?;
            write_balances(&ledger.balances()?, out)?;
        }
        Command::Spend { input, points } => {
            let ledger = open_ledger(&input)?;
            let spent = ledger.spend_points(points)?;
            info!(points, payers = spent.len(), "spend applied");
            write_spend(&spent, out)?;
        }
    }
    Ok(())
}

fn open_ledger(path: &Path) -> Result<Ledger, CliError> {
    let file = File::open(path).map_err(|e| {
        CliError::Io(std::io::Error::new(
            e.kind(),
            format!("opening '{}': {e}", path.display()),
        ))
    })?;
    load_transactions(BufReader::new(file))
}

/// Raw CSV record matching the input format.
///
/// Fields: `payer, points, timestamp`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    payer: String,
    points: i64,
    timestamp: String,
}

/// Reads transactions from CSV and adds them to a fresh ledger in one batch.
///
/// Malformed rows are skipped with a warning. An input without any valid row
/// yields an empty ledger.
///
/// # CSV Format
///
/// ```csv
/// payer,points,timestamp
/// DANNON,300,2020-10-31T10:00:00Z
/// DANNON,-200,2020-10-31T15:00:00Z
/// ```
///
/// # Errors
///
/// Returns the ledger's verdict when the batch as a whole is rejected.
fn load_transactions<R: Read>(reader: R) -> Result<Ledger, CliError> {
    let ledger = Ledger::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(reader);

    let mut batch = Vec::new();
    for (row, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let parsed = result
            .map_err(|e| e.to_string())
            .and_then(|r| {
                NewTransaction::parse(&r.payer, r.points, &r.timestamp).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(transaction) => batch.push(transaction),
            // +2: one for the header, one for 1-based numbering
            Err(e) => warn!(line = row + 2, error = %e, "skipping malformed row"),
        }
    }

    if !batch.is_empty() {
        ledger.add_transactions(batch)?;
    }
    Ok(ledger)
}

#[derive(Serialize)]
struct BalanceRow<'a> {
    payer: &'a str,
    points: i64,
}

fn write_balances<W: Write>(balances: &Balances, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for (payer, points) in balances {
        wtr.serialize(BalanceRow {
            payer: payer.as_str(),
            points: *points,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_spend<W: Write>(spent: &[SpendEntry], writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for entry in spent {
        wtr.serialize(entry)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const FETCH_CSV: &str = "payer,points,timestamp\n\
                             DANNON,1000,2020-11-02T14:00:00Z\n\
                             UNILEVER,200,2020-10-31T11:00:00Z\n\
                             DANNON,-200,2020-10-31T15:00:00Z\n\
                             MILLER COORS,10000,2020-11-01T14:00:00Z\n\
                             DANNON,300,2020-10-31T10:00:00Z\n";

    #[test]
    fn load_out_of_order_rows() {
        let ledger = load_transactions(Cursor::new(FETCH_CSV)).unwrap();

        let balances = ledger.balances().unwrap();
        assert_eq!(balances.get("DANNON"), Some(&1100));
        assert_eq!(balances.get("UNILEVER"), Some(&200));
        assert_eq!(balances.get("MILLER COORS"), Some(&10000));
    }

    #[test]
    fn skip_malformed_rows() {
        let csv = "payer,points,timestamp\n\
                   DANNON,100,2020-10-31T10:00:00Z\n\
                   UNILEVER,lots,2020-10-31T11:00:00Z\n\
                   ,50,2020-10-31T11:00:00Z\n\
                   MILLER,20,not-a-date\n\
                   UNILEVER,50,2020-10-31T12:00:00Z\n";

        let ledger = load_transactions(Cursor::new(csv)).unwrap();

        assert_eq!(ledger.transactions().unwrap().len(), 2);
    }

    #[test]
    fn rejected_batch_is_an_error() {
        let csv = "payer,points,timestamp\nDANNON,-100,2020-10-31T10:00:00Z\n";

        let result = load_transactions(Cursor::new(csv));

        assert!(matches!(
            result,
            Err(CliError::Ledger(LedgerError::NegativeBalance { .. }))
        ));
    }

    #[test]
    fn errors_display_their_source_message() {
        let csv = "payer,points,timestamp\nDANNON,-100,2020-10-31T10:00:00Z\n";
        let Err(err) = load_transactions(Cursor::new(csv)) else {
            panic!("negative batch was accepted");
        };
        assert_eq!(
            err.to_string(),
            "Transaction for DANNON at 2020-10-31T10:00:00.000Z would make balance negative"
        );

        let Err(missing) = open_ledger(Path::new("/nonexistent/points.csv")) else {
            panic!("missing file was opened");
        };
        assert!(matches!(missing, CliError::Io(_)));
        assert!(missing.to_string().starts_with("opening '/nonexistent/points.csv'"));
    }

    #[test]
    fn write_balances_as_csv() {
        let ledger = load_transactions(Cursor::new(FETCH_CSV)).unwrap();
        let mut output = Vec::new();

        write_balances(&ledger.balances().unwrap(), &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "payer,points\nDANNON,1100\nMILLER COORS,10000\nUNILEVER,200\n"
        );
    }

    #[test]
    fn write_spend_as_csv() {
        let ledger = load_transactions(Cursor::new(FETCH_CSV)).unwrap();
        let spent = ledger.spend_points(5000).unwrap();
        let mut output = Vec::new();

        write_spend(&spent, &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "payer,points\nDANNON,-100\nUNILEVER,-200\nMILLER COORS,-4700\n"
        );
    }
}
