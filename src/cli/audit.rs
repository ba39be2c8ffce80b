//! Handlers for `audit verify` and `audit release`.

use std::io;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::adapter::SqliteAuditSink;
use crate::cli::{output, AuditReleaseArgs, AuditVerifyArgs};
use crate::domain::ReservationId;
use crate::error::{Error, LedgerError, Result};
use crate::ledger::{replay, AuditSink, Ledger};

/// Open an existing audit store. Opening a missing path would create it.
fn open_store(database: &Path) -> Result<SqliteAuditSink> {
    if !database.exists() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("ledger database not found: {}", database.display()),
        )));
    }
    SqliteAuditSink::open(&database.to_string_lossy())
}

/// Replay the stored log and report the state it reproduces.
///
/// # Errors
/// Returns an error if the database is missing or the log does not replay.
pub fn execute_verify(args: &AuditVerifyArgs) -> Result<()> {
    let sink = open_store(&args.database)?;
    let entries = sink.load()?;
    if entries.is_empty() {
        output::warn("audit log is empty");
        return Ok(());
    }

    match replay(&entries) {
        Ok(state) => {
            output::ok(&format!("{} entries replay cleanly", entries.len()));
            output::section("Replayed state");
            output::key_value("initial capital", state.initial_capital);
            output::key_value("cash", state.cash);
            output::key_value("open notional", state.open_notional);
            output::key_value("reservations", state.reservations.len());
            output::pnl("daily pnl", state.daily_pnl);
            output::pnl("cumulative pnl", state.cumulative_pnl);
            output::key_value("trading day", state.trading_day);
            output::key_value("last seq", state.last_seq);
            Ok(())
        }
        Err(err) => {
            output::error(&format!("audit log does not replay: {err}"));
            Err(err.into())
        }
    }
}

/// Roll back reservations a crashed run left behind, one audit entry each.
///
/// Only for capital whose venue orders are known to be closed; the released
/// amount returns to cash with no P&L.
///
/// # Errors
/// Returns an error if the database is missing, the log does not replay, or
/// a named reservation is not open.
pub fn execute_release(args: &AuditReleaseArgs) -> Result<()> {
    let sink = Arc::new(open_store(&args.database)?);
    if sink.load()?.is_empty() {
        output::warn("audit log is empty");
        return Ok(());
    }
    // The log is replayed; capital and loss limit play no part in a rollback.
    let ledger = Ledger::open(Decimal::ONE, Decimal::ZERO, sink, Utc::now())?;

    let open = ledger.state().reservations;
    let targets: Vec<ReservationId> = if args.all {
        open.keys().copied().collect()
    } else {
        args.reservations.iter().map(|id| ReservationId::new(*id)).collect()
    };
    if let Some(missing) = targets.iter().find(|id| !open.contains_key(*id)) {
        return Err(LedgerError::UnknownReservation(*missing).into());
    }
    if targets.is_empty() {
        output::ok("no open reservations");
        return Ok(());
    }

    output::section("Released");
    for id in &targets {
        ledger.rollback(*id)?;
        if let Some(reservation) = open.get(id) {
            output::key_value(
                &id.to_string(),
                format!("{} ({})", reservation.amount, reservation.position_id),
            );
        }
    }

    let snapshot = ledger.snapshot();
    output::ok(&format!("{} reservation(s) released", targets.len()));
    output::key_value("cash", snapshot.cash);
    output::key_value("open notional", snapshot.open_notional);
    Ok(())
}
