//! Handler for the `status` command.

use crate::app::{StatusSnapshot, StatusWriter};
use crate::cli::{output, StatusArgs};
use crate::error::Result;

/// Execute the status command.
pub fn execute(args: &StatusArgs) -> Result<()> {
    let snapshot = StatusWriter::read(&args.status_file)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        render(&snapshot);
    }
    Ok(())
}

fn render(snapshot: &StatusSnapshot) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("plutus v{version}");

    output::section("Engine");
    output::key_value("pid", snapshot.pid);
    output::key_value("started", snapshot.started_at);
    output::key_value("updated", snapshot.updated_at);
    output::key_value("mode", if snapshot.dry_run { "dry-run" } else { "live" });
    output::key_value("strategies", snapshot.strategies.join(", "));
    match (&snapshot.kill_switch, &snapshot.ledger.halted) {
        (_, Some(reason)) => output::warn(&format!("ledger halted: {reason}")),
        (Some(reason), None) => output::warn(&format!("kill switch tripped: {reason}")),
        (None, None) => output::ok("trading enabled"),
    }

    let ledger = &snapshot.ledger;
    output::section("Ledger");
    output::key_value("cash", ledger.cash);
    output::key_value("open notional", ledger.open_notional);
    output::key_value("equity", ledger.equity);
    output::key_value("available", ledger.available);
    output::pnl("daily pnl", ledger.daily_pnl);
    output::pnl("cumulative pnl", ledger.cumulative_pnl);
    output::key_value("trading day", ledger.trading_day);
    output::key_value("audit entries", ledger.entries);

    output::section("Venues");
    for report in &snapshot.venues {
        match &report.status {
            crate::ingest::VenueStatus::Healthy => {
                output::key_value(report.venue.as_str(), "healthy");
            }
            crate::ingest::VenueStatus::Degraded { reason, since } => {
                output::key_value(report.venue.as_str(), format!("degraded ({reason}) since {since}"));
            }
        }
    }

    output::section("Positions");
    if snapshot.positions_by_status.is_empty() {
        output::key_value("live", 0);
    }
    for (status, count) in &snapshot.positions_by_status {
        output::key_value(status, count);
    }

    let counters = &snapshot.counters;
    output::section("Counters");
    output::key_value("ticks", counters.ticks);
    output::key_value("dropped ticks", counters.dropped_ticks);
    output::key_value("opportunities", counters.opportunities);
    output::key_value("stale", counters.stale);
    output::key_value("halted", counters.halted);
    output::key_value("opened", counters.positions_opened);
    output::key_value("closed", counters.positions_closed);
    output::key_value("failed", counters.positions_failed);
    for (reason, count) in &counters.rejections {
        output::key_value(&format!("rejected {reason}"), count);
    }
    println!();
}
