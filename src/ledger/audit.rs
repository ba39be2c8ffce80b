//! Append-only audit log entries and sinks.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{PositionId, ReservationId};
use crate::error::LedgerError;

/// Kind of ledger mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Ledger creation with the initial capital.
    Genesis,
    /// Capital moved from cash into an open reservation.
    Reserve,
    /// Reservation released with realized P&L.
    Commit,
    /// Reservation released unchanged.
    Rollback,
    /// Start of a new trading day; resets daily P&L.
    DailyReset,
}

impl AuditKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Genesis => "genesis",
            Self::Reserve => "reserve",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
            Self::DailyReset => "daily_reset",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "genesis" => Ok(Self::Genesis),
            "reserve" => Ok(Self::Reserve),
            "commit" => Ok(Self::Commit),
            "rollback" => Ok(Self::Rollback),
            "daily_reset" => Ok(Self::DailyReset),
            other => Err(format!("unknown audit kind '{other}'")),
        }
    }
}

/// One immutable ledger mutation.
///
/// `cash_after` is redundant with the deltas on purpose: replay checks
/// `cash_before + cash_delta == cash_after` for every entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the log, starting at 1 for genesis.
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub kind: AuditKind,
    /// Causal position. Absent only for genesis and daily resets.
    pub position_id: Option<PositionId>,
    pub reservation_id: Option<ReservationId>,
    pub cash_delta: Decimal,
    pub notional_delta: Decimal,
    pub pnl_delta: Decimal,
    pub cash_after: Decimal,
}

impl AuditEntry {
    pub(crate) fn genesis(initial_capital: Decimal, at: DateTime<Utc>) -> Self {
        Self {
            seq: 1,
            at,
            kind: AuditKind::Genesis,
            position_id: None,
            reservation_id: None,
            cash_delta: initial_capital,
            notional_delta: Decimal::ZERO,
            pnl_delta: Decimal::ZERO,
            cash_after: initial_capital,
        }
    }
}

/// Durable destination for audit entries.
///
/// `append` is called under the ledger's write lock before the in-memory
/// state changes, so a failed append leaves the ledger untouched.
pub trait AuditSink: Send + Sync {
    /// Persist one entry.
    fn append(&self, entry: &AuditEntry) -> Result<(), LedgerError>;

    /// Load every persisted entry in sequence order.
    fn load(&self) -> Result<Vec<AuditEntry>, LedgerError>;
}

/// In-memory sink, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl AuditSink for MemorySink {
    fn append(&self, entry: &AuditEntry) -> Result<(), LedgerError> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }

    fn load(&self) -> Result<Vec<AuditEntry>, LedgerError> {
        Ok(self.entries.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn kind_round_trips_through_its_tag() {
        for kind in [
            AuditKind::Genesis,
            AuditKind::Reserve,
            AuditKind::Commit,
            AuditKind::Rollback,
            AuditKind::DailyReset,
        ] {
            assert_eq!(kind.as_str().parse::<AuditKind>(), Ok(kind));
        }
        assert!("transfer".parse::<AuditKind>().is_err());
    }

    #[test]
    fn genesis_entry_credits_initial_capital() {
        let entry = AuditEntry::genesis(dec!(500), Utc::now());
        assert_eq!(entry.seq, 1);
        assert_eq!(entry.cash_delta, dec!(500));
        assert_eq!(entry.cash_after, dec!(500));
        assert!(entry.position_id.is_none());
    }

    #[test]
    fn memory_sink_keeps_entries_in_order() {
        let sink = MemorySink::new();
        let at = Utc::now();
        sink.append(&AuditEntry::genesis(dec!(1), at)).unwrap();
        let mut second = AuditEntry::genesis(dec!(1), at);
        second.seq = 2;
        second.kind = AuditKind::DailyReset;
        second.cash_delta = Decimal::ZERO;
        sink.append(&second).unwrap();

        let loaded = sink.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].kind, AuditKind::DailyReset);
    }
}
