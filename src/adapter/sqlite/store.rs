//! SQLite-backed audit sink.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use tracing::info;

use super::connection::{create_pool, run_migrations, DbPool};
use super::model::LedgerEntryRow;
use super::schema::ledger_entries;
use crate::domain::{PositionId, ReservationId};
use crate::error::LedgerError;
use crate::ledger::{AuditEntry, AuditSink};

/// Durable append-only store for ledger audit entries.
pub struct SqliteAuditSink {
    pool: DbPool,
}

impl std::fmt::Debug for SqliteAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAuditSink")
            .field("connections", &self.pool.state().connections)
            .finish()
    }
}

impl SqliteAuditSink {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database at `database_url` and migrate it.
    ///
    /// # Errors
    /// Returns an error if the pool cannot be built or migrations fail.
    pub fn open(database_url: &str) -> crate::error::Result<Self> {
        let pool = create_pool(database_url)?;
        run_migrations(&pool)?;
        info!(database = %database_url, "Audit store ready");
        Ok(Self::new(pool))
    }

    fn to_row(entry: &AuditEntry) -> Result<LedgerEntryRow, LedgerError> {
        Ok(LedgerEntryRow {
            seq: to_i64(entry.seq)?,
            at: entry.at.to_rfc3339(),
            kind: entry.kind.as_str().to_string(),
            position_id: entry.position_id.map(|id| to_i64(id.value())).transpose()?,
            reservation_id: entry
                .reservation_id
                .map(|id| to_i64(id.value()))
                .transpose()?,
            cash_delta: entry.cash_delta.to_string(),
            notional_delta: entry.notional_delta.to_string(),
            pnl_delta: entry.pnl_delta.to_string(),
            cash_after: entry.cash_after.to_string(),
        })
    }

    fn from_row(row: LedgerEntryRow) -> Result<AuditEntry, LedgerError> {
        let at: DateTime<Utc> = DateTime::parse_from_rfc3339(&row.at)
            .map_err(|e| corrupt(row.seq, e))?
            .with_timezone(&Utc);
        Ok(AuditEntry {
            seq: to_u64(row.seq)?,
            at,
            kind: row.kind.parse().map_err(|e| corrupt(row.seq, e))?,
            position_id: row.position_id.map(to_u64).transpose()?.map(PositionId::new),
            reservation_id: row
                .reservation_id
                .map(to_u64)
                .transpose()?
                .map(ReservationId::new),
            cash_delta: decimal(row.seq, &row.cash_delta)?,
            notional_delta: decimal(row.seq, &row.notional_delta)?,
            pnl_delta: decimal(row.seq, &row.pnl_delta)?,
            cash_after: decimal(row.seq, &row.cash_after)?,
        })
    }

    fn connection(
        &self,
    ) -> Result<
        diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<SqliteConnection>>,
        LedgerError,
    > {
        self.pool
            .get()
            .map_err(|e| LedgerError::Sink(format!("connection: {e}")))
    }
}

impl AuditSink for SqliteAuditSink {
    fn append(&self, entry: &AuditEntry) -> Result<(), LedgerError> {
        let row = Self::to_row(entry)?;
        let mut conn = self.connection()?;
        diesel::insert_into(ledger_entries::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(|e| LedgerError::Sink(format!("append seq {}: {e}", entry.seq)))?;
        Ok(())
    }

    fn load(&self) -> Result<Vec<AuditEntry>, LedgerError> {
        let mut conn = self.connection()?;
        let rows: Vec<LedgerEntryRow> = ledger_entries::table
            .order(ledger_entries::seq.asc())
            .select(LedgerEntryRow::as_select())
            .load(&mut conn)
            .map_err(|e| LedgerError::Sink(format!("load: {e}")))?;
        rows.into_iter().map(Self::from_row).collect()
    }
}

fn to_i64(value: u64) -> Result<i64, LedgerError> {
    i64::try_from(value).map_err(|_| LedgerError::Sink(format!("{value} does not fit a row")))
}

fn to_u64(value: i64) -> Result<u64, LedgerError> {
    u64::try_from(value).map_err(|_| LedgerError::Sink(format!("negative id {value} in store")))
}

fn decimal(seq: i64, raw: &str) -> Result<Decimal, LedgerError> {
    raw.parse().map_err(|e| corrupt(seq, e))
}

fn corrupt(seq: i64, err: impl std::fmt::Display) -> LedgerError {
    LedgerError::Sink(format!("corrupt row {seq}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn sink(dir: &tempfile::TempDir) -> SqliteAuditSink {
        let path = dir.path().join("audit.db");
        SqliteAuditSink::open(&path.to_string_lossy()).unwrap()
    }

    #[test]
    fn entries_survive_a_round_trip_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(sink(&dir));
        let ledger = Ledger::open(dec!(1000), dec!(100), sink.clone(), Utc::now()).unwrap();
        let reservation = ledger.reserve(PositionId::new(1), dec!(12.3456789)).unwrap();
        ledger
            .commit(PositionId::new(1), reservation, dec!(-0.000001))
            .unwrap();

        let stored = sink.load().unwrap();
        assert_eq!(stored, ledger.entries());
        assert_eq!(stored.len(), 3);
    }

    #[test]
    fn reopening_restores_the_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = {
            let sink = Arc::new(sink(&dir));
            let ledger = Ledger::open(dec!(500), dec!(50), sink, Utc::now()).unwrap();
            ledger.reserve(PositionId::new(4), dec!(20)).unwrap();
            ledger.snapshot()
        };

        let sink = Arc::new(sink(&dir));
        // initial capital is ignored once the log exists
        let ledger = Ledger::open(dec!(999), dec!(50), sink, Utc::now()).unwrap();
        assert_eq!(ledger.snapshot().cash, snapshot.cash);
        assert_eq!(ledger.snapshot().open_notional, dec!(20));
        ledger.verify().unwrap();
    }

    #[test]
    fn duplicate_sequence_numbers_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink(&dir);
        let genesis = Ledger::new(dec!(1), dec!(1), Utc::now()).unwrap().entries()[0].clone();
        sink.append(&genesis).unwrap();
        assert!(matches!(sink.append(&genesis), Err(LedgerError::Sink(_))));
    }
}
