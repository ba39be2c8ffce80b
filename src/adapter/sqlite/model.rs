//! Diesel row types.

use diesel::prelude::*;

use super::schema::ledger_entries;

/// One audit entry as stored. Decimals are kept as text so they survive
/// without rounding.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = ledger_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LedgerEntryRow {
    pub seq: i64,
    pub at: String,
    pub kind: String,
    pub position_id: Option<i64>,
    pub reservation_id: Option<i64>,
    pub cash_delta: String,
    pub notional_delta: String,
    pub pnl_delta: String,
    pub cash_after: String,
}
