//! Capital ledger with an append-only audit log.
//!
//! The ledger is the only owner of capital state. Risk sizing reads
//! [`LedgerSnapshot`]s; execution reserves, commits and rolls back. Every
//! mutation is an [`AuditEntry`], and [`replay`] rebuilds identical state
//! from the log.

mod audit;
mod state;
mod writer;

pub use audit::{AuditEntry, AuditKind, AuditSink, MemorySink};
pub use state::{replay, LedgerState, Reservation};
pub use writer::{Ledger, LedgerSnapshot};
