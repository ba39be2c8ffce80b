//! SQLite persistence for the ledger audit log.

pub mod connection;
pub mod model;
pub mod schema;
mod store;

pub use connection::{create_pool, run_migrations, DbPool};
pub use store::SqliteAuditSink;
