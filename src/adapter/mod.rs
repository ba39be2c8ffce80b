//! Venue and storage adapters behind the crate's ports.
//!
//! - [`polymarket`] and [`binance`]: [`MarketDataFeed`](crate::exchange::MarketDataFeed)
//!   implementations.
//! - [`clob`] and [`paper`]: [`OrderGateway`](crate::exchange::OrderGateway)
//!   implementations.
//! - [`sqlite`]: durable [`AuditSink`](crate::ledger::AuditSink).

pub mod binance;
pub mod clob;
pub mod paper;
pub mod polymarket;
pub mod sqlite;
mod socket;

pub use binance::BinanceFeed;
pub use clob::ClobGateway;
pub use paper::PaperGateway;
pub use polymarket::PolymarketFeed;
pub use sqlite::SqliteAuditSink;
