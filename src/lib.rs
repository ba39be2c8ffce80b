//! Plutus - structural arbitrage detection and execution.
//!
//! Market data from several venues flows through one engine task that
//! orders ticks, tracks venue health, runs the detection strategies and
//! sizes what they find against a capital ledger. Approved trades become
//! positions, each driven by its own task until it closes or rolls back.
//!
//! # Modules
//!
//! - [`ingest`] - feed tasks, reconnection, sequencing and venue health
//! - [`detector`] - structural, cross-venue and spread-capture strategies
//! - [`risk`] - Kelly sizing and limit checks
//! - [`execution`] - position lifecycle, retries and the kill switch
//! - [`ledger`] - capital accounting with an append-only audit log
//! - [`adapter`] - venue feeds, order gateways and the SQLite audit store
//! - [`app`] - configuration, the engine task and the status snapshot
//! - [`cli`] - the `plutus` command line
//!
//! # Example
//!
//! ```no_run
//! use plutus::app::Config;
//! use plutus::detector::StrategyRegistry;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     let registry = StrategyRegistry::from_config(&config)?;
//!     println!("{} strategies enabled", registry.len());
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod app;
pub mod cli;
pub mod detector;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod ingest;
pub mod ledger;
pub mod risk;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
