//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`feed`]: mock [`MarketDataFeed`](crate::exchange::MarketDataFeed)
//!   implementations: `ScriptedFeed`, `ChannelFeed`.
//! - [`gateway`]: `ScriptedGateway`, an order gateway with per-asset fill
//!   scripts.
//! - [`domain`]: builders for ticks, quotes and opportunities.
//! - [`config`]: canonical test configurations.
//! - [`detector`]: `DetectionFixture` for strategy tests.

pub mod config;
pub mod detector;
pub mod domain;
pub mod feed;
pub mod gateway;
