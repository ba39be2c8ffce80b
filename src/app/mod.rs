//! Application layer: configuration, engine, status and wiring.

mod config;
mod counters;
mod engine;
mod runner;
pub mod status;

pub use config::{
    ApiCredentials, Config, CrossVenueConfig, EngineConfig, ExecutionConfig, ExitConfig,
    LedgerConfig, LoggingConfig, MarketConfig, PairConfig, QuoteRef, ReconnectionConfig,
    RetryConfig, RiskConfig, SpreadCaptureConfig, StrategiesConfig, StructuralConfig,
    VenueConfig, VenueKind,
};
pub use counters::Counters;
pub use engine::{Engine, EngineBuilder};
pub use runner::{open_ledger, App};
pub use status::{StatusSnapshot, StatusWriter, VenueReport};
