//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all settings. It is
//! loaded from a TOML file; API credentials come only from the environment
//! (`PLUTUS_API_KEY`, `PLUTUS_API_SECRET`, `PLUTUS_API_PASSPHRASE`).
//!
//! # Example
//!
//! ```no_run
//! use plutus::app::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

mod engine;
mod execution;
mod logging;
mod reconnection;
mod risk;
mod strategy;
mod venue;

pub use engine::{EngineConfig, LedgerConfig};
pub use execution::{ExecutionConfig, ExitConfig, RetryConfig};
pub use logging::LoggingConfig;
pub use reconnection::ReconnectionConfig;
pub use risk::RiskConfig;
pub use strategy::{
    CrossVenueConfig, PairConfig, SpreadCaptureConfig, StrategiesConfig, StructuralConfig,
};
pub use venue::{MarketConfig, QuoteRef, VenueConfig, VenueKind};

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::{FeeModel, StrategyKind, VenueId};
use crate::error::{ConfigError, Result};

/// Venue API credentials, read from the environment.
#[derive(Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
}

impl ApiCredentials {
    /// Read credentials from `PLUTUS_API_*`. All three must be set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Some(Self {
            api_key: std::env::var("PLUTUS_API_KEY").ok()?,
            api_secret: std::env::var("PLUTUS_API_SECRET").ok()?,
            passphrase: std::env::var("PLUTUS_API_PASSPHRASE").ok()?,
        })
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

/// Main application configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    /// Taker fee schedule applied to every edge.
    #[serde(default)]
    pub fees: FeeModel,

    #[serde(default)]
    pub venues: Vec<VenueConfig>,

    #[serde(default)]
    pub markets: Vec<MarketConfig>,

    #[serde(default)]
    pub strategies: StrategiesConfig,

    #[serde(default)]
    pub risk: RiskConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub reconnection: ReconnectionConfig,

    /// Detect and size, but route orders to the paper gateway.
    #[serde(default)]
    pub dry_run: bool,

    /// Loaded from the environment, never from the file.
    #[serde(skip)]
    pub credentials: Option<ApiCredentials>,
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn parse_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.credentials = ApiCredentials::from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML content is
    /// malformed, or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }

    /// Look up a venue by id.
    #[must_use]
    pub fn venue(&self, id: &VenueId) -> Option<&VenueConfig> {
        self.venues.iter().find(|v| &v.id == id)
    }

    /// Markets configured on a venue.
    pub fn markets_on<'a>(&'a self, venue: &'a VenueId) -> impl Iterator<Item = &'a MarketConfig> {
        self.markets.iter().filter(move |m| &m.venue == venue)
    }

    /// Parsed list of enabled strategies.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first unknown strategy.
    #[allow(clippy::result_large_err)]
    pub fn enabled_strategies(&self) -> Result<Vec<StrategyKind>> {
        self.strategies
            .enabled
            .iter()
            .map(|name| {
                name.parse::<StrategyKind>()
                    .map_err(|_| invalid("strategies.enabled", format!("unknown strategy '{name}'")))
            })
            .collect()
    }

    /// Validate configuration values.
    #[allow(clippy::result_large_err)]
    fn validate(&self) -> Result<()> {
        self.fees.validate().map_err(|reason| invalid("fees", reason))?;
        self.validate_venues()?;
        self.validate_strategies()?;
        self.validate_risk()?;
        self.validate_execution()?;

        if self.ledger.initial_capital <= Decimal::ZERO {
            return Err(invalid("ledger.initial_capital", "must be greater than 0"));
        }
        if self.engine.channel_capacity == 0 || self.engine.broadcast_capacity == 0 {
            return Err(invalid("engine.channel_capacity", "must be greater than 0"));
        }
        if self.engine.history_len < 2 {
            return Err(invalid("engine.history_len", "must be at least 2"));
        }
        if self.engine.housekeeping_interval_ms == 0 {
            return Err(invalid("engine.housekeeping_interval_ms", "must be greater than 0"));
        }

        self.reconnection
            .validate()
            .map_err(|(field, reason)| invalid(field, reason))?;

        Ok(())
    }

    #[allow(clippy::result_large_err)]
    fn validate_venues(&self) -> Result<()> {
        if self.venues.is_empty() {
            return Err(ConfigError::MissingField { field: "venues" }.into());
        }

        let mut seen = HashSet::new();
        for venue in &self.venues {
            if !seen.insert(&venue.id) {
                return Err(invalid("venues.id", format!("duplicate venue '{}'", venue.id)));
            }
            url::Url::parse(&venue.ws_url)
                .map_err(|e| invalid("venues.ws_url", format!("{}: {e}", venue.id)))?;
            if let Some(api_url) = &venue.api_url {
                url::Url::parse(api_url)
                    .map_err(|e| invalid("venues.api_url", format!("{}: {e}", venue.id)))?;
            }
        }

        for market in &self.markets {
            let Some(venue) = self.venue(&market.venue) else {
                return Err(invalid(
                    "markets.venue",
                    format!("unknown venue '{}'", market.venue),
                ));
            };
            if venue.kind == VenueKind::Polymarket && !market.is_binary() {
                return Err(invalid(
                    "markets.yes_asset",
                    format!("{} needs yes_asset and no_asset", market.key()),
                ));
            }
        }

        Ok(())
    }

    #[allow(clippy::result_large_err)]
    fn validate_strategies(&self) -> Result<()> {
        let enabled = self.enabled_strategies()?;
        let s = &self.strategies;

        let checks = [
            (
                StrategyKind::Structural,
                s.structural.min_edge,
                s.structural.confidence,
                s.structural.ttl_ms,
            ),
            (
                StrategyKind::CrossVenue,
                s.cross_venue.min_edge,
                s.cross_venue.confidence,
                s.cross_venue.ttl_ms,
            ),
            (
                StrategyKind::SpreadCapture,
                s.spread_capture.min_edge,
                s.spread_capture.confidence,
                s.spread_capture.ttl_ms,
            ),
        ];
        for (kind, min_edge, confidence, ttl_ms) in checks {
            if !enabled.contains(&kind) {
                continue;
            }
            if min_edge <= Decimal::ZERO {
                return Err(invalid("min_edge", format!("{kind}: must be greater than 0")));
            }
            if confidence <= Decimal::ZERO || confidence > Decimal::ONE {
                return Err(invalid("confidence", format!("{kind}: must be in (0, 1]")));
            }
            if ttl_ms == 0 {
                return Err(invalid("ttl_ms", format!("{kind}: must be greater than 0")));
            }
        }

        if enabled.contains(&StrategyKind::CrossVenue) {
            for pair in &s.cross_venue.pairs {
                for side in [&pair.a, &pair.b] {
                    if self.venue(&side.venue).is_none() {
                        return Err(invalid(
                            "strategies.cross_venue.pairs",
                            format!("unknown venue '{}'", side.venue),
                        ));
                    }
                }
                if pair.a.venue == pair.b.venue {
                    return Err(invalid(
                        "strategies.cross_venue.pairs",
                        "a pair must span two venues",
                    ));
                }
            }
        }

        if enabled.contains(&StrategyKind::SpreadCapture) && s.spread_capture.min_samples < 2 {
            return Err(invalid(
                "strategies.spread_capture.min_samples",
                "must be at least 2",
            ));
        }

        Ok(())
    }

    #[allow(clippy::result_large_err)]
    fn validate_risk(&self) -> Result<()> {
        let risk = &self.risk;
        if risk.daily_loss_limit <= Decimal::ZERO {
            return Err(invalid("risk.daily_loss_limit", "must be greater than 0"));
        }
        if risk.max_concurrent_positions == 0 {
            return Err(invalid("risk.max_concurrent_positions", "must be greater than 0"));
        }
        if risk.kelly_multiplier <= Decimal::ZERO || risk.kelly_multiplier > Decimal::ONE {
            return Err(invalid("risk.kelly_multiplier", "must be in (0, 1]"));
        }
        if risk.kelly_cap <= Decimal::ZERO || risk.kelly_cap > Decimal::ONE {
            return Err(invalid("risk.kelly_cap", "must be in (0, 1]"));
        }
        if risk.max_position_notional <= Decimal::ZERO {
            return Err(invalid("risk.max_position_notional", "must be greater than 0"));
        }
        if risk.max_open_notional < risk.max_position_notional {
            return Err(invalid(
                "risk.max_open_notional",
                "must be >= max_position_notional",
            ));
        }
        if risk.min_trade_notional < Decimal::ZERO
            || risk.min_trade_notional > risk.max_position_notional
        {
            return Err(invalid(
                "risk.min_trade_notional",
                "must be between 0 and max_position_notional",
            ));
        }
        Ok(())
    }

    #[allow(clippy::result_large_err)]
    fn validate_execution(&self) -> Result<()> {
        let execution = &self.execution;
        if execution.fill_timeout_ms == 0 || execution.poll_interval_ms == 0 {
            return Err(invalid(
                "execution.fill_timeout_ms",
                "timeouts and intervals must be greater than 0",
            ));
        }
        if execution.flatten_slippage < Decimal::ZERO || execution.flatten_slippage >= Decimal::ONE
        {
            return Err(invalid("execution.flatten_slippage", "must be in [0, 1)"));
        }
        if execution.retry.max_attempts == 0 {
            return Err(invalid("execution.retry.max_attempts", "must be at least 1"));
        }
        if execution.retry.multiplier < 1.0 {
            return Err(invalid("execution.retry.multiplier", "must be >= 1.0"));
        }
        if execution.exit.monitor_interval_ms == 0 {
            return Err(invalid(
                "execution.exit.monitor_interval_ms",
                "must be greater than 0",
            ));
        }
        if execution.exit.take_profit <= Decimal::ZERO || execution.exit.stop_loss <= Decimal::ZERO
        {
            return Err(invalid(
                "execution.exit",
                "take_profit and stop_loss must be greater than 0",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> crate::error::Error {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
    .into()
}
