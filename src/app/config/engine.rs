//! Engine loop and ledger configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Engine loop settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the feed event channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Capacity of the market update broadcast used by live positions.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    /// Mid prices kept per instrument for indicators.
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    /// Housekeeping interval: day roll, stale sweep, status file (milliseconds).
    #[serde(default = "default_housekeeping_interval_ms")]
    pub housekeeping_interval_ms: u64,
    /// A venue silent for this long is degraded (seconds).
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Where the JSON status snapshot is written.
    #[serde(default = "default_status_file")]
    pub status_file: String,
    /// How long shutdown waits for live positions (milliseconds).
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_channel_capacity() -> usize {
    4_096
}

fn default_broadcast_capacity() -> usize {
    1_024
}

fn default_history_len() -> usize {
    64
}

fn default_housekeeping_interval_ms() -> u64 {
    1_000
}

fn default_stale_after_secs() -> u64 {
    30
}

fn default_status_file() -> String {
    "plutus-status.json".into()
}

fn default_shutdown_grace_ms() -> u64 {
    10_000
}

impl EngineConfig {
    #[must_use]
    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_millis(self.housekeeping_interval_ms)
    }

    #[must_use]
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.stale_after_secs).unwrap_or(i64::MAX))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            broadcast_capacity: default_broadcast_capacity(),
            history_len: default_history_len(),
            housekeeping_interval_ms: default_housekeeping_interval_ms(),
            stale_after_secs: default_stale_after_secs(),
            status_file: default_status_file(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

/// Ledger settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Capital at genesis.
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,
    /// SQLite file for the durable audit log. In-memory only when unset.
    #[serde(default)]
    pub database: Option<String>,
}

fn default_initial_capital() -> Decimal {
    Decimal::from(1_000)
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_capital: default_initial_capital(),
            database: None,
        }
    }
}
