//! Execution configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Execution coordinator settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Time allowed for every leg to fill before rolling back (milliseconds).
    #[serde(default = "default_fill_timeout_ms")]
    pub fill_timeout_ms: u64,
    /// Order status polling interval (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Price concession on compensating and closing orders, as a fraction.
    #[serde(default = "default_flatten_slippage")]
    pub flatten_slippage: Decimal,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub exit: ExitConfig,
}

fn default_fill_timeout_ms() -> u64 {
    5_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_flatten_slippage() -> Decimal {
    Decimal::new(2, 2)
}

impl ExecutionConfig {
    #[must_use]
    pub fn fill_timeout(&self) -> Duration {
        Duration::from_millis(self.fill_timeout_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            fill_timeout_ms: default_fill_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            flatten_slippage: default_flatten_slippage(),
            retry: RetryConfig::default(),
            exit: ExitConfig::default(),
        }
    }
}

/// Bounded exponential backoff for order submission.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    2_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Exit conditions for filled cross-venue and spread-capture positions.
/// Structural positions are held until the market resolves.
#[derive(Debug, Clone, Deserialize)]
pub struct ExitConfig {
    /// Close when mark-to-market P&L reaches this fraction of entry cost.
    #[serde(default = "default_take_profit")]
    pub take_profit: Decimal,
    /// Close when mark-to-market loss reaches this fraction of entry cost.
    #[serde(default = "default_stop_loss")]
    pub stop_loss: Decimal,
    /// Close after holding this long (seconds).
    #[serde(default = "default_max_hold_secs")]
    pub max_hold_secs: u64,
    /// How often exit conditions are evaluated (milliseconds).
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
}

fn default_take_profit() -> Decimal {
    Decimal::new(3, 2)
}

fn default_stop_loss() -> Decimal {
    Decimal::new(5, 2)
}

fn default_max_hold_secs() -> u64 {
    86_400
}

fn default_monitor_interval_ms() -> u64 {
    500
}

impl ExitConfig {
    #[must_use]
    pub fn max_hold(&self) -> Duration {
        Duration::from_secs(self.max_hold_secs)
    }

    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            take_profit: default_take_profit(),
            stop_loss: default_stop_loss(),
            max_hold_secs: default_max_hold_secs(),
            monitor_interval_ms: default_monitor_interval_ms(),
        }
    }
}
