//! Risk and sizing configuration.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Limits enforced by the risk gate and the ledger.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Realized loss per trading day at which all new trades are refused.
    #[serde(default = "default_daily_loss_limit")]
    pub daily_loss_limit: Decimal,
    /// Maximum number of live positions.
    #[serde(default = "default_max_concurrent_positions")]
    pub max_concurrent_positions: usize,
    /// Fraction of full Kelly to stake.
    #[serde(default = "default_kelly_multiplier")]
    pub kelly_multiplier: Decimal,
    /// Ceiling on the staked fraction of available capital.
    #[serde(default = "default_kelly_cap")]
    pub kelly_cap: Decimal,
    /// Maximum notional of a single position.
    #[serde(default = "default_max_position_notional")]
    pub max_position_notional: Decimal,
    /// Maximum notional across all open positions.
    #[serde(default = "default_max_open_notional")]
    pub max_open_notional: Decimal,
    /// Trades smaller than this are not worth the fees and latency.
    #[serde(default = "default_min_trade_notional")]
    pub min_trade_notional: Decimal,
}

fn default_daily_loss_limit() -> Decimal {
    Decimal::from(100)
}

fn default_max_concurrent_positions() -> usize {
    5
}

fn default_kelly_multiplier() -> Decimal {
    Decimal::new(5, 1) // half Kelly
}

fn default_kelly_cap() -> Decimal {
    Decimal::new(25, 2)
}

fn default_max_position_notional() -> Decimal {
    Decimal::from(250)
}

fn default_max_open_notional() -> Decimal {
    Decimal::from(1_000)
}

fn default_min_trade_notional() -> Decimal {
    Decimal::ONE
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            daily_loss_limit: default_daily_loss_limit(),
            max_concurrent_positions: default_max_concurrent_positions(),
            kelly_multiplier: default_kelly_multiplier(),
            kelly_cap: default_kelly_cap(),
            max_position_notional: default_max_position_notional(),
            max_open_notional: default_max_open_notional(),
            min_trade_notional: default_min_trade_notional(),
        }
    }
}
