//! Pre-trade risk checks and position sizing.

use std::fmt;

use rust_decimal::prelude::RoundingStrategy;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::kelly::KellySizer;
use crate::app::RiskConfig;
use crate::domain::{Opportunity, Volume};
use crate::ledger::LedgerSnapshot;

/// Decimal places kept on sized quantities.
const SIZE_DP: u32 = 4;

/// Why the gate refused a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// Daily realized loss has reached the limit.
    LossLimit,
    /// Open notional would exceed its ceiling.
    PositionLimit,
    /// Too many live positions.
    ConcurrencyLimit,
    /// Kelly stake is non-positive or below the minimum trade.
    BelowMinimumSize,
}

impl RejectReason {
    pub const ALL: [Self; 4] = [
        Self::LossLimit,
        Self::PositionLimit,
        Self::ConcurrencyLimit,
        Self::BelowMinimumSize,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LossLimit => "loss-limit",
            Self::PositionLimit => "position-limit",
            Self::ConcurrencyLimit => "concurrency-limit",
            Self::BelowMinimumSize => "below-minimum-size",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A refused trade. Never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("risk rejected ({reason}): {detail}")]
pub struct Rejection {
    pub reason: RejectReason,
    pub detail: String,
}

impl Rejection {
    fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

/// An approved opportunity with its size.
#[derive(Debug, Clone, PartialEq)]
pub struct SizedTrade {
    pub opportunity: Opportunity,
    /// Units to trade on every leg.
    pub size: Volume,
    /// Capital to reserve: `size × notional_per_unit`.
    pub notional: Decimal,
    /// Fraction of available capital staked.
    pub kelly_fraction: Decimal,
}

/// Sizes opportunities against the ledger and refuses those that break a
/// limit.
///
/// The gate is pure: it reads a ledger snapshot and never reserves capital
/// itself. Reservation happens in the execution coordinator, which re-checks
/// availability under the ledger lock.
#[derive(Debug, Clone)]
pub struct RiskGate {
    config: RiskConfig,
    sizer: KellySizer,
}

impl RiskGate {
    #[must_use]
    pub fn new(config: RiskConfig) -> Self {
        let sizer = KellySizer::new(config.kelly_multiplier, config.kelly_cap);
        Self { config, sizer }
    }

    #[must_use]
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Evaluate an opportunity.
    ///
    /// Checks run in order: loss limit, concurrency, Kelly sizing, open
    /// notional. The first failure wins.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] labelled with the failed check.
    pub fn evaluate(
        &self,
        opportunity: &Opportunity,
        ledger: &LedgerSnapshot,
        open_positions: usize,
    ) -> Result<SizedTrade, Rejection> {
        if ledger.daily_loss() >= self.config.daily_loss_limit {
            return Err(Rejection::new(
                RejectReason::LossLimit,
                format!(
                    "daily loss {} reached limit {}",
                    ledger.daily_loss(),
                    self.config.daily_loss_limit
                ),
            ));
        }

        if open_positions >= self.config.max_concurrent_positions {
            return Err(Rejection::new(
                RejectReason::ConcurrencyLimit,
                format!(
                    "{open_positions} positions open, limit {}",
                    self.config.max_concurrent_positions
                ),
            ));
        }

        let trade = self.size(opportunity, ledger)?;

        let open_after = ledger.open_notional + trade.notional;
        if open_after > self.config.max_open_notional {
            return Err(Rejection::new(
                RejectReason::PositionLimit,
                format!(
                    "open notional {} + {} exceeds {}",
                    ledger.open_notional, trade.notional, self.config.max_open_notional
                ),
            ));
        }

        debug!(
            opportunity_id = %opportunity.id(),
            size = %trade.size,
            notional = %trade.notional,
            fraction = %trade.kelly_fraction,
            "Trade sized"
        );
        Ok(trade)
    }

    fn size(
        &self,
        opportunity: &Opportunity,
        ledger: &LedgerSnapshot,
    ) -> Result<SizedTrade, Rejection> {
        let per_unit = opportunity.notional_per_unit();
        if per_unit <= Decimal::ZERO {
            return Err(Rejection::new(
                RejectReason::BelowMinimumSize,
                "opportunity has no notional per unit",
            ));
        }

        let payoff = opportunity.return_on_notional();
        let fraction = self
            .sizer
            .fraction(opportunity.confidence(), payoff)
            .ok_or_else(|| {
                Rejection::new(
                    RejectReason::BelowMinimumSize,
                    format!(
                        "no Kelly edge at payoff {} and confidence {}",
                        payoff.round_dp(6),
                        opportunity.confidence()
                    ),
                )
            })?;

        let stake = (fraction * ledger.available)
            .min(self.config.max_position_notional)
            .min(opportunity.max_size() * per_unit);

        let size = (stake / per_unit).round_dp_with_strategy(SIZE_DP, RoundingStrategy::ToZero);
        let notional = size * per_unit;

        if size <= Decimal::ZERO || notional < self.config.min_trade_notional {
            return Err(Rejection::new(
                RejectReason::BelowMinimumSize,
                format!(
                    "stake {} below minimum {}",
                    notional.round_dp(6),
                    self.config.min_trade_notional
                ),
            ));
        }

        Ok(SizedTrade {
            opportunity: opportunity.clone(),
            size,
            notional,
            kelly_fraction: fraction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InstrumentKey, OpportunityLeg, Side, StrategyKind};
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn opportunity(yes: Decimal, no: Decimal, available: Decimal) -> Opportunity {
        let edge = Decimal::ONE - yes - no;
        Opportunity::builder()
            .strategy(StrategyKind::Structural)
            .key(InstrumentKey::new("pm".into(), "m1".into()))
            .leg(OpportunityLeg::new("pm", "m1", "yes", Side::Buy, yes, available))
            .leg(OpportunityLeg::new("pm", "m1", "no", Side::Buy, no, available))
            .edge(edge)
            .profit_per_unit(edge)
            .ttl(Duration::seconds(5))
            .build()
            .unwrap()
    }

    fn snapshot(available: Decimal, open: Decimal, daily_pnl: Decimal) -> LedgerSnapshot {
        LedgerSnapshot {
            initial_capital: dec!(1000),
            cash: available,
            open_notional: open,
            equity: available + open,
            available,
            daily_pnl,
            cumulative_pnl: daily_pnl,
            daily_loss_limit: dec!(100),
            trading_day: Utc::now().date_naive(),
            open_reservations: 0,
            entries: 1,
            halted: None,
        }
    }

    fn gate() -> RiskGate {
        RiskGate::new(RiskConfig::default())
    }

    #[test]
    fn sizes_with_capped_kelly() {
        let opp = opportunity(dec!(0.45), dec!(0.45), dec!(1000));
        let trade = gate().evaluate(&opp, &snapshot(dec!(400), dec!(0), dec!(0)), 0).unwrap();

        // full Kelly is 1 at confidence 1; half Kelly capped at 25% of 400
        assert_eq!(trade.kelly_fraction, dec!(0.25));
        assert_eq!(trade.notional, dec!(99.99999));
        assert_eq!(trade.size, dec!(111.1111));
        assert!(trade.notional <= gate().config().max_position_notional);
    }

    #[test]
    fn stake_is_clamped_to_available_size() {
        let opp = opportunity(dec!(0.45), dec!(0.45), dec!(20));
        let trade = gate().evaluate(&opp, &snapshot(dec!(900), dec!(0), dec!(0)), 0).unwrap();

        assert_eq!(trade.size, dec!(20));
        assert_eq!(trade.notional, dec!(18));
    }

    #[test]
    fn stake_is_clamped_to_max_position_notional() {
        let opp = opportunity(dec!(0.45), dec!(0.45), dec!(100000));
        let trade = gate()
            .evaluate(&opp, &snapshot(dec!(100000), dec!(0), dec!(0)), 0)
            .unwrap();

        assert!(trade.notional <= dec!(250));
        assert!(trade.notional > dec!(249.99));
    }

    #[test]
    fn loss_limit_rejects_first() {
        let opp = opportunity(dec!(0.45), dec!(0.45), dec!(100));
        let err = gate()
            .evaluate(&opp, &snapshot(dec!(900), dec!(0), dec!(-100)), 99)
            .unwrap_err();
        assert_eq!(err.reason, RejectReason::LossLimit);
    }

    #[test]
    fn concurrency_limit_rejects() {
        let opp = opportunity(dec!(0.45), dec!(0.45), dec!(100));
        let err = gate()
            .evaluate(&opp, &snapshot(dec!(900), dec!(0), dec!(0)), 5)
            .unwrap_err();
        assert_eq!(err.reason, RejectReason::ConcurrencyLimit);
    }

    #[test]
    fn open_notional_ceiling_rejects_with_position_limit() {
        let opp = opportunity(dec!(0.45), dec!(0.45), dec!(100));
        let err = gate()
            .evaluate(&opp, &snapshot(dec!(900), dec!(990), dec!(0)), 1)
            .unwrap_err();
        assert_eq!(err.reason, RejectReason::PositionLimit);
    }

    #[test]
    fn no_kelly_edge_is_below_minimum_size() {
        let opp = Opportunity::builder()
            .strategy(StrategyKind::Structural)
            .key(InstrumentKey::new("pm".into(), "m1".into()))
            .leg(OpportunityLeg::new("pm", "m1", "yes", Side::Buy, dec!(0.5), dec!(10)))
            .leg(OpportunityLeg::new("pm", "m1", "no", Side::Buy, dec!(0.49), dec!(10)))
            .edge(dec!(0.01))
            .profit_per_unit(dec!(0.01))
            .confidence(dec!(0.9))
            .ttl(Duration::seconds(1))
            .build()
            .unwrap();

        let err = gate()
            .evaluate(&opp, &snapshot(dec!(900), dec!(0), dec!(0)), 0)
            .unwrap_err();
        assert_eq!(err.reason, RejectReason::BelowMinimumSize);
    }

    #[test]
    fn tiny_stake_is_below_minimum_size() {
        let opp = opportunity(dec!(0.45), dec!(0.45), dec!(1));
        let err = gate()
            .evaluate(&opp, &snapshot(dec!(900), dec!(0), dec!(0)), 0)
            .unwrap_err();
        assert_eq!(err.reason, RejectReason::BelowMinimumSize);
        assert!(err.to_string().contains("below-minimum-size"));
    }

    #[test]
    fn reason_tags_are_stable() {
        let tags: Vec<&str> = RejectReason::ALL.iter().map(RejectReason::as_str).collect();
        assert_eq!(
            tags,
            ["loss-limit", "position-limit", "concurrency-limit", "below-minimum-size"]
        );
    }
}
