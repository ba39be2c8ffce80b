//! Structural arbitrage: YES + NO asks below the $1 payout.

use chrono::Duration;
use rust_decimal::Decimal;
use tracing::trace;

use super::{DetectionContext, Strategy};
use crate::app::StructuralConfig;
use crate::domain::{Opportunity, OpportunityLeg, Side, StrategyKind, Tick, TickBook};

/// Buys both outcomes of a binary market when together they cost less
/// than the guaranteed payout.
///
/// `edge = 1 − (ask_yes + ask_no) − fee_rate(venue)`
pub struct StructuralStrategy {
    config: StructuralConfig,
}

impl StructuralStrategy {
    #[must_use]
    pub const fn new(config: StructuralConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &StructuralConfig {
        &self.config
    }
}

impl Strategy for StructuralStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Structural
    }

    fn applies_to(&self, tick: &Tick) -> bool {
        matches!(tick.book, TickBook::Binary { .. })
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<Opportunity> {
        let TickBook::Binary { yes, no } = &ctx.tick.book else {
            return Vec::new();
        };
        let (Some(yes_ask), Some(no_ask)) = (yes.ask, no.ask) else {
            return Vec::new();
        };

        let fee_rate = ctx.fees.rate(&ctx.tick.venue);
        let edge = Decimal::ONE - (yes_ask.price + no_ask.price) - fee_rate;
        if edge <= self.config.min_edge {
            trace!(key = %ctx.tick.key(), %edge, "Structural edge below minimum");
            return Vec::new();
        }

        let available = yes_ask.size.min(no_ask.size);
        let tick = ctx.tick;
        Opportunity::builder()
            .strategy(StrategyKind::Structural)
            .key(tick.key())
            .leg(OpportunityLeg::new(
                tick.venue.clone(),
                tick.instrument.clone(),
                yes.asset.clone(),
                Side::Buy,
                yes_ask.price,
                available,
            ))
            .leg(OpportunityLeg::new(
                tick.venue.clone(),
                tick.instrument.clone(),
                no.asset.clone(),
                Side::Buy,
                no_ask.price,
                available,
            ))
            .edge(edge)
            .profit_per_unit(edge)
            .confidence(self.config.confidence)
            .discovered_at(ctx.now)
            .ttl(Duration::milliseconds(self.config.ttl_ms as i64))
            .build()
            .ok()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FeeModel;
    use crate::testkit::detector::context_for;
    use crate::testkit::domain::binary_tick;
    use rust_decimal_macros::dec;

    fn strategy() -> StructuralStrategy {
        StructuralStrategy::new(StructuralConfig {
            min_edge: dec!(0.01),
            ttl_ms: 1_000,
            confidence: dec!(0.99),
        })
    }

    #[test]
    fn applies_only_to_binary_books() {
        let s = strategy();
        assert!(s.applies_to(&binary_tick("pm", "m1", dec!(0.4), dec!(0.5))));
        assert!(!s.applies_to(&crate::testkit::domain::spot_tick("bn", "BTC", 1)));
    }

    #[test]
    fn detects_edge_net_of_fees() {
        let tick = binary_tick("pm", "m1", dec!(0.40), dec!(0.50));
        let fees = FeeModel::flat(dec!(0.02));
        let opps = context_for(&tick, &fees, |ctx| strategy().detect(ctx));

        assert_eq!(opps.len(), 1);
        let opp = &opps[0];
        assert_eq!(opp.edge(), dec!(0.08));
        assert_eq!(opp.profit_per_unit(), dec!(0.08));
        assert_eq!(opp.max_size(), dec!(100));
        assert_eq!(opp.legs().len(), 2);
        assert!(opp.legs().iter().all(|l| l.side == Side::Buy));
        assert_eq!(opp.confidence(), dec!(0.99));
    }

    #[test]
    fn edge_must_strictly_exceed_minimum() {
        // 1 - 0.99 = 0.01, equal to min_edge
        let tick = binary_tick("pm", "m1", dec!(0.49), dec!(0.50));
        let fees = FeeModel::default();
        assert!(context_for(&tick, &fees, |ctx| strategy().detect(ctx)).is_empty());
    }

    #[test]
    fn fees_can_erase_the_edge() {
        let tick = binary_tick("pm", "m1", dec!(0.45), dec!(0.50));
        let fees = FeeModel::flat(dec!(0.05));
        assert!(context_for(&tick, &fees, |ctx| strategy().detect(ctx)).is_empty());
    }

    #[test]
    fn missing_ask_yields_nothing() {
        let mut tick = binary_tick("pm", "m1", dec!(0.40), dec!(0.50));
        if let TickBook::Binary { no, .. } = &mut tick.book {
            no.ask = None;
        }
        let fees = FeeModel::default();
        assert!(context_for(&tick, &fees, |ctx| strategy().detect(ctx)).is_empty());
    }
}
