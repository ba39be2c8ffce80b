//! Spread capture on calm instruments.

use std::collections::HashSet;

use chrono::Duration;
use rust_decimal::Decimal;
use tracing::trace;

use super::{DetectionContext, Strategy};
use crate::app::SpreadCaptureConfig;
use crate::domain::{Opportunity, OpportunityLeg, Quote, Side, StrategyKind, Tick, VenueId};

/// Bids at the best bid and offers at the best ask of the widest quote.
///
/// `edge = (ask − bid) / mid − 2 × fee_rate`
///
/// Suppressed while the instrument's realized volatility is unknown or
/// above `max_volatility`, and while the configured reference instrument is
/// missing, degraded or above `reference_max_volatility`.
pub struct SpreadCaptureStrategy {
    config: SpreadCaptureConfig,
    tradable: HashSet<VenueId>,
}

impl SpreadCaptureStrategy {
    #[must_use]
    pub fn new(config: SpreadCaptureConfig, tradable: HashSet<VenueId>) -> Self {
        Self { config, tradable }
    }

    fn calm(&self, ctx: &DetectionContext<'_>) -> bool {
        let key = ctx.tick.key();
        match ctx.view.volatility(&key, self.config.min_samples) {
            Some(vol) if vol <= self.config.max_volatility => {}
            Some(vol) => {
                trace!(%key, %vol, "Instrument too volatile");
                return false;
            }
            None => return false,
        }

        let Some(reference) = &self.config.reference else {
            return true;
        };
        if ctx.health.is_degraded(&reference.venue) {
            trace!(reference = %reference.key(), "Reference venue degraded");
            return false;
        }
        match ctx.view.volatility(&reference.key(), self.config.min_samples) {
            Some(vol) if vol <= self.config.reference_max_volatility => true,
            Some(vol) => {
                trace!(reference = %reference.key(), %vol, "Reference too volatile");
                false
            }
            None => false,
        }
    }
}

/// Relative spread of a two-sided, uncrossed quote.
fn relative_spread(quote: &Quote) -> Option<Decimal> {
    if quote.is_crossed() {
        return None;
    }
    let mid = quote.mid()?;
    if mid <= Decimal::ZERO {
        return None;
    }
    Some(quote.spread()? / mid)
}

impl Strategy for SpreadCaptureStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SpreadCapture
    }

    fn applies_to(&self, tick: &Tick) -> bool {
        self.tradable.contains(&tick.venue)
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<Opportunity> {
        let Some((quote, spread)) = ctx
            .tick
            .book
            .quotes()
            .filter_map(|q| relative_spread(q).map(|s| (q, s)))
            .max_by(|a, b| a.1.cmp(&b.1))
        else {
            return Vec::new();
        };
        let (Some(bid), Some(ask)) = (quote.bid, quote.ask) else {
            return Vec::new();
        };

        let fee_rate = ctx.fees.rate(&ctx.tick.venue);
        let edge = spread - Decimal::TWO * fee_rate;
        if edge <= self.config.min_edge {
            return Vec::new();
        }
        if !self.calm(ctx) {
            return Vec::new();
        }

        let profit = (ask.price - bid.price) - fee_rate * (ask.price + bid.price);
        let available = bid.size.min(ask.size);
        let tick = ctx.tick;

        Opportunity::builder()
            .strategy(StrategyKind::SpreadCapture)
            .key(tick.key())
            .leg(OpportunityLeg::new(
                tick.venue.clone(),
                tick.instrument.clone(),
                quote.asset.clone(),
                Side::Buy,
                bid.price,
                available,
            ))
            .leg(OpportunityLeg::new(
                tick.venue.clone(),
                tick.instrument.clone(),
                quote.asset.clone(),
                Side::Sell,
                ask.price,
                available,
            ))
            .edge(edge)
            .profit_per_unit(profit)
            .confidence(self.config.confidence)
            .discovered_at(ctx.now)
            .ttl(Duration::milliseconds(self.config.ttl_ms as i64))
            .build()
            .ok()
            .into_iter()
            .collect()
    }
}
