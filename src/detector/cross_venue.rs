//! Cross-venue arbitrage: one instrument priced apart on two venues.

use std::collections::HashSet;

use chrono::Duration;
use rust_decimal::Decimal;
use tracing::trace;

use super::{DetectionContext, Strategy};
use crate::app::{CrossVenueConfig, PairConfig, QuoteRef};
use crate::domain::{
    Level, Opportunity, OpportunityLeg, Quote, Side, StrategyKind, Tick, VenueId,
};

/// Buys on the cheaper venue's ask and sells on the richer venue's bid.
///
/// `edge = (bid_sell − ask_buy) / min(ask_buy, bid_sell) − (fee_buy + fee_sell)`
///
/// Both venues of a pair must be tradable and healthy. A pair is keyed on
/// its `a` side for de-duplication whichever direction fires.
pub struct CrossVenueStrategy {
    config: CrossVenueConfig,
    tradable: HashSet<VenueId>,
}

impl CrossVenueStrategy {
    #[must_use]
    pub fn new(config: CrossVenueConfig, tradable: HashSet<VenueId>) -> Self {
        Self { config, tradable }
    }

    fn pair_matches(pair: &PairConfig, tick: &Tick) -> bool {
        let key = tick.key();
        pair.a.key() == key || pair.b.key() == key
    }

    fn detect_pair(&self, ctx: &DetectionContext<'_>, pair: &PairConfig) -> Option<Opportunity> {
        if !self.tradable.contains(&pair.a.venue) || !self.tradable.contains(&pair.b.venue) {
            return None;
        }
        if ctx.health.is_degraded(&pair.a.venue) || ctx.health.is_degraded(&pair.b.venue) {
            trace!(a = %pair.a.key(), b = %pair.b.key(), "Pair venue degraded");
            return None;
        }

        let quote_a = ctx.view.quote(&pair.a.key(), &pair.a.asset())?;
        let quote_b = ctx.view.quote(&pair.b.key(), &pair.b.asset())?;

        self.direction(ctx, pair, (&pair.a, quote_a), (&pair.b, quote_b))
            .or_else(|| self.direction(ctx, pair, (&pair.b, quote_b), (&pair.a, quote_a)))
    }

    fn direction(
        &self,
        ctx: &DetectionContext<'_>,
        pair: &PairConfig,
        (buy_ref, buy_quote): (&QuoteRef, &Quote),
        (sell_ref, sell_quote): (&QuoteRef, &Quote),
    ) -> Option<Opportunity> {
        let ask: Level = buy_quote.ask?;
        let bid: Level = sell_quote.bid?;
        let gap = bid.price - ask.price;
        if gap <= Decimal::ZERO {
            return None;
        }

        let floor = ask.price.min(bid.price);
        if floor <= Decimal::ZERO {
            return None;
        }
        let buy_fee = ctx.fees.rate(&buy_ref.venue);
        let sell_fee = ctx.fees.rate(&sell_ref.venue);
        let edge = gap / floor - (buy_fee + sell_fee);
        if edge <= self.config.min_edge {
            trace!(buy = %buy_ref.key(), sell = %sell_ref.key(), %edge, "Cross-venue edge below minimum");
            return None;
        }

        let profit = gap - buy_fee * ask.price - sell_fee * bid.price;
        let available = ask.size.min(bid.size);

        Opportunity::builder()
            .strategy(StrategyKind::CrossVenue)
            .key(pair.a.key())
            .leg(OpportunityLeg::new(
                buy_ref.venue.clone(),
                buy_ref.instrument.clone(),
                buy_ref.asset(),
                Side::Buy,
                ask.price,
                available,
            ))
            .leg(OpportunityLeg::new(
                sell_ref.venue.clone(),
                sell_ref.instrument.clone(),
                sell_ref.asset(),
                Side::Sell,
                bid.price,
                available,
            ))
            .edge(edge)
            .profit_per_unit(profit)
            .confidence(self.config.confidence)
            .discovered_at(ctx.now)
            .ttl(Duration::milliseconds(self.config.ttl_ms as i64))
            .build()
            .ok()
    }
}

impl Strategy for CrossVenueStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CrossVenue
    }

    fn applies_to(&self, tick: &Tick) -> bool {
        self.config
            .pairs
            .iter()
            .any(|pair| Self::pair_matches(pair, tick))
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<Opportunity> {
        self.config
            .pairs
            .iter()
            .filter(|pair| Self::pair_matches(pair, ctx.tick))
            .filter_map(|pair| self.detect_pair(ctx, pair))
            .collect()
    }
}
