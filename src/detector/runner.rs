//! Tick-driven detection loop body.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{DetectionContext, Deduplicator, MarketView, StrategyRegistry};
use crate::domain::{FeeModel, Opportunity, Tick, VenueId};
use crate::ingest::VenueHealth;

/// Runs the registry over each tick and drops duplicate opportunities.
///
/// Owned by the engine task; no interior locking.
pub struct Detector {
    registry: StrategyRegistry,
    view: MarketView,
    dedup: Deduplicator,
    fees: FeeModel,
}

impl Detector {
    #[must_use]
    pub fn new(registry: StrategyRegistry, fees: FeeModel, history_len: usize) -> Self {
        Self {
            registry,
            view: MarketView::new(history_len),
            dedup: Deduplicator::new(),
            fees,
        }
    }

    /// Apply a tick to the market view and return fresh opportunities.
    pub fn on_tick(
        &mut self,
        tick: &Tick,
        health: &VenueHealth,
        now: DateTime<Utc>,
    ) -> Vec<Opportunity> {
        self.view.update(tick);
        let ctx = DetectionContext {
            tick,
            view: &self.view,
            health,
            fees: &self.fees,
            now,
        };

        let found = self.registry.detect_all(&ctx);
        let mut fresh = Vec::with_capacity(found.len());
        for opp in found {
            if self.dedup.admit(&opp, now) {
                fresh.push(opp);
            } else {
                debug!(strategy = %opp.strategy(), key = %opp.key(), "Duplicate opportunity dropped");
            }
        }
        fresh
    }

    /// Forget everything seen from a venue, e.g. after a reconnect.
    pub fn clear_venue(&mut self, venue: &VenueId) {
        self.view.clear_venue(venue);
    }

    /// Drop expired de-duplication keys.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        self.dedup.prune(now)
    }

    #[must_use]
    pub fn view(&self) -> &MarketView {
        &self.view
    }

    #[must_use]
    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::StructuralConfig;
    use crate::detector::StructuralStrategy;
    use crate::testkit::domain::{binary_tick, binary_tick_at, key};
    use rust_decimal_macros::dec;

    fn detector() -> Detector {
        let mut registry = StrategyRegistry::new();
        registry.register(Box::new(StructuralStrategy::new(StructuralConfig::default())));
        Detector::new(registry, FeeModel::default(), 8)
    }

    fn healthy() -> VenueHealth {
        let mut health = VenueHealth::new();
        health.mark_healthy(&VenueId::from("pm"), Utc::now());
        health
    }

    #[test]
    fn repeated_edge_is_emitted_once_until_expiry() {
        let mut detector = detector();
        let health = healthy();
        let now = Utc::now();

        let first = detector.on_tick(&binary_tick_at("pm", "m1", 1, dec!(0.45), dec!(0.45)), &health, now);
        let second = detector.on_tick(&binary_tick_at("pm", "m1", 2, dec!(0.44), dec!(0.45)), &health, now);
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());

        let later = first[0].expires_at();
        assert_eq!(detector.prune(later), 1);
        let third = detector.on_tick(&binary_tick_at("pm", "m1", 3, dec!(0.44), dec!(0.45)), &health, later);
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn other_instruments_are_not_deduplicated() {
        let mut detector = detector();
        let health = healthy();
        let now = Utc::now();

        assert_eq!(detector.on_tick(&binary_tick("pm", "m1", dec!(0.45), dec!(0.45)), &health, now).len(), 1);
        assert_eq!(detector.on_tick(&binary_tick("pm", "m2", dec!(0.45), dec!(0.45)), &health, now).len(), 1);
    }

    #[test]
    fn clear_venue_forgets_latest_ticks() {
        let mut detector = detector();
        let health = healthy();
        detector.on_tick(&binary_tick("pm", "m1", dec!(0.6), dec!(0.6)), &health, Utc::now());
        assert!(detector.view().latest(&key("pm", "m1")).is_some());

        detector.clear_venue(&VenueId::from("pm"));
        assert!(detector.view().latest(&key("pm", "m1")).is_none());
    }
}
