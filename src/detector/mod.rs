//! Opportunity detection.
//!
//! Each strategy implements the [`Strategy`] trait:
//! - `kind()` - tag used in configuration, logs and de-duplication
//! - `applies_to()` - whether the strategy runs for a tick
//! - `detect()` - core detection logic
//!
//! The [`StrategyRegistry`] holds the enabled strategies. The [`Detector`]
//! feeds every accepted tick through the registry and de-duplicates the
//! result.
//!
//! - **Structural**: YES + NO asks below the $1 payout
//! - **CrossVenue**: the same instrument priced apart on two venues
//! - **SpreadCapture**: wide quoted spread on a calm instrument

mod cross_venue;
mod dedup;
mod runner;
mod spread_capture;
mod structural;
mod view;

pub use cross_venue::CrossVenueStrategy;
pub use dedup::Deduplicator;
pub use runner::Detector;
pub use spread_capture::SpreadCaptureStrategy;
pub use structural::StructuralStrategy;
pub use view::MarketView;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::app::Config;
use crate::domain::{FeeModel, Opportunity, StrategyKind, Tick, VenueId};
use crate::error::Result;
use crate::ingest::VenueHealth;

/// Everything a strategy sees when a tick arrives.
#[derive(Clone, Copy)]
pub struct DetectionContext<'a> {
    /// The tick that triggered detection. Already applied to `view`.
    pub tick: &'a Tick,
    pub view: &'a MarketView,
    pub health: &'a VenueHealth,
    pub fees: &'a FeeModel,
    pub now: DateTime<Utc>,
}

/// A detection strategy.
///
/// Strategies are pure: given the same context they return the same
/// opportunities (apart from generated ids).
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Check if this strategy should run for a tick.
    fn applies_to(&self, tick: &Tick) -> bool;

    /// Detect opportunities given current market state.
    ///
    /// Returned opportunities carry edges net of fees.
    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<Opportunity>;
}

/// Registry of enabled strategies.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the strategies listed in `strategies.enabled`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown strategy name.
    #[allow(clippy::result_large_err)]
    pub fn from_config(config: &Config) -> Result<Self> {
        let tradable: HashSet<VenueId> = config
            .venues
            .iter()
            .filter(|v| v.tradable)
            .map(|v| v.id.clone())
            .collect();

        let mut registry = Self::new();
        for kind in config.enabled_strategies()? {
            let strategy: Box<dyn Strategy> = match kind {
                StrategyKind::Structural => Box::new(StructuralStrategy::new(
                    config.strategies.structural.clone(),
                )),
                StrategyKind::CrossVenue => Box::new(CrossVenueStrategy::new(
                    config.strategies.cross_venue.clone(),
                    tradable.clone(),
                )),
                StrategyKind::SpreadCapture => Box::new(SpreadCaptureStrategy::new(
                    config.strategies.spread_capture.clone(),
                    tradable.clone(),
                )),
            };
            info!(strategy = %kind, "Strategy enabled");
            registry.register(strategy);
        }
        Ok(registry)
    }

    /// Register a strategy. Strategies run in registration order.
    pub fn register(&mut self, strategy: Box<dyn Strategy>) {
        self.strategies.push(strategy);
    }

    #[must_use]
    pub fn strategies(&self) -> &[Box<dyn Strategy>] {
        &self.strategies
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Run all applicable strategies and collect opportunities.
    pub fn detect_all(&self, ctx: &DetectionContext<'_>) -> Vec<Opportunity> {
        self.strategies
            .iter()
            .filter(|s| s.applies_to(ctx.tick))
            .flat_map(|s| s.detect(ctx))
            .collect()
    }
}
