//! Detection contexts for strategy tests.

use chrono::{DateTime, Utc};

use crate::detector::{DetectionContext, MarketView};
use crate::domain::{FeeModel, Tick};
use crate::ingest::VenueHealth;

/// A market view plus venue health. Every pushed tick marks its venue
/// healthy.
pub struct DetectionFixture {
    pub view: MarketView,
    pub health: VenueHealth,
    pub fees: FeeModel,
    pub now: DateTime<Utc>,
}

impl DetectionFixture {
    pub fn new(fees: FeeModel) -> Self {
        Self {
            view: MarketView::new(32),
            health: VenueHealth::new(),
            fees,
            now: Utc::now(),
        }
    }

    pub fn push(&mut self, tick: &Tick) {
        self.health.mark_healthy(&tick.venue, tick.received_at);
        self.view.update(tick);
    }

    pub fn context<'a>(&'a self, tick: &'a Tick) -> DetectionContext<'a> {
        DetectionContext {
            tick,
            view: &self.view,
            health: &self.health,
            fees: &self.fees,
            now: self.now,
        }
    }
}

/// Run `f` against a fixture holding only `tick`.
pub fn context_for<T>(
    tick: &Tick,
    fees: &FeeModel,
    f: impl FnOnce(&DetectionContext<'_>) -> T,
) -> T {
    let mut fx = DetectionFixture::new(fees.clone());
    fx.push(tick);
    f(&fx.context(tick))
}
