//! Latest ticks and mid-price history per instrument.

use std::collections::{HashMap, VecDeque};

use rust_decimal::{Decimal, MathematicalOps};

use crate::domain::{AssetId, InstrumentKey, Price, Quote, Tick, VenueId};

/// The detector's picture of the market.
///
/// Holds the latest tick per instrument and a bounded ring buffer of
/// reference mids used for realized volatility.
#[derive(Debug)]
pub struct MarketView {
    capacity: usize,
    latest: HashMap<InstrumentKey, Tick>,
    mids: HashMap<InstrumentKey, VecDeque<Price>>,
}

impl MarketView {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(2),
            latest: HashMap::new(),
            mids: HashMap::new(),
        }
    }

    pub fn update(&mut self, tick: &Tick) {
        let key = tick.key();
        if let Some(mid) = tick.book.reference_mid() {
            let history = self.mids.entry(key.clone()).or_default();
            if history.len() == self.capacity {
                history.pop_front();
            }
            history.push_back(mid);
        }
        self.latest.insert(key, tick.clone());
    }

    #[must_use]
    pub fn latest(&self, key: &InstrumentKey) -> Option<&Tick> {
        self.latest.get(key)
    }

    /// Latest quote for one asset of an instrument.
    #[must_use]
    pub fn quote(&self, key: &InstrumentKey, asset: &AssetId) -> Option<&Quote> {
        self.latest(key)?.book.quote_for(asset)
    }

    /// Number of mids recorded for an instrument.
    #[must_use]
    pub fn samples(&self, key: &InstrumentKey) -> usize {
        self.mids.get(key).map_or(0, VecDeque::len)
    }

    /// Sample standard deviation of simple mid-to-mid returns.
    ///
    /// `None` until at least `min_samples` mids (and never fewer than three)
    /// have been recorded.
    #[must_use]
    pub fn volatility(&self, key: &InstrumentKey, min_samples: usize) -> Option<Decimal> {
        let history = self.mids.get(key)?;
        if history.len() < min_samples.max(3) {
            return None;
        }

        let returns: Vec<Decimal> = history
            .iter()
            .zip(history.iter().skip(1))
            .filter(|(prev, _)| !prev.is_zero())
            .map(|(prev, next)| next / prev - Decimal::ONE)
            .collect();
        if returns.len() < 2 {
            return None;
        }

        let n = Decimal::from(returns.len());
        let mean = returns.iter().sum::<Decimal>() / n;
        let variance = returns
            .iter()
            .map(|r| (r - mean) * (r - mean))
            .sum::<Decimal>()
            / (n - Decimal::ONE);
        variance.sqrt()
    }

    /// Forget everything seen from a venue, e.g. after it reconnects.
    pub fn clear_venue(&mut self, venue: &VenueId) {
        self.latest.retain(|key, _| &key.venue != venue);
        self.mids.retain(|key, _| &key.venue != venue);
    }
}
