//! Venue fee model.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;

use super::ids::VenueId;
use super::money::Price;

/// Taker fee rates, expressed as a fraction of notional.
///
/// Every edge the detector surfaces is computed net of these rates.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeeModel {
    /// Rate applied to venues without an explicit entry.
    #[serde(default)]
    pub default_rate: Decimal,
    /// Per-venue overrides.
    #[serde(default)]
    pub venues: HashMap<VenueId, Decimal>,
}

impl FeeModel {
    /// A model charging the same rate everywhere.
    #[must_use]
    pub fn flat(rate: Decimal) -> Self {
        Self {
            default_rate: rate,
            venues: HashMap::new(),
        }
    }

    /// Builder-style per-venue override.
    #[must_use]
    pub fn with_venue(mut self, venue: impl Into<VenueId>, rate: Decimal) -> Self {
        self.venues.insert(venue.into(), rate);
        self
    }

    /// Fee rate for a venue.
    #[must_use]
    pub fn rate(&self, venue: &VenueId) -> Decimal {
        self.venues.get(venue).copied().unwrap_or(self.default_rate)
    }

    /// Fee charged on a fill of `notional` at `venue`.
    #[must_use]
    pub fn fee(&self, venue: &VenueId, notional: Price) -> Price {
        notional.abs() * self.rate(venue)
    }

    /// Check every configured rate lies in [0, 1).
    pub fn validate(&self) -> Result<(), String> {
        let rates = std::iter::once(&self.default_rate).chain(self.venues.values());
        for rate in rates {
            if *rate < Decimal::ZERO || *rate >= Decimal::ONE {
                return Err(format!("fee rate {rate} outside [0, 1)"));
            }
        }
        Ok(())
    }
}
