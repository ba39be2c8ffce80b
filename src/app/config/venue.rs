//! Venue and market configuration.

use serde::Deserialize;

use crate::domain::{AssetId, InstrumentId, InstrumentKey, VenueId};

/// Supported venue adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueKind {
    /// CLOB prediction market (WebSocket book feed, REST orders).
    Polymarket,
    /// Spot exchange `bookTicker` stream, reference data only.
    Binance,
}

/// A venue the engine connects to.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    pub id: VenueId,
    pub kind: VenueKind,
    /// WebSocket URL of the market data feed.
    pub ws_url: String,
    /// REST base URL of the order API. Venues without one are reference-only.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Whether the engine may place orders here.
    #[serde(default = "default_tradable")]
    pub tradable: bool,
    /// Per-request timeout for REST calls (milliseconds).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_tradable() -> bool {
    true
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

/// An instrument to subscribe to.
///
/// Binary markets name their two outcome assets; spot instruments trade the
/// instrument symbol itself.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    pub venue: VenueId,
    pub instrument: InstrumentId,
    #[serde(default)]
    pub yes_asset: Option<AssetId>,
    #[serde(default)]
    pub no_asset: Option<AssetId>,
}

impl MarketConfig {
    #[must_use]
    pub fn key(&self) -> InstrumentKey {
        InstrumentKey::new(self.venue.clone(), self.instrument.clone())
    }

    /// True when both outcome assets are configured.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.yes_asset.is_some() && self.no_asset.is_some()
    }
}

/// Reference to one quote of one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuoteRef {
    pub venue: VenueId,
    pub instrument: InstrumentId,
    /// Asset whose quote to use; defaults to the instrument symbol.
    #[serde(default)]
    pub asset: Option<AssetId>,
}

impl QuoteRef {
    #[must_use]
    pub fn key(&self) -> InstrumentKey {
        InstrumentKey::new(self.venue.clone(), self.instrument.clone())
    }

    /// The asset to trade, falling back to the instrument id.
    #[must_use]
    pub fn asset(&self) -> AssetId {
        self.asset
            .clone()
            .unwrap_or_else(|| AssetId::new(self.instrument.as_str()))
    }
}
