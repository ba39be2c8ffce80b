//! Market data feed port.

use async_trait::async_trait;

use crate::domain::{AssetId, InstrumentId, Tick, VenueId};
use crate::error::Result;

/// Events produced by a market data feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A normalized top-of-book update.
    Tick(Tick),
    /// The feed (re)connected and opened a new epoch.
    Connected { epoch: u64 },
    /// The connection was lost.
    Disconnected { reason: String },
    /// The venue published the outcome of a binary market.
    Resolved {
        instrument: InstrumentId,
        winning_asset: AssetId,
    },
}

impl FeedEvent {
    /// Short name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Tick(_) => "tick",
            Self::Connected { .. } => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::Resolved { .. } => "resolved",
        }
    }
}

/// Streaming source of market data for one venue.
///
/// Implementations convert their wire format into [`FeedEvent`]s. A plain
/// implementation reports connection loss with `Disconnected` and then
/// yields `None`; wrap it in
/// [`ReconnectingFeed`](crate::ingest::ReconnectingFeed) to recover.
#[async_trait]
pub trait MarketDataFeed: Send {
    /// Open the connection.
    async fn connect(&mut self) -> Result<()>;

    /// Subscribe to updates for the given instruments.
    async fn subscribe(&mut self, instruments: &[InstrumentId]) -> Result<()>;

    /// Wait for the next event. `None` means the stream ended.
    async fn next_event(&mut self) -> Option<FeedEvent>;

    /// Venue this feed serves.
    fn venue(&self) -> &VenueId;
}
