//! Polymarket market channel message types.
//!
//! Frames arrive either as a JSON array of book snapshots or as a single
//! object tagged with `event_type`:
//!
//! ```json
//! [{"event_type":"book","market":"0x...","asset_id":"123...","timestamp":"1700000000000","bids":[{"price":"0.48","size":"30"}],"asks":[...]}]
//! ```
//!
//! Prices and sizes are decimal strings.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Level, Side};

/// Subscription request for the market channel.
#[derive(Debug, Serialize)]
pub struct SubscribeMessage {
    pub assets_ids: Vec<String>,
    #[serde(rename = "type")]
    pub msg_type: String,
}

impl SubscribeMessage {
    #[must_use]
    pub fn new(asset_ids: Vec<String>) -> Self {
        Self {
            assets_ids: asset_ids,
            msg_type: "market".into(),
        }
    }
}

/// One frame from the market channel.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WsMessage {
    Many(Vec<TaggedMessage>),
    One(TaggedMessage),
}

impl WsMessage {
    #[must_use]
    pub fn into_messages(self) -> Vec<TaggedMessage> {
        match self {
            Self::Many(messages) => messages,
            Self::One(message) => vec![message],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event_type")]
pub enum TaggedMessage {
    #[serde(rename = "book")]
    Book(BookMessage),

    #[serde(rename = "price_change")]
    PriceChange(PriceChangeMessage),

    #[serde(rename = "market_resolved")]
    MarketResolved(MarketResolvedMessage),

    #[serde(other)]
    Unknown,
}

/// Full book snapshot for one asset.
#[derive(Debug, Deserialize)]
pub struct BookMessage {
    pub asset_id: String,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default, alias = "buys")]
    pub bids: Vec<WsPriceLevel>,
    #[serde(default, alias = "sells")]
    pub asks: Vec<WsPriceLevel>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Incremental level updates. Each change may name its own asset; otherwise
/// the message-level `asset_id` applies.
#[derive(Debug, Deserialize)]
pub struct PriceChangeMessage {
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default, alias = "price_changes")]
    pub changes: Vec<PriceChange>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PriceChange {
    #[serde(default)]
    pub asset_id: Option<String>,
    pub price: String,
    pub size: String,
    pub side: String,
}

impl PriceChange {
    /// Book side the change applies to: `BUY` updates bids, `SELL` asks.
    #[must_use]
    pub fn book_side(&self) -> Option<Side> {
        match self.side.to_ascii_uppercase().as_str() {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }

    #[must_use]
    pub fn level(&self) -> Option<Level> {
        parse_level(&self.price, &self.size)
    }
}

/// Settlement notice for a binary market.
#[derive(Debug, Deserialize)]
pub struct MarketResolvedMessage {
    #[serde(default)]
    pub market: Option<String>,
    pub winning_asset_id: String,
    #[serde(default)]
    pub winning_outcome: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Price level as sent on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct WsPriceLevel {
    pub price: String,
    pub size: String,
}

impl WsPriceLevel {
    #[must_use]
    pub fn level(&self) -> Option<Level> {
        parse_level(&self.price, &self.size)
    }
}

fn parse_level(price: &str, size: &str) -> Option<Level> {
    let price: Decimal = price.parse().ok()?;
    let size: Decimal = size.parse().ok()?;
    (price >= Decimal::ZERO && size >= Decimal::ZERO).then(|| Level::new(price, size))
}

/// Millisecond epoch timestamp string.
#[must_use]
pub fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let millis: i64 = raw?.parse().ok()?;
    DateTime::from_timestamp_millis(millis)
}
