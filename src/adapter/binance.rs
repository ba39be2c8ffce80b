//! Binance spot `bookTicker` feed.
//!
//! Reference data only: ticks carry a spot quote whose asset is the
//! configured instrument symbol. The venue's order book update id is used as
//! the tick sequence.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adapter::socket::{self, Frame, WsStream};
use crate::app::{MarketConfig, VenueConfig};
use crate::domain::{AssetId, InstrumentId, Level, Quote, Tick, TickBook, VenueId};
use crate::error::{FeedError, Result};
use crate::exchange::{FeedEvent, MarketDataFeed};

#[derive(Debug, Serialize)]
struct SubscribeRequest {
    method: &'static str,
    params: Vec<String>,
    id: u64,
}

/// A `bookTicker` payload.
#[derive(Debug, Deserialize)]
struct BookTicker {
    #[serde(rename = "u")]
    update_id: u64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "b")]
    bid_price: String,
    #[serde(rename = "B")]
    bid_qty: String,
    #[serde(rename = "a")]
    ask_price: String,
    #[serde(rename = "A")]
    ask_qty: String,
}

/// Combined-stream wrapper: `{"stream":"btcusdt@bookTicker","data":{...}}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Payload {
    Combined { data: BookTicker },
    Raw(BookTicker),
    /// Subscription acks and anything else.
    Other(serde_json::Value),
}

fn level(price: &str, qty: &str) -> Option<Level> {
    let price: Decimal = price.parse().ok()?;
    let qty: Decimal = qty.parse().ok()?;
    (price > Decimal::ZERO && qty > Decimal::ZERO).then(|| Level::new(price, qty))
}

/// Market data feed for the Binance spot `bookTicker` stream.
pub struct BinanceFeed {
    venue: VenueId,
    url: String,
    ws: Option<WsStream>,
    /// Upper-case wire symbol to configured instrument.
    symbols: HashMap<String, InstrumentId>,
    last_update: HashMap<InstrumentId, u64>,
    next_request_id: u64,
    pending: VecDeque<FeedEvent>,
}

impl BinanceFeed {
    #[must_use]
    pub fn new<'a>(venue: &VenueConfig, markets: impl IntoIterator<Item = &'a MarketConfig>) -> Self {
        let symbols = markets
            .into_iter()
            .map(|m| (m.instrument.as_str().to_ascii_uppercase(), m.instrument.clone()))
            .collect();
        Self {
            venue: venue.id.clone(),
            url: venue.ws_url.clone(),
            ws: None,
            symbols,
            last_update: HashMap::new(),
            next_request_id: 1,
            pending: VecDeque::new(),
        }
    }

    pub(crate) fn decode(&mut self, text: &str, now: DateTime<Utc>) -> Option<FeedEvent> {
        let ticker = match serde_json::from_str::<Payload>(text) {
            Ok(Payload::Combined { data } | Payload::Raw(data)) => data,
            Ok(Payload::Other(value)) => {
                debug!(venue = %self.venue, message = %value, "Ignoring non-ticker message");
                return None;
            }
            Err(e) => {
                warn!(venue = %self.venue, error = %e, "Failed to parse message");
                return None;
            }
        };

        let instrument = self.symbols.get(&ticker.symbol.to_ascii_uppercase())?.clone();

        // The stream may replay the same update id; only strictly newer ones tick.
        let last = self.last_update.entry(instrument.clone()).or_insert(0);
        if ticker.update_id <= *last {
            return None;
        }
        *last = ticker.update_id;

        let quote = Quote::new(
            AssetId::new(instrument.as_str()),
            level(&ticker.bid_price, &ticker.bid_qty),
            level(&ticker.ask_price, &ticker.ask_qty),
        );
        Some(FeedEvent::Tick(Tick {
            venue: self.venue.clone(),
            instrument,
            book: TickBook::Spot(quote),
            venue_time: None,
            received_at: now,
            sequence: ticker.update_id,
            epoch: 0,
        }))
    }
}

#[async_trait]
impl MarketDataFeed for BinanceFeed {
    async fn connect(&mut self) -> Result<()> {
        self.last_update.clear();
        self.pending.clear();
        self.ws = Some(socket::connect(&self.url).await?);
        Ok(())
    }

    async fn subscribe(&mut self, instruments: &[InstrumentId]) -> Result<()> {
        let params: Vec<String> = instruments
            .iter()
            .map(|i| format!("{}@bookTicker", i.as_str().to_ascii_lowercase()))
            .collect();
        let request = SubscribeRequest {
            method: "SUBSCRIBE",
            params,
            id: self.next_request_id,
        };
        self.next_request_id += 1;

        let ws = self.ws.as_mut().ok_or_else(|| FeedError::NotConnected {
            venue: self.venue.clone(),
        })?;
        info!(venue = %self.venue, streams = ?request.params, "Subscribing to book tickers");
        socket::send_json(ws, &request).await
    }

    async fn next_event(&mut self) -> Option<FeedEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            let frame = {
                let ws = self.ws.as_mut()?;
                socket::next_frame(ws).await
            };
            match frame {
                Frame::Text(text) => {
                    if let Some(event) = self.decode(&text, Utc::now()) {
                        return Some(event);
                    }
                }
                Frame::Closed(reason) => {
                    self.ws = None;
                    return Some(FeedEvent::Disconnected { reason });
                }
            }
        }
    }

    fn venue(&self) -> &VenueId {
        &self.venue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::VenueKind;
    use crate::testkit::config::{spot_market, venue};
    use rust_decimal_macros::dec;

    fn feed() -> BinanceFeed {
        BinanceFeed::new(
            &venue("binance", VenueKind::Binance, false),
            [&spot_market("binance", "BTCUSDT")],
        )
    }

    const TICKER: &str = r#"{"u":400900217,"s":"BTCUSDT","b":"64000.10","B":"1.5","a":"64000.20","A":"0.7"}"#;

    #[test]
    fn book_ticker_becomes_spot_tick() {
        let mut feed = feed();
        let Some(FeedEvent::Tick(tick)) = feed.decode(TICKER, Utc::now()) else {
            panic!("expected tick");
        };

        assert_eq!(tick.instrument, InstrumentId::from("BTCUSDT"));
        assert_eq!(tick.sequence, 400_900_217);
        let TickBook::Spot(quote) = &tick.book else {
            panic!("expected spot book");
        };
        assert_eq!(quote.asset, AssetId::from("BTCUSDT"));
        assert_eq!(quote.bid, Some(Level::new(dec!(64000.10), dec!(1.5))));
        assert_eq!(quote.spread(), Some(dec!(0.10)));
    }

    #[test]
    fn combined_stream_payloads_are_unwrapped() {
        let mut feed = feed();
        let raw = format!(r#"{{"stream":"btcusdt@bookTicker","data":{TICKER}}}"#);
        assert!(matches!(feed.decode(&raw, Utc::now()), Some(FeedEvent::Tick(_))));
    }

    #[test]
    fn replayed_update_ids_are_dropped() {
        let mut feed = feed();
        let now = Utc::now();
        assert!(feed.decode(TICKER, now).is_some());
        assert!(feed.decode(TICKER, now).is_none());
    }

    #[test]
    fn acks_and_unknown_symbols_are_ignored() {
        let mut feed = feed();
        let now = Utc::now();
        assert!(feed.decode(r#"{"result":null,"id":1}"#, now).is_none());
        assert!(feed
            .decode(r#"{"u":1,"s":"ETHUSDT","b":"1","B":"1","a":"2","A":"1"}"#, now)
            .is_none());
    }
}
