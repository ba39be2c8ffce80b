//! Polymarket market channel feed.
//!
//! Keeps a price ladder per outcome asset and emits a binary [`Tick`] for the
//! owning market whenever either outcome's book changes, once both outcomes
//! have been seen.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::message::{
    parse_timestamp, BookMessage, MarketResolvedMessage, PriceChangeMessage, SubscribeMessage,
    TaggedMessage, WsMessage,
};
use crate::adapter::socket::{self, Frame, WsStream};
use crate::app::{MarketConfig, VenueConfig};
use crate::domain::{AssetId, InstrumentId, Level, Outcome, Quote, Side, Tick, TickBook, VenueId};
use crate::error::{FeedError, Result};
use crate::exchange::{FeedEvent, MarketDataFeed};

/// Price ladder for one outcome asset.
#[derive(Debug, Default)]
struct Ladder {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
}

impl Ladder {
    fn replace(&mut self, book: &BookMessage) {
        self.bids = book
            .bids
            .iter()
            .filter_map(|l| l.level())
            .filter(|l| l.size > Decimal::ZERO)
            .map(|l| (l.price, l.size))
            .collect();
        self.asks = book
            .asks
            .iter()
            .filter_map(|l| l.level())
            .filter(|l| l.size > Decimal::ZERO)
            .map(|l| (l.price, l.size))
            .collect();
    }

    fn set(&mut self, side: Side, level: Level) {
        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        if level.size.is_zero() {
            levels.remove(&level.price);
        } else {
            levels.insert(level.price, level.size);
        }
    }

    fn quote(&self, asset: &AssetId) -> Quote {
        let bid = self.bids.iter().next_back().map(|(p, s)| Level::new(*p, *s));
        let ask = self.asks.iter().next().map(|(p, s)| Level::new(*p, *s));
        Quote::new(asset.clone(), bid, ask)
    }
}

#[derive(Debug)]
struct Market {
    yes: AssetId,
    no: AssetId,
    yes_book: Option<Ladder>,
    no_book: Option<Ladder>,
}

impl Market {
    fn ladder_mut(&mut self, outcome: Outcome) -> &mut Option<Ladder> {
        match outcome {
            Outcome::Yes => &mut self.yes_book,
            Outcome::No => &mut self.no_book,
        }
    }

    fn book(&self) -> Option<TickBook> {
        let yes = self.yes_book.as_ref()?.quote(&self.yes);
        let no = self.no_book.as_ref()?.quote(&self.no);
        Some(TickBook::Binary { yes, no })
    }
}

/// Market data feed for the Polymarket CLOB market channel.
pub struct PolymarketFeed {
    venue: VenueId,
    url: String,
    ws: Option<WsStream>,
    /// Outcome asset to owning market.
    assets: HashMap<AssetId, (InstrumentId, Outcome)>,
    markets: HashMap<InstrumentId, Market>,
    sequences: HashMap<InstrumentId, u64>,
    pending: VecDeque<FeedEvent>,
}

impl PolymarketFeed {
    /// Build a feed for `venue` covering the binary `markets` configured on it.
    #[must_use]
    pub fn new<'a>(venue: &VenueConfig, markets: impl IntoIterator<Item = &'a MarketConfig>) -> Self {
        let mut assets = HashMap::new();
        let mut books = HashMap::new();
        for market in markets {
            let (Some(yes), Some(no)) = (&market.yes_asset, &market.no_asset) else {
                warn!(market = %market.key(), "Skipping market without outcome assets");
                continue;
            };
            assets.insert(yes.clone(), (market.instrument.clone(), Outcome::Yes));
            assets.insert(no.clone(), (market.instrument.clone(), Outcome::No));
            books.insert(
                market.instrument.clone(),
                Market {
                    yes: yes.clone(),
                    no: no.clone(),
                    yes_book: None,
                    no_book: None,
                },
            );
        }

        Self {
            venue: venue.id.clone(),
            url: venue.ws_url.clone(),
            ws: None,
            assets,
            markets: books,
            sequences: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    /// Decode one text frame into feed events.
    pub(crate) fn decode(&mut self, text: &str, now: DateTime<Utc>) -> Vec<FeedEvent> {
        let messages = match serde_json::from_str::<WsMessage>(text) {
            Ok(message) => message.into_messages(),
            Err(e) => {
                warn!(venue = %self.venue, error = %e, bytes = text.len(), "Failed to parse message");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        for message in messages {
            match message {
                TaggedMessage::Book(book) => events.extend(self.on_book(&book, now)),
                TaggedMessage::PriceChange(change) => events.extend(self.on_price_change(&change, now)),
                TaggedMessage::MarketResolved(resolved) => events.extend(self.on_resolved(&resolved)),
                TaggedMessage::Unknown => {}
            }
        }
        events
    }

    fn on_book(&mut self, book: &BookMessage, now: DateTime<Utc>) -> Option<FeedEvent> {
        let asset = AssetId::new(book.asset_id.as_str());
        let (instrument, outcome) = self.assets.get(&asset)?.clone();
        let market = self.markets.get_mut(&instrument)?;
        market
            .ladder_mut(outcome)
            .get_or_insert_with(Ladder::default)
            .replace(book);
        self.emit(&instrument, parse_timestamp(book.timestamp.as_deref()), now)
    }

    fn on_price_change(&mut self, message: &PriceChangeMessage, now: DateTime<Utc>) -> Vec<FeedEvent> {
        let mut touched: Vec<InstrumentId> = Vec::new();
        for change in &message.changes {
            let Some(asset) = change.asset_id.as_ref().or(message.asset_id.as_ref()) else {
                continue;
            };
            let Some((instrument, outcome)) = self.assets.get(&AssetId::new(asset.as_str())).cloned()
            else {
                continue;
            };
            let (Some(side), Some(level)) = (change.book_side(), change.level()) else {
                debug!(venue = %self.venue, asset = %asset, "Skipping malformed price change");
                continue;
            };
            let Some(market) = self.markets.get_mut(&instrument) else {
                continue;
            };
            // Deltas before the first snapshot have nothing to apply to.
            let Some(ladder) = market.ladder_mut(outcome).as_mut() else {
                continue;
            };
            ladder.set(side, level);
            if !touched.contains(&instrument) {
                touched.push(instrument);
            }
        }

        let venue_time = parse_timestamp(message.timestamp.as_deref());
        touched
            .iter()
            .filter_map(|instrument| self.emit(instrument, venue_time, now))
            .collect()
    }

    fn on_resolved(&self, message: &MarketResolvedMessage) -> Option<FeedEvent> {
        let winning_asset = AssetId::new(message.winning_asset_id.as_str());
        let instrument = match self.assets.get(&winning_asset) {
            Some((instrument, _)) => instrument.clone(),
            None => {
                let market = message.market.as_deref()?;
                let instrument = InstrumentId::new(market);
                if !self.markets.contains_key(&instrument) {
                    return None;
                }
                instrument
            }
        };
        info!(
            venue = %self.venue,
            %instrument,
            winner = %winning_asset,
            outcome = ?message.winning_outcome,
            "Market resolved"
        );
        Some(FeedEvent::Resolved {
            instrument,
            winning_asset,
        })
    }

    fn emit(
        &mut self,
        instrument: &InstrumentId,
        venue_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<FeedEvent> {
        let book = self.markets.get(instrument)?.book()?;
        let last = self.sequences.get(instrument).copied();
        let sequence = venue_sequence(last, venue_time);
        self.sequences
            .insert(instrument.clone(), last.map_or(sequence, |l| l.max(sequence)));
        Some(FeedEvent::Tick(Tick {
            venue: self.venue.clone(),
            instrument: instrument.clone(),
            book,
            venue_time,
            received_at: now,
            sequence,
            epoch: 0,
        }))
    }

    /// Drop all book state; a new connection starts from fresh snapshots.
    fn reset(&mut self) {
        for market in self.markets.values_mut() {
            market.yes_book = None;
            market.no_book = None;
        }
        self.sequences.clear();
        self.pending.clear();
    }
}

/// Sequence slots per venue millisecond.
const SLOTS_PER_MS: u64 = 1_000;

/// Sequence number for an update stamped `venue_time`.
///
/// The venue timestamp in milliseconds sets the high digits, so an update
/// stamped earlier than the last one gets a lower number and is dropped by
/// the sequencer. Updates sharing a millisecond take consecutive slots.
/// Unstamped updates continue from `last`.
fn venue_sequence(last: Option<u64>, venue_time: Option<DateTime<Utc>>) -> u64 {
    let base = venue_time
        .and_then(|t| u64::try_from(t.timestamp_millis()).ok())
        .map(|ms| ms.saturating_mul(SLOTS_PER_MS));
    match (base, last) {
        (None, last) => last.map_or(1, |l| l + 1),
        (Some(base), Some(last)) if last >= base && last < base.saturating_add(SLOTS_PER_MS - 1) => {
            last + 1
        }
        (Some(base), _) => base,
    }
}

#[async_trait]
impl MarketDataFeed for PolymarketFeed {
    async fn connect(&mut self) -> Result<()> {
        self.reset();
        self.ws = Some(socket::connect(&self.url).await?);
        Ok(())
    }

    async fn subscribe(&mut self, instruments: &[InstrumentId]) -> Result<()> {
        let mut asset_ids = Vec::with_capacity(instruments.len() * 2);
        for instrument in instruments {
            match self.markets.get(instrument) {
                Some(market) => {
                    asset_ids.push(market.yes.to_string());
                    asset_ids.push(market.no.to_string());
                }
                None => warn!(venue = %self.venue, %instrument, "Not a configured market, skipping"),
            }
        }

        let ws = self.ws.as_mut().ok_or_else(|| FeedError::NotConnected {
            venue: self.venue.clone(),
        })?;
        info!(venue = %self.venue, assets = asset_ids.len(), "Subscribing to assets");
        socket::send_json(ws, &SubscribeMessage::new(asset_ids)).await
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
                    let events = self.decode(&text, Utc::now());
                    self.pending.extend(events);
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
