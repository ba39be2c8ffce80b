//! Normalized top-of-book ticks.
//!
//! Every feed adapter converts its wire format into a [`Tick`]. A tick is the
//! only market-data shape the detector ever sees.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{AssetId, InstrumentId, VenueId};
use super::money::{Price, Volume};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side that flattens a fill on this side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Cash sign of a fill on this side: buying spends, selling receives.
    #[must_use]
    pub fn cash_sign(self) -> Decimal {
        match self {
            Self::Buy => Decimal::NEGATIVE_ONE,
            Self::Sell => Decimal::ONE,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Outcome of a binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Yes,
    No,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
        }
    }
}

/// A single price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub price: Price,
    pub size: Volume,
}

impl Level {
    #[must_use]
    pub const fn new(price: Price, size: Volume) -> Self {
        Self { price, size }
    }
}

/// Best bid and ask for one tradable asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub asset: AssetId,
    pub bid: Option<Level>,
    pub ask: Option<Level>,
}

impl Quote {
    pub fn new(asset: impl Into<AssetId>, bid: Option<Level>, ask: Option<Level>) -> Self {
        Self {
            asset: asset.into(),
            bid,
            ask,
        }
    }

    /// Midpoint of the best bid and ask, if both sides are present.
    #[must_use]
    pub fn mid(&self) -> Option<Price> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::TWO),
            _ => None,
        }
    }

    /// Quoted spread (ask - bid), if both sides are present.
    #[must_use]
    pub fn spread(&self) -> Option<Price> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// True when the book is crossed or locked.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        matches!(self.spread(), Some(s) if s <= Decimal::ZERO)
    }

    /// The level an order on `side` would execute against.
    #[must_use]
    pub fn touch(&self, side: Side) -> Option<Level> {
        match side {
            Side::Buy => self.ask,
            Side::Sell => self.bid,
        }
    }
}

/// Book content carried by a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickBook {
    /// Binary prediction market: one quote per outcome.
    Binary { yes: Quote, no: Quote },
    /// Spot instrument.
    Spot(Quote),
}

impl TickBook {
    /// All quotes in this book.
    pub fn quotes(&self) -> impl Iterator<Item = &Quote> {
        let (first, second) = match self {
            Self::Binary { yes, no } => (yes, Some(no)),
            Self::Spot(quote) => (quote, None),
        };
        std::iter::once(first).chain(second)
    }

    /// Find the quote for a given asset.
    #[must_use]
    pub fn quote_for(&self, asset: &AssetId) -> Option<&Quote> {
        self.quotes().find(|q| &q.asset == asset)
    }

    /// Reference price used for indicators: the YES mid for binary books,
    /// the mid for spot books.
    #[must_use]
    pub fn reference_mid(&self) -> Option<Price> {
        match self {
            Self::Binary { yes, .. } => yes.mid(),
            Self::Spot(quote) => quote.mid(),
        }
    }

    /// Outcome of an asset in a binary book.
    #[must_use]
    pub fn outcome_of(&self, asset: &AssetId) -> Option<Outcome> {
        match self {
            Self::Binary { yes, .. } if &yes.asset == asset => Some(Outcome::Yes),
            Self::Binary { no, .. } if &no.asset == asset => Some(Outcome::No),
            _ => None,
        }
    }
}

/// A normalized top-of-book update for one instrument on one venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub venue: VenueId,
    pub instrument: InstrumentId,
    pub book: TickBook,
    /// Server timestamp, when the venue sends one.
    pub venue_time: Option<DateTime<Utc>>,
    /// Local receipt timestamp.
    pub received_at: DateTime<Utc>,
    /// Per-instrument sequence number, strictly increasing within an epoch.
    pub sequence: u64,
    /// Connection epoch of the feed that produced this tick.
    pub epoch: u64,
}

impl Tick {
    /// Event time: the venue timestamp, falling back to receipt time.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.venue_time.unwrap_or(self.received_at)
    }

    /// Key identifying the instrument across venues.
    #[must_use]
    pub fn key(&self) -> InstrumentKey {
        InstrumentKey::new(self.venue.clone(), self.instrument.clone())
    }
}

/// A (venue, instrument) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrumentKey {
    pub venue: VenueId,
    pub instrument: InstrumentId,
}

impl InstrumentKey {
    #[must_use]
    pub fn new(venue: VenueId, instrument: InstrumentId) -> Self {
        Self { venue, instrument }
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.venue, self.instrument)
    }
}
