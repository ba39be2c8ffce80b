//! Builders for domain primitives used across tests.
//!
//! Binary ticks use asset ids `{instrument}-yes` / `{instrument}-no`, bids one
//! cent under the ask, and 100 units on every level. All ticks start in
//! epoch 1.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::{
    InstrumentId, InstrumentKey, Level, Opportunity, OpportunityLeg, Price, Quote, Side,
    StrategyKind, Tick, TickBook, VenueId,
};

const DEPTH: Decimal = dec!(100);
const TICK_SIZE: Decimal = dec!(0.01);

pub fn key(venue: &str, instrument: &str) -> InstrumentKey {
    InstrumentKey::new(VenueId::from(venue), InstrumentId::from(instrument))
}

/// A quote with `DEPTH` on both sides.
pub fn quote(asset: &str, bid: Price, ask: Price) -> Quote {
    Quote::new(
        asset,
        Some(Level::new(bid, DEPTH)),
        Some(Level::new(ask, DEPTH)),
    )
}

pub fn tick(venue: &str, instrument: &str, seq: u64, book: TickBook) -> Tick {
    Tick {
        venue: VenueId::from(venue),
        instrument: InstrumentId::from(instrument),
        book,
        venue_time: None,
        received_at: Utc::now(),
        sequence: seq,
        epoch: 1,
    }
}

/// Binary tick with the given YES and NO asks, sequence 1.
pub fn binary_tick(venue: &str, instrument: &str, yes_ask: Price, no_ask: Price) -> Tick {
    binary_tick_at(venue, instrument, 1, yes_ask, no_ask)
}

pub fn binary_tick_at(
    venue: &str,
    instrument: &str,
    seq: u64,
    yes_ask: Price,
    no_ask: Price,
) -> Tick {
    let book = TickBook::Binary {
        yes: quote(&format!("{instrument}-yes"), yes_ask - TICK_SIZE, yes_ask),
        no: quote(&format!("{instrument}-no"), no_ask - TICK_SIZE, no_ask),
    };
    tick(venue, instrument, seq, book)
}

/// Spot tick quoting 100.00 / 100.10.
pub fn spot_tick(venue: &str, symbol: &str, seq: u64) -> Tick {
    spot_tick_with(venue, symbol, seq, dec!(100.00), dec!(100.10))
}

pub fn spot_tick_with(venue: &str, symbol: &str, seq: u64, bid: Price, ask: Price) -> Tick {
    tick(venue, symbol, seq, TickBook::Spot(quote(symbol, bid, ask)))
}

/// Structural opportunity buying YES and NO of `pm:m1`.
pub fn structural_opportunity(yes_ask: Price, no_ask: Price, available: Decimal) -> Opportunity {
    let edge = Decimal::ONE - yes_ask - no_ask;
    Opportunity::builder()
        .strategy(StrategyKind::Structural)
        .key(key("pm", "m1"))
        .leg(OpportunityLeg::new("pm", "m1", "m1-yes", Side::Buy, yes_ask, available))
        .leg(OpportunityLeg::new("pm", "m1", "m1-no", Side::Buy, no_ask, available))
        .edge(edge)
        .profit_per_unit(edge)
        .ttl(Duration::seconds(30))
        .build()
        .expect("valid structural opportunity")
}
