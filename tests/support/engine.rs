//! Engine harness: scripted gateways, an in-memory ledger, direct event
//! delivery.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal_macros::dec;

use plutus::app::{Config, Engine};
use plutus::domain::{Tick, VenueId};
use plutus::exchange::FeedEvent;
use plutus::ingest::VenueEvent;
use plutus::ledger::Ledger;
use plutus::testkit::gateway::ScriptedGateway;

pub fn ledger() -> Arc<Ledger> {
    Arc::new(Ledger::new(dec!(1000), dec!(100), Utc::now()).unwrap())
}

/// Engine over `config` whose tradable venues fill everything.
pub fn engine(config: &Config) -> Engine {
    let mut builder = Engine::builder(config, ledger());
    for venue in config.venues.iter().filter(|v| v.tradable) {
        builder = builder.gateway(Arc::new(ScriptedGateway::new(venue.id.as_str())));
    }
    builder.build().unwrap()
}

pub fn event(venue: &str, event: FeedEvent) -> VenueEvent {
    VenueEvent {
        venue: VenueId::from(venue),
        event,
    }
}

pub fn connect(engine: &mut Engine, venue: &str, epoch: u64) {
    engine
        .handle_event(event(venue, FeedEvent::Connected { epoch }), Utc::now())
        .unwrap();
}

pub fn disconnect(engine: &mut Engine, venue: &str) {
    engine
        .handle_event(
            event(venue, FeedEvent::Disconnected { reason: "reset by peer".into() }),
            Utc::now(),
        )
        .unwrap();
}

pub fn deliver(engine: &mut Engine, tick: Tick) {
    let venue = tick.venue.as_str().to_string();
    engine
        .handle_event(event(&venue, FeedEvent::Tick(tick)), Utc::now())
        .unwrap();
}
