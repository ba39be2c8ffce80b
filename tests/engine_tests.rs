//! The engine driven through real feed tasks and paper gateways.

mod support;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{mpsc, watch};

use plutus::adapter::PaperGateway;
use plutus::app::{Config, Engine, StatusWriter};
use plutus::domain::{AssetId, InstrumentId, VenueId};
use plutus::exchange::FeedEvent;
use plutus::ingest::{spawn_feed, ReconnectingFeed};
use plutus::testkit::config::two_venues;
use plutus::testkit::domain::binary_tick_at;
use plutus::testkit::feed::channel_feed;

use support::engine::ledger;

fn structural_only() -> Config {
    let mut config = two_venues();
    config.strategies.enabled = vec!["structural".into()];
    config
}

fn paper_engine(config: &Config, status: &std::path::Path) -> (Engine, Arc<PaperGateway>) {
    let pm = Arc::new(PaperGateway::new(VenueId::from("pm")));
    let engine = Engine::builder(config, ledger())
        .paper(Arc::clone(&pm))
        .paper(Arc::new(PaperGateway::new(VenueId::from("pm2"))))
        .status_writer(StatusWriter::new(status))
        .build()
        .unwrap();
    (engine, pm)
}

#[tokio::test]
async fn paper_trade_from_feed_to_settlement() {
    let dir = tempfile::tempdir().unwrap();
    let status = dir.path().join("status.json");
    let config = structural_only();
    let (engine, pm) = paper_engine(&config, &status);

    let (feed, handle) = channel_feed("pm", 16);
    let feed = ReconnectingFeed::new(feed, config.reconnection.clone());
    let (tx, rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let feed_task = spawn_feed(feed, vec![InstrumentId::from("m1")], tx, shutdown_rx.clone());
    let engine_task = tokio::spawn(engine.run(rx, shutdown_rx));

    handle
        .send(FeedEvent::Tick(binary_tick_at("pm", "m1", 1, dec!(0.45), dec!(0.50))))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle
        .send(FeedEvent::Resolved {
            instrument: InstrumentId::from("m1"),
            winning_asset: AssetId::from("m1-no"),
        })
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    shutdown_tx.send(true).unwrap();
    let snapshot = engine_task.await.unwrap().unwrap();
    feed_task.await.unwrap();

    assert_eq!(handle.connect_count(), 1);
    assert_eq!(handle.subscribed(), vec![InstrumentId::from("m1")]);
    assert_eq!(snapshot.counters.ticks, 1);
    assert_eq!(snapshot.counters.positions_opened, 1);
    assert_eq!(snapshot.counters.positions_closed, 1);
    assert_eq!(pm.resting(), 0);

    // bought YES + NO for 0.95 a pair; the pair pays 1
    assert!(snapshot.ledger.cumulative_pnl > Decimal::ZERO);
    assert_eq!(snapshot.ledger.open_notional, Decimal::ZERO);
    assert_eq!(snapshot.ledger.open_reservations, 0);

    let written = StatusWriter::read(&status).unwrap();
    assert_eq!(written.counters, snapshot.counters);
    assert_eq!(written.ledger.cash, snapshot.ledger.cash);
}

#[tokio::test]
async fn reconnect_resets_sequencing_for_the_venue() {
    let dir = tempfile::tempdir().unwrap();
    let status = dir.path().join("status.json");
    let config = structural_only();
    let (engine, _pm) = paper_engine(&config, &status);

    let (feed, handle) = channel_feed("pm", 16);
    let feed = ReconnectingFeed::new(feed, config.reconnection.clone());
    let (tx, rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let feed_task = spawn_feed(feed, vec![InstrumentId::from("m1")], tx, shutdown_rx.clone());
    let engine_task = tokio::spawn(engine.run(rx, shutdown_rx));

    // YES + NO at 1.02: no edge on offer
    handle
        .send(FeedEvent::Tick(binary_tick_at("pm", "m1", 5, dec!(0.50), dec!(0.52))))
        .await;
    // stream ends: the wrapper reports it and reconnects into epoch 2
    handle.close().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // sequence numbers restart with the new connection
    handle
        .send(FeedEvent::Tick(binary_tick_at("pm", "m1", 1, dec!(0.50), dec!(0.52))))
        .await;
    handle
        .send(FeedEvent::Tick(binary_tick_at("pm", "m1", 1, dec!(0.50), dec!(0.52))))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    shutdown_tx.send(true).unwrap();
    let snapshot = engine_task.await.unwrap().unwrap();
    feed_task.await.unwrap();

    assert_eq!(handle.connect_count(), 2);
    assert_eq!(snapshot.counters.ticks, 2);
    assert_eq!(snapshot.counters.dropped_ticks, 1);
    assert_eq!(snapshot.counters.positions_opened, 0);
    let pm = snapshot
        .venues
        .iter()
        .find(|report| report.venue.as_str() == "pm")
        .unwrap();
    assert!(pm.status.is_healthy());
}
