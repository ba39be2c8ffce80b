//! Wiring: builds feeds, gateways, the ledger and the engine from config.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::config::{Config, VenueConfig, VenueKind};
use super::engine::{Engine, EngineBuilder};
use super::status::{StatusSnapshot, StatusWriter};
use crate::adapter::{BinanceFeed, ClobGateway, PaperGateway, PolymarketFeed, SqliteAuditSink};
use crate::domain::InstrumentId;
use crate::error::{ConfigError, Result};
use crate::ingest::{spawn_feed, ReconnectingFeed, VenueEvent};
use crate::ledger::Ledger;

/// Main application entry point.
pub struct App;

impl App {
    /// Run until `shutdown` flips to `true` or the engine halts.
    ///
    /// # Errors
    /// Returns an error if wiring fails or the ledger halts.
    pub async fn run(config: Config, shutdown: watch::Receiver<bool>) -> Result<StatusSnapshot> {
        info!(
            venues = config.venues.len(),
            markets = config.markets.len(),
            dry_run = config.dry_run,
            "plutus starting"
        );

        let ledger = Arc::new(open_ledger(&config)?);
        let builder = Engine::builder(&config, Arc::clone(&ledger))
            .status_writer(StatusWriter::new(&config.engine.status_file));
        let engine = attach_gateways(&config, builder)?.build()?;

        let (feed_tx, feed_rx) = mpsc::channel(config.engine.channel_capacity);
        let feeds = spawn_feeds(&config, &feed_tx, &shutdown);
        drop(feed_tx);

        let result = engine.run(feed_rx, shutdown).await;

        // Feed tasks stop on shutdown; after a halt they may still be
        // waiting on a socket.
        for handle in feeds {
            handle.abort();
        }
        result
    }
}

/// Open the ledger, restoring it from the audit store when one is configured.
///
/// # Errors
/// Returns an error if the store cannot be opened or its log does not replay.
#[allow(clippy::result_large_err)]
pub fn open_ledger(config: &Config) -> Result<Ledger> {
    let initial = config.ledger.initial_capital;
    let limit = config.risk.daily_loss_limit;

    let ledger = match &config.ledger.database {
        Some(database) => {
            let sink = Arc::new(SqliteAuditSink::open(database)?);
            Ledger::open(initial, limit, sink, Utc::now())?
        }
        None => {
            warn!("No ledger database configured; the audit log lives in memory only");
            Ledger::new(initial, limit, Utc::now())?
        }
    };
    ledger.verify()?;

    let snapshot = ledger.snapshot();
    if snapshot.open_reservations > 0 {
        warn!(
            open_reservations = snapshot.open_reservations,
            open_notional = %snapshot.open_notional,
            "Ledger restored with open reservations from a previous run; \
             once their venue orders are closed, free them with `plutus audit release`"
        );
    }
    info!(
        cash = %snapshot.cash,
        equity = %snapshot.equity,
        entries = snapshot.entries,
        "Ledger ready"
    );
    Ok(ledger)
}

#[allow(clippy::result_large_err)]
fn attach_gateways<'a>(config: &Config, mut builder: EngineBuilder<'a>) -> Result<EngineBuilder<'a>> {
    for venue in config.venues.iter().filter(|v| v.tradable) {
        if config.dry_run {
            info!(venue = %venue.id, "Paper gateway");
            builder = builder.paper(Arc::new(PaperGateway::new(venue.id.clone())));
            continue;
        }
        match venue.kind {
            VenueKind::Polymarket => {
                let gateway = ClobGateway::new(venue, config.credentials.as_ref())?;
                info!(venue = %venue.id, "CLOB gateway");
                builder = builder.gateway(Arc::new(gateway));
            }
            VenueKind::Binance => {
                return Err(ConfigError::InvalidValue {
                    field: "venues.tradable",
                    reason: format!("{}: live trading is only supported on CLOB venues", venue.id),
                }
                .into());
            }
        }
    }
    Ok(builder)
}

fn spawn_feeds(
    config: &Config,
    tx: &mpsc::Sender<VenueEvent>,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    config
        .venues
        .iter()
        .map(|venue| {
            let instruments: Vec<InstrumentId> = config
                .markets_on(&venue.id)
                .map(|m| m.instrument.clone())
                .collect();
            spawn_venue(config, venue, instruments, tx.clone(), shutdown.clone())
        })
        .collect()
}

fn spawn_venue(
    config: &Config,
    venue: &VenueConfig,
    instruments: Vec<InstrumentId>,
    tx: mpsc::Sender<VenueEvent>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let markets = config.markets_on(&venue.id);
    let reconnection = config.reconnection.clone();
    match venue.kind {
        VenueKind::Polymarket => {
            let feed = ReconnectingFeed::new(PolymarketFeed::new(venue, markets), reconnection);
            spawn_feed(feed, instruments, tx, shutdown)
        }
        VenueKind::Binance => {
            let feed = ReconnectingFeed::new(BinanceFeed::new(venue, markets), reconnection);
            spawn_feed(feed, instruments, tx, shutdown)
        }
    }
}
