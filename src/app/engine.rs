//! The engine task: sequencing, health, detection and risk gating.
//!
//! One task owns every piece of mutable engine state. Feed tasks send it
//! [`VenueEvent`]s, position tasks send it [`PositionEvent`]s, and it fans
//! accepted ticks back out to live positions over a broadcast channel. The
//! ledger is the only state shared with other tasks.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::config::{Config, EngineConfig};
use super::counters::Counters;
use super::status::{StatusSnapshot, StatusWriter, VenueReport, STATUS_VERSION};
use crate::adapter::PaperGateway;
use crate::detector::{Detector, StrategyRegistry};
use crate::domain::{Opportunity, Position, PositionId, PositionStatus, Tick, VenueId};
use crate::error::{Error, ExecutionError, LedgerError, Result};
use crate::exchange::{FeedEvent, OrderGateway};
use crate::execution::{Coordinator, KillSwitch, MarketUpdate, PositionEvent};
use crate::ingest::{DegradedReason, Sequencer, VenueEvent, VenueHealth};
use crate::ledger::Ledger;
use crate::risk::RiskGate;

/// Assembles an [`Engine`] from configuration and its collaborators.
pub struct EngineBuilder<'a> {
    config: &'a Config,
    ledger: Arc<Ledger>,
    gateways: Vec<Arc<dyn OrderGateway>>,
    papers: Vec<Arc<PaperGateway>>,
    status: Option<StatusWriter>,
    kill_switch: KillSwitch,
}

impl<'a> EngineBuilder<'a> {
    /// Route orders for the gateway's venue through `gateway`.
    #[must_use]
    pub fn gateway(mut self, gateway: Arc<dyn OrderGateway>) -> Self {
        self.gateways.push(gateway);
        self
    }

    /// Route orders through a paper gateway and feed it accepted ticks.
    #[must_use]
    pub fn paper(mut self, paper: Arc<PaperGateway>) -> Self {
        self.gateways.push(Arc::clone(&paper) as Arc<dyn OrderGateway>);
        self.papers.push(paper);
        self
    }

    #[must_use]
    pub fn status_writer(mut self, writer: StatusWriter) -> Self {
        self.status = Some(writer);
        self
    }

    /// Share a kill switch with the caller.
    #[must_use]
    pub fn kill_switch(mut self, kill_switch: KillSwitch) -> Self {
        self.kill_switch = kill_switch;
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    /// Returns a configuration error for an unknown strategy name.
    #[allow(clippy::result_large_err)]
    pub fn build(self) -> Result<Engine> {
        let config = self.config;
        let now = Utc::now();

        let registry = StrategyRegistry::from_config(config)?;
        let strategies = registry
            .strategies()
            .iter()
            .map(|s| s.kind().to_string())
            .collect();

        let (events_tx, position_rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(config.engine.broadcast_capacity);
        let coordinator = Coordinator::new(
            self.gateways,
            Arc::clone(&self.ledger),
            config.execution.clone(),
            self.kill_switch.clone(),
            events_tx,
            updates.clone(),
        );

        Ok(Engine {
            sequencer: Sequencer::new(),
            health: VenueHealth::with_venues(config.venues.iter().map(|v| &v.id), now),
            detector: Detector::new(registry, config.fees.clone(), config.engine.history_len),
            gate: RiskGate::new(config.risk.clone()),
            coordinator,
            ledger: self.ledger,
            kill_switch: self.kill_switch,
            papers: self.papers,
            updates,
            position_rx,
            positions: BTreeMap::new(),
            tasks: JoinSet::new(),
            counters: Counters::new(),
            status: self.status,
            config: config.engine.clone(),
            started_at: now,
            dry_run: config.dry_run,
            strategies,
        })
    }
}

/// The single engine task.
pub struct Engine {
    sequencer: Sequencer,
    health: VenueHealth,
    detector: Detector,
    gate: RiskGate,
    coordinator: Coordinator,
    ledger: Arc<Ledger>,
    kill_switch: KillSwitch,
    papers: Vec<Arc<PaperGateway>>,
    updates: broadcast::Sender<MarketUpdate>,
    position_rx: mpsc::UnboundedReceiver<PositionEvent>,
    /// Live positions as last reported by their tasks.
    positions: BTreeMap<PositionId, Position>,
    tasks: JoinSet<Position>,
    counters: Counters,
    status: Option<StatusWriter>,
    config: EngineConfig,
    started_at: DateTime<Utc>,
    dry_run: bool,
    strategies: Vec<String>,
}

impl Engine {
    #[must_use]
    pub fn builder(config: &Config, ledger: Arc<Ledger>) -> EngineBuilder<'_> {
        EngineBuilder {
            config,
            ledger,
            gateways: Vec::new(),
            papers: Vec::new(),
            status: None,
            kill_switch: KillSwitch::new(),
        }
    }

    #[must_use]
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    #[must_use]
    pub fn health(&self) -> &VenueHealth {
        &self.health
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    #[must_use]
    pub fn kill_switch(&self) -> &KillSwitch {
        &self.kill_switch
    }

    /// Live positions keyed by id.
    #[must_use]
    pub fn positions(&self) -> &BTreeMap<PositionId, Position> {
        &self.positions
    }

    /// Trading stopped for good: ledger halted or kill switch tripped.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.ledger.is_halted() || self.kill_switch.is_tripped()
    }

    /// Run until shutdown, until every feed ends, or until the ledger halts.
    ///
    /// On the way out live positions are told to exit and given
    /// `shutdown_grace_ms` to finish, then a final status is written.
    ///
    /// # Errors
    /// Returns the fatal ledger error that halted trading.
    pub async fn run(
        mut self,
        mut feed_rx: mpsc::Receiver<VenueEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<StatusSnapshot> {
        let mut housekeeping = tokio::time::interval(self.config.housekeeping_interval());
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            strategies = ?self.strategies,
            dry_run = self.dry_run,
            "Engine started"
        );

        let outcome = loop {
            tokio::select! {
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received");
                        break Ok(());
                    }
                }
                _ = housekeeping.tick() => {
                    if let Err(err) = self.housekeeping(Utc::now()) {
                        break Err(err);
                    }
                }
                event = feed_rx.recv() => {
                    let Some(event) = event else {
                        warn!("All market data feeds ended");
                        break Ok(());
                    };
                    if let Err(err) = self.handle_event(event, Utc::now()) {
                        break Err(err);
                    }
                }
                Some(event) = self.position_rx.recv() => self.on_position_event(event),
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.on_task_finished(joined);
                }
            }
        };

        if let Err(err) = &outcome {
            error!(error = %err, "Engine halted");
            self.kill_switch.trip(format!("engine halted: {err}"));
        }
        self.wind_down().await;

        let snapshot = self.snapshot(Utc::now());
        self.write_status(&snapshot);
        info!(
            opened = self.counters.positions_opened,
            closed = self.counters.positions_closed,
            failed = self.counters.positions_failed,
            live = self.positions.len(),
            "Engine stopped"
        );
        outcome.map(|()| snapshot)
    }

    /// Apply one feed event.
    ///
    /// # Errors
    /// Returns a fatal ledger error raised while opening a position.
    pub fn handle_event(&mut self, event: VenueEvent, now: DateTime<Utc>) -> Result<()> {
        let VenueEvent { venue, event } = event;
        match event {
            FeedEvent::Tick(tick) => self.on_tick(tick, now),
            FeedEvent::Connected { epoch } => {
                self.sequencer.resync(&venue, epoch);
                self.detector.clear_venue(&venue);
                self.health.mark_healthy(&venue, now);
                info!(%venue, epoch, "Venue connected");
                Ok(())
            }
            FeedEvent::Disconnected { reason } => {
                self.health
                    .mark_degraded(&venue, DegradedReason::Disconnected(reason), now);
                Ok(())
            }
            FeedEvent::Resolved {
                instrument,
                winning_asset,
            } => {
                let key = crate::domain::InstrumentKey::new(venue, instrument);
                info!(%key, %winning_asset, "Instrument resolved");
                let _ = self.updates.send(MarketUpdate::Resolved { key, winning_asset });
                Ok(())
            }
        }
    }

    fn on_tick(&mut self, tick: Tick, now: DateTime<Utc>) -> Result<()> {
        let admission = self.sequencer.admit(&tick);
        if !admission.is_accepted() {
            self.counters.dropped_ticks += 1;
            debug!(
                venue = %tick.venue,
                instrument = %tick.instrument,
                sequence = tick.sequence,
                admission = admission.as_str(),
                "Tick dropped"
            );
            return Ok(());
        }
        self.counters.ticks += 1;
        self.health.observe(&tick.venue, now);

        for paper in &self.papers {
            paper.observe(&tick);
        }
        // No receivers simply means no live positions.
        let _ = self.updates.send(MarketUpdate::Tick(tick.clone()));

        for opportunity in self.detector.on_tick(&tick, &self.health, now) {
            self.consider(opportunity, now)?;
        }
        Ok(())
    }

    fn consider(&mut self, opportunity: Opportunity, now: DateTime<Utc>) -> Result<()> {
        self.counters.opportunities += 1;

        if self.is_halted() {
            self.counters.halted += 1;
            debug!(opportunity_id = %opportunity.id(), "Trading halted, opportunity dropped");
            return Ok(());
        }
        if opportunity.is_expired(now) {
            self.counters.stale += 1;
            debug!(opportunity_id = %opportunity.id(), "Opportunity expired before gating");
            return Ok(());
        }

        let snapshot = self.ledger.snapshot();
        let trade = match self
            .gate
            .evaluate(&opportunity, &snapshot, self.positions.len())
        {
            Ok(trade) => trade,
            Err(rejection) => {
                self.counters.reject(rejection.reason);
                info!(
                    opportunity_id = %opportunity.id(),
                    strategy = %opportunity.strategy(),
                    reason = %rejection.reason,
                    detail = %rejection.detail,
                    "Opportunity rejected"
                );
                return Ok(());
            }
        };

        match self.coordinator.open(trade) {
            Ok((position, task)) => {
                self.counters.positions_opened += 1;
                self.positions.insert(position.id(), position);
                self.tasks.spawn(task.run());
                Ok(())
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(Error::Execution(ExecutionError::StaleOpportunity(id))) => {
                self.counters.stale += 1;
                debug!(opportunity_id = %id, "Opportunity expired before reservation");
                Ok(())
            }
            Err(err) => {
                self.counters.open_failures += 1;
                warn!(opportunity_id = %opportunity.id(), error = %err, "Could not open position");
                Ok(())
            }
        }
    }

    fn on_position_event(&mut self, event: PositionEvent) {
        let id = event.position_id();
        match event {
            PositionEvent::Updated(position) => {
                if let Some(live) = self.positions.get_mut(&id) {
                    *live = position;
                }
            }
            PositionEvent::Closed(position) => {
                if self.positions.remove(&id).is_some() {
                    self.counters.positions_closed += 1;
                }
                debug!(position_id = %id, pnl = ?position.realized_pnl(), "Position closed");
            }
            PositionEvent::Failed(position) => {
                if self.positions.remove(&id).is_some() {
                    self.counters.positions_failed += 1;
                }
                debug!(position_id = %id, failure = ?position.failure(), "Position failed");
            }
        }
    }

    fn on_task_finished(&mut self, joined: std::result::Result<Position, JoinError>) {
        match joined {
            Ok(position) => {
                let id = position.id();
                match position.status() {
                    PositionStatus::Closed | PositionStatus::Failed => {
                        // The terminal event normally got here first.
                        if self.positions.remove(&id).is_some() {
                            if position.status() == PositionStatus::Closed {
                                self.counters.positions_closed += 1;
                            } else {
                                self.counters.positions_failed += 1;
                            }
                        }
                    }
                    status => {
                        error!(position_id = %id, %status, "Position task ended with the position still open");
                        self.positions.insert(id, position);
                    }
                }
            }
            Err(err) => {
                error!(error = %err, "Position task aborted");
                self.kill_switch.trip(format!("position task aborted: {err}"));
            }
        }
    }

    /// Periodic work: day roll, stale sweep, dedup pruning, status file.
    ///
    /// # Errors
    /// Returns `Halted` once the ledger has latched into its halted state.
    pub fn housekeeping(&mut self, now: DateTime<Utc>) -> Result<()> {
        // A fatal roll failure latches the ledger; the halt check below reports it.
        if let Err(err) = self.ledger.roll_day(now) {
            if !err.is_fatal() {
                warn!(error = %err, "Day roll failed");
            }
        }

        self.health.sweep_stale(now, self.config.stale_after());
        let pruned = self.detector.prune(now);
        if pruned > 0 {
            debug!(pruned, "Expired opportunity keys pruned");
        }

        let snapshot = self.snapshot(now);
        self.write_status(&snapshot);

        if let Some(reason) = snapshot.ledger.halted {
            return Err(LedgerError::Halted(reason).into());
        }
        Ok(())
    }

    async fn wind_down(&mut self) {
        if !self.tasks.is_empty() {
            self.kill_switch.trip("shutdown");
            info!(live = self.tasks.len(), "Waiting for positions to exit");

            let grace = tokio::time::sleep(Duration::from_millis(self.config.shutdown_grace_ms));
            tokio::pin!(grace);
            loop {
                tokio::select! {
                    _ = &mut grace => {
                        warn!(live = self.tasks.len(), "Shutdown grace expired, aborting position tasks");
                        self.tasks.abort_all();
                        break;
                    }
                    Some(event) = self.position_rx.recv() => self.on_position_event(event),
                    joined = self.tasks.join_next() => match joined {
                        Some(joined) => self.on_task_finished(joined),
                        None => break,
                    },
                }
            }
        }

        while let Ok(event) = self.position_rx.try_recv() {
            self.on_position_event(event);
        }
    }

    /// Point-in-time status of the engine.
    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> StatusSnapshot {
        let venues = self
            .health
            .snapshot()
            .into_iter()
            .map(|(venue, status)| VenueReport { venue, status })
            .collect();

        StatusSnapshot {
            version: STATUS_VERSION.to_string(),
            started_at: self.started_at,
            updated_at: now,
            pid: std::process::id(),
            dry_run: self.dry_run,
            strategies: self.strategies.clone(),
            ledger: self.ledger.snapshot(),
            venues,
            positions_by_status: StatusSnapshot::count_by_status(self.positions.values()),
            positions: self.positions.values().cloned().collect(),
            counters: self.counters.clone(),
            kill_switch: self.kill_switch.reason(),
            halted: self.is_halted(),
        }
    }

    fn write_status(&self, snapshot: &StatusSnapshot) {
        let Some(writer) = &self.status else {
            return;
        };
        if let Err(err) = writer.write(snapshot) {
            warn!(path = %writer.path().display(), error = %err, "Failed to write status file");
        }
    }

    /// Venues currently degraded.
    #[must_use]
    pub fn degraded_venues(&self) -> Vec<VenueId> {
        self.health
            .snapshot()
            .into_iter()
            .filter(|(_, status)| !status.is_healthy())
            .map(|(venue, _)| venue)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AssetId;
    use crate::risk::RejectReason;
    use crate::testkit::config::two_venues;
    use crate::testkit::domain::{binary_tick, binary_tick_at};
    use crate::testkit::gateway::ScriptedGateway;
    use rust_decimal_macros::dec;

    fn ledger() -> Arc<Ledger> {
        Arc::new(Ledger::new(dec!(1000), dec!(100), Utc::now()).unwrap())
    }

    fn engine(config: &Config) -> Engine {
        Engine::builder(config, ledger())
            .gateway(Arc::new(ScriptedGateway::new("pm")))
            .gateway(Arc::new(ScriptedGateway::new("pm2")))
            .build()
            .unwrap()
    }

    fn event(venue: &str, event: FeedEvent) -> VenueEvent {
        VenueEvent {
            venue: VenueId::from(venue),
            event,
        }
    }

    fn connect(engine: &mut Engine, venue: &str) {
        engine
            .handle_event(event(venue, FeedEvent::Connected { epoch: 1 }), Utc::now())
            .unwrap();
    }

    #[tokio::test]
    async fn structural_tick_opens_a_position() {
        let mut engine = engine(&two_venues());
        connect(&mut engine, "pm");

        let tick = binary_tick("pm", "m1", dec!(0.45), dec!(0.50));
        engine
            .handle_event(event("pm", FeedEvent::Tick(tick)), Utc::now())
            .unwrap();

        assert_eq!(engine.counters().opportunities, 1);
        assert_eq!(engine.counters().positions_opened, 1);
        assert_eq!(engine.positions().len(), 1);
        assert!(engine.ledger().snapshot().open_notional > dec!(0));
    }

    #[tokio::test]
    async fn out_of_order_and_duplicate_ticks_are_dropped() {
        let mut config = two_venues();
        config.strategies.enabled = vec!["structural".into()];
        let mut engine = engine(&config);
        connect(&mut engine, "pm");

        for seq in [5, 5, 3] {
            let tick = binary_tick_at("pm", "m1", seq, dec!(0.50), dec!(0.50));
            engine
                .handle_event(event("pm", FeedEvent::Tick(tick)), Utc::now())
                .unwrap();
        }

        assert_eq!(engine.counters().ticks, 1);
        assert_eq!(engine.counters().dropped_ticks, 2);
    }

    #[tokio::test]
    async fn gate_rejections_are_counted_by_reason() {
        let mut config = two_venues();
        config.risk.max_concurrent_positions = 0;
        let mut engine = engine(&config);
        connect(&mut engine, "pm");

        let tick = binary_tick("pm", "m1", dec!(0.45), dec!(0.50));
        engine
            .handle_event(event("pm", FeedEvent::Tick(tick)), Utc::now())
            .unwrap();

        assert_eq!(
            engine.counters().rejections_for(RejectReason::ConcurrencyLimit),
            1
        );
        assert!(engine.positions().is_empty());
        assert_eq!(engine.ledger().snapshot().open_notional, dec!(0));
    }

    #[tokio::test]
    async fn daily_loss_limit_blocks_trading_until_the_day_rolls() {
        let mut config = two_venues();
        config.strategies.enabled = vec!["structural".into()];
        config.risk.daily_loss_limit = dec!(100);

        let today = Utc::now();
        let ledger = Arc::new(Ledger::new(dec!(1000), dec!(100), today).unwrap());
        let earlier = PositionId::new(900);
        let held = ledger.reserve(earlier, dec!(50)).unwrap();
        ledger.commit(earlier, held, dec!(-100)).unwrap();

        let mut engine = Engine::builder(&config, Arc::clone(&ledger))
            .gateway(Arc::new(ScriptedGateway::new("pm")))
            .build()
            .unwrap();
        connect(&mut engine, "pm");
        fn deliver(engine: &mut Engine, seq: u64, at: DateTime<Utc>) {
            let tick = binary_tick_at("pm", "m1", seq, dec!(0.45), dec!(0.50));
            engine
                .handle_event(event("pm", FeedEvent::Tick(tick)), at)
                .unwrap();
        }

        deliver(&mut engine, 1, today);
        // housekeeping within the same trading day changes nothing
        engine.housekeeping(today).unwrap();
        deliver(&mut engine, 2, today + chrono::Duration::minutes(5));
        assert_eq!(engine.counters().rejections_for(RejectReason::LossLimit), 2);
        assert_eq!(engine.counters().positions_opened, 0);

        let tomorrow = today + chrono::Duration::days(1);
        engine.housekeeping(tomorrow).unwrap();
        assert_eq!(engine.ledger().snapshot().daily_pnl, dec!(0));

        deliver(&mut engine, 3, tomorrow);
        assert_eq!(engine.counters().rejections_for(RejectReason::LossLimit), 2);
        assert_eq!(engine.counters().positions_opened, 1);
        assert_eq!(engine.positions().len(), 1);
    }

    #[tokio::test]
    async fn tripped_kill_switch_stops_new_positions() {
        let mut engine = engine(&two_venues());
        connect(&mut engine, "pm");
        engine.kill_switch().trip("operator");

        let tick = binary_tick("pm", "m1", dec!(0.45), dec!(0.50));
        engine
            .handle_event(event("pm", FeedEvent::Tick(tick)), Utc::now())
            .unwrap();

        assert_eq!(engine.counters().halted, 1);
        assert_eq!(engine.counters().positions_opened, 0);
        assert!(engine.snapshot(Utc::now()).halted);
    }

    #[tokio::test]
    async fn disconnect_degrades_and_reconnect_restores() {
        let mut engine = engine(&two_venues());
        connect(&mut engine, "pm");
        connect(&mut engine, "pm2");
        assert!(engine.degraded_venues().is_empty());

        engine
            .handle_event(
                event("pm2", FeedEvent::Disconnected { reason: "reset".into() }),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(engine.degraded_venues(), vec![VenueId::from("pm2")]);

        engine
            .handle_event(event("pm2", FeedEvent::Connected { epoch: 2 }), Utc::now())
            .unwrap();
        assert!(engine.degraded_venues().is_empty());
    }

    #[tokio::test]
    async fn venues_start_degraded_until_connected() {
        let engine = engine(&two_venues());
        let snapshot = engine.snapshot(Utc::now());
        assert_eq!(snapshot.degraded_venues().len(), 2);
        assert!(!snapshot.halted);
    }

    #[tokio::test]
    async fn run_closes_resolved_positions_and_writes_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let config = two_venues();
        let engine = Engine::builder(&config, ledger())
            .gateway(Arc::new(ScriptedGateway::new("pm")))
            .gateway(Arc::new(ScriptedGateway::new("pm2")))
            .status_writer(StatusWriter::new(&path))
            .build()
            .unwrap();

        let (feed_tx, feed_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(engine.run(feed_rx, shutdown_rx));

        feed_tx
            .send(event("pm", FeedEvent::Connected { epoch: 1 }))
            .await
            .unwrap();
        feed_tx
            .send(event(
                "pm",
                FeedEvent::Tick(binary_tick("pm", "m1", dec!(0.45), dec!(0.50))),
            ))
            .await
            .unwrap();
        feed_tx
            .send(event(
                "pm",
                FeedEvent::Resolved {
                    instrument: "m1".into(),
                    winning_asset: AssetId::from("m1-yes"),
                },
            ))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        shutdown_tx.send(true).unwrap();
        let snapshot = handle.await.unwrap().unwrap();

        assert_eq!(snapshot.counters.positions_opened, 1);
        assert_eq!(snapshot.counters.positions_closed, 1);
        assert!(snapshot.positions.is_empty());
        assert!(snapshot.ledger.cumulative_pnl > dec!(0));
        assert_eq!(snapshot.ledger.open_notional, dec!(0));

        let written = StatusWriter::read(&path).unwrap();
        assert_eq!(written.counters.positions_closed, 1);
    }

    #[tokio::test]
    async fn run_stops_when_every_feed_ends() {
        let config = two_venues();
        let engine = engine(&config);
        let (feed_tx, feed_rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(feed_tx);

        let snapshot = engine.run(feed_rx, shutdown_rx).await.unwrap();
        assert_eq!(snapshot.counters.ticks, 0);
    }
}
