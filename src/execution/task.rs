//! Lifecycle of one live position.
//!
//! ```text
//! submit legs ──► poll fills ──► resolving ──► commit ──► close
//!      │               │
//!      └──── error ────┴──► cancel ──► flatten ──► rollback / commit unwind
//! ```
//!
//! The position only reaches CLOSED or FAILED once the ledger has accepted
//! the release of its reservation. A refused release trips the kill switch
//! and leaves the position open.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::events::{MarketUpdate, PositionEvent};
use super::exit::{exit_condition, holdings, mark_to_market, Holding, Marks};
use super::kill_switch::KillSwitch;
use super::retry::{is_transient, RetryPolicy};
use crate::app::ExecutionConfig;
use crate::domain::{
    ExitReason, InstrumentKey, OpportunityId, OrderId, Position, PositionStatus, Price, Side,
    VenueId,
};
use crate::error::{Error, ExecutionError, LedgerError, Result};
use crate::exchange::{OrderAck, OrderGateway, OrderRequest, OrderStatus};
use crate::ledger::Ledger;

/// Ledger writes refused by the audit sink are retried this many times.
const SETTLE_ATTEMPTS: u32 = 3;

/// Which checks run before each submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Guard {
    /// Entry orders stop on expiry or the kill switch.
    Entry,
    /// Compensating and closing orders always go out.
    Unwind,
}

/// How a finished position releases its reservation.
#[derive(Debug, Clone, Copy)]
enum Settlement {
    Commit(Price),
    Rollback,
}

/// Drives one position from submission to a terminal state.
///
/// Created by [`Coordinator::open`](super::Coordinator::open); the engine
/// spawns [`run`](Self::run).
pub struct PositionTask {
    pub(super) position: Position,
    pub(super) opportunity_id: OpportunityId,
    pub(super) expires_at: DateTime<Utc>,
    pub(super) gateways: Arc<HashMap<VenueId, Arc<dyn OrderGateway>>>,
    pub(super) ledger: Arc<Ledger>,
    pub(super) config: ExecutionConfig,
    pub(super) retry: RetryPolicy,
    pub(super) kill_switch: KillSwitch,
    pub(super) kill_rx: watch::Receiver<bool>,
    pub(super) events: mpsc::UnboundedSender<PositionEvent>,
    pub(super) updates: broadcast::Receiver<MarketUpdate>,
}

impl std::fmt::Debug for PositionTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionTask")
            .field("position", &self.position)
            .field("opportunity_id", &self.opportunity_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl PositionTask {
    #[must_use]
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Run the lifecycle to completion and return the final position.
    pub async fn run(mut self) -> Position {
        let id = self.position.id();
        if let Err(err) = self.enter().await {
            self.unwind(&err).await;
            return self.position;
        }

        info!(position_id = %id, entry_cost = %self.position.entry_cost(), "Position filled");
        if let Err(err) = self.position.transition(PositionStatus::Resolving) {
            error!(position_id = %id, error = %err, "Cannot start monitoring");
            return self.position;
        }
        self.publish(PositionEvent::Updated(self.position.clone()));

        let (reason, resolved, marks) = self.monitor().await;
        self.exit(reason, resolved, &marks).await;
        self.position
    }

    // --- entry ---

    async fn enter(&mut self) -> Result<()> {
        self.submit_legs().await?;
        self.await_fills().await
    }

    async fn submit_legs(&mut self) -> Result<()> {
        let id = self.position.id();
        let requests: Vec<OrderRequest> = self
            .position
            .legs()
            .iter()
            .enumerate()
            .map(|(i, leg)| OrderRequest {
                client_id: format!("{id}-{i}-entry"),
                venue: leg.venue().clone(),
                instrument: leg.instrument().clone(),
                asset: leg.asset().clone(),
                side: leg.side(),
                price: leg.price(),
                size: leg.size(),
            })
            .collect();

        let results = join_all(requests.iter().map(|r| self.submit(r, Guard::Entry))).await;

        let mut failure = None;
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(ack) => {
                    let leg = &mut self.position.legs_mut()[i];
                    leg.acknowledge(ack.order_id.clone());
                    leg.record_fill(ack.filled, ack.avg_price);
                    debug!(position_id = %id, leg = i, order_id = %ack.order_id, "Leg acknowledged");
                }
                Err(err) => {
                    warn!(position_id = %id, leg = i, error = %err, "Leg submission failed");
                    failure.get_or_insert(err);
                }
            }
        }
        self.refresh()?;

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn await_fills(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.config.fill_timeout();
        loop {
            self.poll_legs().await?;
            if self.position.all_legs_filled() {
                return Ok(());
            }
            if self.kill_switch.is_tripped() {
                return Err(ExecutionError::Cancelled("kill switch tripped".into()).into());
            }
            if Instant::now() >= deadline {
                return Err(ExecutionError::LegFillTimeout {
                    position_id: self.position.id(),
                    timeout_ms: self.config.fill_timeout_ms,
                }
                .into());
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// Refresh fills of every working leg from the venue.
    async fn poll_legs(&mut self) -> Result<()> {
        for i in 0..self.position.legs().len() {
            let leg = &self.position.legs()[i];
            if leg.is_filled() {
                continue;
            }
            let Some(order_id) = leg.order_id().cloned() else {
                continue;
            };
            let gateway = self.gateway(leg.venue())?;

            let ack = match gateway.order_status(&order_id).await {
                Ok(ack) => ack,
                Err(err) if is_transient(&err) => {
                    warn!(position_id = %self.position.id(), %order_id, error = %err, "Order status unavailable");
                    continue;
                }
                Err(err) => return Err(err),
            };

            let leg = &mut self.position.legs_mut()[i];
            leg.record_fill(ack.filled, ack.avg_price);
            if matches!(ack.status, OrderStatus::Cancelled | OrderStatus::Rejected) && !leg.is_filled() {
                return Err(ExecutionError::OrderRejected(format!(
                    "order {order_id} ended {:?} with {} of {} filled",
                    ack.status,
                    ack.filled,
                    leg.size()
                ))
                .into());
            }
        }
        self.refresh()
    }

    fn refresh(&mut self) -> Result<()> {
        let before = self.position.status();
        let after = self.position.refresh_fill_status()?;
        if after != before {
            debug!(position_id = %self.position.id(), from = %before, to = %after, "Position status changed");
            self.publish(PositionEvent::Updated(self.position.clone()));
        }
        Ok(())
    }

    // --- rollback ---

    /// Cancel outstanding legs, flatten filled quantity, fail the position
    /// and release its reservation.
    async fn unwind(&mut self, cause: &Error) {
        let id = self.position.id();
        warn!(position_id = %id, error = %cause, "Rolling back position");

        self.cancel_outstanding().await;

        let mut unwind_pnl = Decimal::ZERO;
        let mut stuck = Vec::new();
        for i in 0..self.position.legs().len() {
            let leg = &self.position.legs()[i];
            if leg.filled().is_zero() {
                continue;
            }
            let request = OrderRequest {
                client_id: format!("{id}-{i}-flatten"),
                venue: leg.venue().clone(),
                instrument: leg.instrument().clone(),
                asset: leg.asset().clone(),
                side: leg.side().opposite(),
                price: concede(leg.avg_price(), leg.side().opposite(), self.config.flatten_slippage),
                size: leg.filled(),
            };
            let entry_flow = leg.cash_flow();

            match self.execute(&request).await {
                Ok(ack) => {
                    unwind_pnl += entry_flow + request.side.cash_sign() * ack.filled * ack.avg_price;
                    if ack.filled >= request.size {
                        self.position.legs_mut()[i].flatten();
                    } else {
                        stuck.push(format!("leg {i}: flattened {} of {}", ack.filled, request.size));
                    }
                }
                Err(err) => stuck.push(format!("leg {i}: {err}")),
            }
        }

        let had_fills = self.position.any_leg_filled();
        if !stuck.is_empty() {
            self.kill_switch
                .trip(format!("flatten failed for {id}: {}", stuck.join("; ")));
            error!(
                position_id = %id,
                legs = ?stuck,
                "Flatten failed; position partially hedged, reservation held"
            );
        } else {
            let settlement = if had_fills {
                Settlement::Commit(unwind_pnl)
            } else {
                Settlement::Rollback
            };
            if let Err(err) = self.settle(settlement).await {
                error!(
                    position_id = %id,
                    pnl = %unwind_pnl,
                    error = %err,
                    "Ledger refused the rollback; position left open, reservation held"
                );
                self.publish(PositionEvent::Updated(self.position.clone()));
                return;
            }
            if had_fills {
                info!(position_id = %id, pnl = %unwind_pnl, "Position unwound");
            } else {
                info!(position_id = %id, "Position rolled back");
            }
        }

        if let Err(err) = self.position.fail(cause.to_string(), unwind_pnl, Utc::now()) {
            error!(position_id = %id, error = %err, "Could not mark position failed");
        }
        self.publish(PositionEvent::Failed(self.position.clone()));
    }

    async fn cancel_outstanding(&mut self) {
        for i in 0..self.position.legs().len() {
            let leg = &self.position.legs()[i];
            if leg.is_filled() {
                continue;
            }
            let Some(order_id) = leg.order_id().cloned() else {
                self.position.legs_mut()[i].cancel();
                continue;
            };
            let Ok(gateway) = self.gateway(leg.venue()) else {
                continue;
            };

            if let Err(err) = gateway.cancel(&order_id).await {
                warn!(%order_id, error = %err, "Cancel failed");
            }
            // Fills can land between the last poll and the cancel.
            match gateway.order_status(&order_id).await {
                Ok(ack) => self.position.legs_mut()[i].record_fill(ack.filled, ack.avg_price),
                Err(err) => warn!(%order_id, error = %err, "Final order status unavailable"),
            }
            self.position.legs_mut()[i].cancel();
        }
    }

    // --- monitoring ---

    async fn monitor(&mut self) -> (ExitReason, Option<InstrumentKey>, Marks) {
        let held = holdings(&self.position);
        let mut marks = Marks::default();
        let mut interval = tokio::time::interval(self.config.exit.monitor_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut updates_open = true;

        if self.kill_switch.is_tripped() {
            return (ExitReason::KillSwitch, None, marks);
        }

        loop {
            tokio::select! {
                changed = self.kill_rx.changed() => {
                    if changed.is_err() || *self.kill_rx.borrow() {
                        return (ExitReason::KillSwitch, None, marks);
                    }
                }
                update = self.updates.recv(), if updates_open => match update {
                    Ok(MarketUpdate::Tick(tick)) => marks.apply(&tick, &held),
                    Ok(MarketUpdate::Resolved { key, winning_asset }) => {
                        if held.iter().any(|h| h.key == key) {
                            return (ExitReason::Resolution { winning_asset }, Some(key), marks);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(position_id = %self.position.id(), skipped, "Market updates lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => updates_open = false,
                },
                _ = interval.tick() => {
                    let pnl = mark_to_market(&self.position, &held, &marks);
                    if let Some(reason) = exit_condition(&self.config.exit, &self.position, pnl, Utc::now()) {
                        return (reason, None, marks);
                    }
                }
            }
        }
    }

    // --- exit ---

    async fn exit(&mut self, reason: ExitReason, resolved: Option<InstrumentKey>, marks: &Marks) {
        let id = self.position.id();
        info!(position_id = %id, %reason, "Exiting position");

        let held = holdings(&self.position);
        let mut pnl: Price = self.position.legs().iter().map(|l| l.cash_flow()).sum();
        let mut stuck = Vec::new();

        for (i, holding) in held.iter().enumerate() {
            if let (ExitReason::Resolution { winning_asset }, Some(key)) = (&reason, &resolved) {
                if &holding.key == key {
                    if &holding.asset == winning_asset {
                        pnl += holding.quantity;
                    }
                    continue;
                }
            }

            let request = self.closing_request(i, holding, marks);
            match self.execute(&request).await {
                Ok(ack) => {
                    pnl += request.side.cash_sign() * ack.filled * ack.avg_price;
                    if ack.filled < request.size {
                        stuck.push(format!("{}: closed {} of {}", holding.asset, ack.filled, request.size));
                    }
                }
                Err(err) => stuck.push(format!("{}: {err}", holding.asset)),
            }
        }

        if !stuck.is_empty() {
            self.kill_switch
                .trip(format!("closing orders failed for {id}: {}", stuck.join("; ")));
            error!(position_id = %id, legs = ?stuck, "Close failed; position left open, reservation held");
            self.publish(PositionEvent::Updated(self.position.clone()));
            return;
        }

        if let Err(err) = self.settle(Settlement::Commit(pnl)).await {
            error!(
                position_id = %id,
                %pnl,
                error = %err,
                "Ledger refused the commit; position left resolving, reservation held"
            );
            self.publish(PositionEvent::Updated(self.position.clone()));
            return;
        }
        if let Err(err) = self.position.close(pnl, reason, Utc::now()) {
            error!(position_id = %id, error = %err, "Could not mark position closed");
        }
        info!(position_id = %id, %pnl, "Position closed");
        self.publish(PositionEvent::Closed(self.position.clone()));
    }

    fn closing_request(&self, index: usize, holding: &Holding, marks: &Marks) -> OrderRequest {
        let side = holding.closing_side();
        OrderRequest {
            client_id: format!("{}-{index}-close", self.position.id()),
            venue: holding.key.venue.clone(),
            instrument: holding.key.instrument.clone(),
            asset: holding.asset.clone(),
            side,
            price: concede(marks.exit_price(holding), side, self.config.flatten_slippage),
            size: holding.quantity.abs(),
        }
    }

    // --- order plumbing ---

    fn gateway(&self, venue: &VenueId) -> Result<Arc<dyn OrderGateway>> {
        self.gateways
            .get(venue)
            .cloned()
            .ok_or_else(|| ExecutionError::NoGateway(venue.clone()).into())
    }

    async fn submit(&self, request: &OrderRequest, guard: Guard) -> Result<OrderAck> {
        let gateway = self.gateway(&request.venue)?;
        let kill_switch = &self.kill_switch;
        let expires_at = self.expires_at;
        let opportunity_id = self.opportunity_id;

        let ack = self
            .retry
            .run(
                |_| gateway.submit(request),
                || match guard {
                    Guard::Unwind => None,
                    Guard::Entry if kill_switch.is_tripped() => {
                        Some(ExecutionError::Cancelled("kill switch tripped".into()))
                    }
                    Guard::Entry if Utc::now() >= expires_at => {
                        Some(ExecutionError::StaleOpportunity(opportunity_id.to_string()))
                    }
                    Guard::Entry => None,
                },
            )
            .await?;

        if ack.status == OrderStatus::Rejected {
            return Err(ExecutionError::OrderRejected(format!(
                "{} {} {} rejected by {}",
                request.side, request.size, request.asset, request.venue
            ))
            .into());
        }
        Ok(ack)
    }

    /// Submit an unguarded order and poll it until filled or the fill
    /// timeout elapses, then cancel any remainder. Returns the last ack.
    async fn execute(&self, request: &OrderRequest) -> Result<OrderAck> {
        let gateway = self.gateway(&request.venue)?;
        let mut ack = self.submit(request, Guard::Unwind).await?;
        let order_id: OrderId = ack.order_id.clone();
        let deadline = Instant::now() + self.config.fill_timeout();

        while !ack.status.is_final() {
            if Instant::now() >= deadline {
                if let Err(err) = gateway.cancel(&order_id).await {
                    warn!(%order_id, error = %err, "Cancel failed");
                }
                if let Ok(last) = gateway.order_status(&order_id).await {
                    ack = last;
                }
                break;
            }
            tokio::time::sleep(self.config.poll_interval()).await;
            match gateway.order_status(&order_id).await {
                Ok(next) => ack = next,
                Err(err) if is_transient(&err) => {
                    warn!(%order_id, error = %err, "Order status unavailable");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(ack)
    }

    /// Release the reservation. Audit sink failures are retried; once the
    /// ledger refuses for good the kill switch trips and the reservation
    /// stays held.
    async fn settle(&self, settlement: Settlement) -> std::result::Result<(), LedgerError> {
        let id = self.position.id();
        let reservation_id = self.position.reservation_id();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match settlement {
                Settlement::Commit(pnl) => self.ledger.commit(id, reservation_id, pnl),
                Settlement::Rollback => self.ledger.rollback(reservation_id),
            };
            match result {
                Ok(()) => return Ok(()),
                Err(LedgerError::Sink(reason)) if attempt < SETTLE_ATTEMPTS => {
                    warn!(position_id = %id, attempt, %reason, "Audit sink refused ledger update, retrying");
                    tokio::time::sleep(self.config.poll_interval()).await;
                }
                Err(err) => {
                    self.kill_switch
                        .trip(format!("ledger update for {id} failed: {err}"));
                    return Err(err);
                }
            }
        }
    }

    fn publish(&self, event: PositionEvent) {
        if self.events.send(event).is_err() {
            debug!(position_id = %self.position.id(), "Engine gone, event dropped");
        }
    }
}

/// Price an order willing to give up `slippage` to get filled.
fn concede(price: Price, side: Side, slippage: Decimal) -> Price {
    match side {
        Side::Buy => price * (Decimal::ONE + slippage),
        Side::Sell => (price * (Decimal::ONE - slippage)).max(Decimal::ZERO),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::RetryConfig;
    use crate::execution::Coordinator;
    use crate::risk::SizedTrade;
    use crate::testkit::config::execution;
    use crate::testkit::domain::structural_opportunity;
    use crate::testkit::gateway::{Fill, ScriptedGateway};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn open_task(gateway: Arc<ScriptedGateway>, ledger: Arc<Ledger>) -> PositionTask {
        let (events, _) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(4);
        let coordinator = Coordinator::new(
            vec![gateway as Arc<dyn OrderGateway>],
            ledger,
            execution(),
            KillSwitch::new(),
            events,
            updates,
        );
        let opportunity = structural_opportunity(dec!(0.45), dec!(0.45), dec!(100));
        let trade = SizedTrade {
            notional: dec!(9),
            opportunity,
            size: dec!(10),
            kelly_fraction: dec!(0.1),
        };
        let (_, task) = coordinator.open(trade).unwrap();
        task
    }

    #[tokio::test]
    async fn expiry_during_backoff_abandons_the_entry() {
        let gateway = Arc::new(ScriptedGateway::new("pm").script("m1-no", Fill::Transient(5)));
        let ledger = Arc::new(Ledger::new(dec!(1000), dec!(100), Utc::now()).unwrap());
        let mut task = open_task(Arc::clone(&gateway), Arc::clone(&ledger));

        // first attempt fails, the opportunity lapses while backing off
        task.retry = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 5,
            initial_delay_ms: 300,
            multiplier: 1.0,
            max_delay_ms: 300,
        });
        task.expires_at = Utc::now() + Duration::milliseconds(100);

        let position = task.run().await;

        assert_eq!(position.status(), PositionStatus::Failed);
        assert!(position.failure().unwrap().contains("expired before execution"));
        let no_attempts = gateway
            .submitted()
            .iter()
            .filter(|o| o.asset.as_str() == "m1-no")
            .count();
        assert_eq!(no_attempts, 1);
        // the acknowledged YES order is pulled
        assert_eq!(gateway.cancelled().len(), 1);

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.open_reservations, 0);
        assert_eq!(snapshot.cash, dec!(1000));
    }

    #[test]
    fn concession_moves_price_against_us() {
        assert_eq!(concede(dec!(0.50), Side::Buy, dec!(0.02)), dec!(0.51));
        assert_eq!(concede(dec!(0.50), Side::Sell, dec!(0.02)), dec!(0.49));
        assert_eq!(concede(dec!(0.50), Side::Sell, dec!(1.5)), Decimal::ZERO);
    }
}
