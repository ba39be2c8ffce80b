//! Turns sized trades into live positions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

use super::events::{MarketUpdate, PositionEvent};
use super::kill_switch::KillSwitch;
use super::retry::RetryPolicy;
use super::task::PositionTask;
use crate::app::ExecutionConfig;
use crate::domain::{Position, PositionId, PositionLeg, VenueId};
use crate::error::{ExecutionError, Result};
use crate::exchange::OrderGateway;
use crate::ledger::Ledger;
use crate::risk::SizedTrade;

/// Reserves capital and hands each approved trade to its own task.
pub struct Coordinator {
    gateways: Arc<HashMap<VenueId, Arc<dyn OrderGateway>>>,
    ledger: Arc<Ledger>,
    config: ExecutionConfig,
    retry: RetryPolicy,
    kill_switch: KillSwitch,
    events: mpsc::UnboundedSender<PositionEvent>,
    updates: broadcast::Sender<MarketUpdate>,
    next_position: AtomicU64,
}

impl Coordinator {
    /// Create a coordinator. Position ids continue after the highest id in
    /// the ledger's audit log.
    #[must_use]
    pub fn new(
        gateways: Vec<Arc<dyn OrderGateway>>,
        ledger: Arc<Ledger>,
        config: ExecutionConfig,
        kill_switch: KillSwitch,
        events: mpsc::UnboundedSender<PositionEvent>,
        updates: broadcast::Sender<MarketUpdate>,
    ) -> Self {
        let last_id = ledger
            .entries()
            .iter()
            .filter_map(|e| e.position_id)
            .map(|id| id.value())
            .max()
            .unwrap_or(0);
        let gateways = gateways
            .into_iter()
            .map(|g| (g.venue().clone(), g))
            .collect();

        Self {
            gateways: Arc::new(gateways),
            ledger,
            retry: RetryPolicy::from_config(&config.retry),
            config,
            kill_switch,
            events,
            updates,
            next_position: AtomicU64::new(last_id + 1),
        }
    }

    #[must_use]
    pub fn kill_switch(&self) -> &KillSwitch {
        &self.kill_switch
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Reserve capital for `trade` and build its lifecycle task.
    ///
    /// The returned position is PENDING; nothing has been sent to a venue
    /// until the task runs.
    ///
    /// # Errors
    ///
    /// `Cancelled` while the kill switch is tripped, `StaleOpportunity` once
    /// the opportunity expired, `NoGateway` for a leg on a venue without a
    /// gateway, or a ledger refusal. No capital is reserved on error.
    pub fn open(&self, trade: SizedTrade) -> Result<(Position, PositionTask)> {
        let opportunity = &trade.opportunity;
        if self.kill_switch.is_tripped() {
            return Err(ExecutionError::Cancelled("kill switch tripped".into()).into());
        }
        if opportunity.is_expired(Utc::now()) {
            return Err(ExecutionError::StaleOpportunity(opportunity.id().to_string()).into());
        }
        if let Some(venue) = opportunity
            .venues()
            .find(|venue| !self.gateways.contains_key(*venue))
        {
            return Err(ExecutionError::NoGateway(venue.clone()).into());
        }

        let id = PositionId::new(self.next_position.fetch_add(1, Ordering::SeqCst));
        let reservation_id = self.ledger.reserve(id, trade.notional)?;

        let legs = opportunity
            .legs()
            .iter()
            .map(|leg| PositionLeg::from_opportunity(leg, trade.size))
            .collect();
        let position = Position::new(
            id,
            opportunity.id(),
            opportunity.strategy(),
            legs,
            reservation_id,
            trade.notional,
            Utc::now(),
        );

        info!(
            position_id = %id,
            opportunity_id = %opportunity.id(),
            strategy = %opportunity.strategy(),
            size = %trade.size,
            notional = %trade.notional,
            "Position opened"
        );

        let task = PositionTask {
            position: position.clone(),
            opportunity_id: opportunity.id(),
            expires_at: opportunity.expires_at(),
            gateways: Arc::clone(&self.gateways),
            ledger: Arc::clone(&self.ledger),
            config: self.config.clone(),
            retry: self.retry.clone(),
            kill_switch: self.kill_switch.clone(),
            kill_rx: self.kill_switch.subscribe(),
            events: self.events.clone(),
            updates: self.updates.subscribe(),
        };
        Ok((position, task))
    }
}
