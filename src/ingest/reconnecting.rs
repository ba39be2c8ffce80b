//! Reconnecting wrapper for [`MarketDataFeed`].
//!
//! Adds exponential backoff, a circuit breaker and connection epochs to any
//! feed. Connection changes are surfaced as `Connected` / `Disconnected`
//! events so the engine can degrade and resync the venue.

use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::app::ReconnectionConfig;
use crate::domain::{InstrumentId, VenueId};
use crate::error::Result;
use crate::exchange::{FeedEvent, MarketDataFeed};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    /// Normal operation, connections allowed.
    Closed,
    /// Too many failures, blocking connections temporarily.
    Open { until: Instant },
}

/// Wrapper that adds reconnection logic to any [`MarketDataFeed`].
///
/// Every successful connect opens a new epoch, announced with
/// `FeedEvent::Connected { epoch }` before any tick of that epoch. Ticks are
/// stamped with the current epoch on the way out.
pub struct ReconnectingFeed<F: MarketDataFeed> {
    inner: F,
    config: ReconnectionConfig,
    /// Instruments to resubscribe after reconnection.
    instruments: Vec<InstrumentId>,
    consecutive_failures: u32,
    current_delay_ms: u64,
    circuit_state: CircuitState,
    connected: bool,
    epoch: u64,
    /// Connection events waiting to be handed out.
    pending: VecDeque<FeedEvent>,
}

impl<F: MarketDataFeed> ReconnectingFeed<F> {
    pub fn new(inner: F, config: ReconnectionConfig) -> Self {
        let initial_delay = config.initial_delay_ms;
        Self {
            inner,
            config,
            instruments: Vec::new(),
            consecutive_failures: 0,
            current_delay_ms: initial_delay,
            circuit_state: CircuitState::Closed,
            connected: false,
            epoch: 0,
            pending: VecDeque::new(),
        }
    }

    /// Epoch of the current (or last) connection. Zero before the first.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn reset_backoff(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay_ms = self.config.initial_delay_ms;
        self.circuit_state = CircuitState::Closed;
    }

    fn next_delay(&mut self) -> Duration {
        let base_delay = Duration::from_millis(self.current_delay_ms);
        let jitter_ms = self.jitter_ms(base_delay);
        let delay = base_delay + Duration::from_millis(jitter_ms);

        self.current_delay_ms = self.config.grow_delay_ms(self.current_delay_ms);

        delay
    }

    /// Up to 20% of the base delay.
    fn jitter_ms(&self, base_delay: Duration) -> u64 {
        let jitter_range_ms = (base_delay.as_millis() as u64) / 5;
        if jitter_range_ms == 0 {
            return 0;
        }

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        u64::from(nanos) % (jitter_range_ms + 1)
    }

    fn circuit_allows_connection(&mut self) -> bool {
        match self.circuit_state {
            CircuitState::Closed => true,
            CircuitState::Open { until } => {
                if Instant::now() >= until {
                    info!(venue = %self.inner.venue(), "Circuit breaker cooldown expired");
                    self.reset_backoff();
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.connected = false;

        if self.consecutive_failures >= self.config.max_consecutive_failures {
            let cooldown = self.config.cooldown();
            self.circuit_state = CircuitState::Open {
                until: Instant::now() + cooldown,
            };
            error!(
                venue = %self.inner.venue(),
                failures = self.consecutive_failures,
                cooldown_secs = cooldown.as_secs(),
                "Circuit breaker tripped, pausing reconnection attempts"
            );
        }
    }

    /// Mark the link up and queue the epoch announcement.
    fn open_epoch(&mut self) {
        self.connected = true;
        self.epoch += 1;
        self.reset_backoff();
        self.pending.push_back(FeedEvent::Connected { epoch: self.epoch });
        info!(venue = %self.inner.venue(), epoch = self.epoch, "Feed connected");
    }

    /// Mark the link down and queue a `Disconnected` for downstream.
    fn lose_connection(&mut self, reason: String) {
        warn!(venue = %self.inner.venue(), %reason, "Connection lost, will reconnect");
        self.record_failure();
        self.pending.push_back(FeedEvent::Disconnected { reason });
    }

    async fn reconnect(&mut self) -> Result<()> {
        if !self.circuit_allows_connection() {
            if let CircuitState::Open { until } = self.circuit_state {
                let remaining = until.saturating_duration_since(Instant::now());
                warn!(
                    venue = %self.inner.venue(),
                    remaining_secs = remaining.as_secs(),
                    "Circuit breaker open, waiting for cooldown"
                );
                sleep(remaining).await;
                self.reset_backoff();
            }
        }

        let delay = self.next_delay();
        info!(
            venue = %self.inner.venue(),
            delay_ms = delay.as_millis() as u64,
            attempt = self.consecutive_failures + 1,
            "Reconnecting after delay"
        );
        sleep(delay).await;

        if let Err(err) = self.inner.connect().await {
            error!(venue = %self.inner.venue(), error = %err, "Reconnection failed");
            self.record_failure();
            return Err(err);
        }

        if !self.instruments.is_empty() {
            debug!(
                venue = %self.inner.venue(),
                instruments = self.instruments.len(),
                "Resubscribing to instruments"
            );
            if let Err(err) = self.inner.subscribe(&self.instruments).await {
                error!(venue = %self.inner.venue(), error = %err, "Resubscribe failed after reconnect");
                self.record_failure();
                return Err(err);
            }
        }

        self.open_epoch();
        Ok(())
    }
}

#[async_trait]
impl<F: MarketDataFeed> MarketDataFeed for ReconnectingFeed<F> {
    async fn connect(&mut self) -> Result<()> {
        match self.inner.connect().await {
            Ok(()) => {
                self.open_epoch();
                Ok(())
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    async fn subscribe(&mut self, instruments: &[InstrumentId]) -> Result<()> {
        self.instruments = instruments.to_vec();
        if !self.connected {
            // Applied on the next successful connect.
            return Ok(());
        }
        self.inner.subscribe(instruments).await
    }

    async fn next_event(&mut self) -> Option<FeedEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            if !self.connected {
                if let Err(err) = self.reconnect().await {
                    warn!(venue = %self.inner.venue(), error = %err, "Reconnection attempt failed, will retry");
                }
                continue;
            }

            match self.inner.next_event().await {
                Some(FeedEvent::Disconnected { reason }) => self.lose_connection(reason),
                None => self.lose_connection("stream ended".into()),
                // Epochs are owned by this wrapper.
                Some(FeedEvent::Connected { .. }) => {}
                Some(FeedEvent::Tick(mut tick)) => {
                    if self.consecutive_failures > 0 {
                        self.reset_backoff();
                    }
                    tick.epoch = self.epoch;
                    return Some(FeedEvent::Tick(tick));
                }
                Some(event) => return Some(event),
            }
        }
    }

    fn venue(&self) -> &VenueId {
        self.inner.venue()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::testkit;
    use crate::testkit::feed::ScriptedFeed;

    fn backoff_config() -> ReconnectionConfig {
        ReconnectionConfig {
            initial_delay_ms: 10,
            max_delay_ms: 100,
            backoff_multiplier: 2.0,
            max_consecutive_failures: 3,
            circuit_breaker_cooldown_ms: 50,
        }
    }

    fn tick_event(seq: u64) -> Option<FeedEvent> {
        Some(FeedEvent::Tick(testkit::domain::spot_tick("binance", "BTCUSDT", seq)))
    }

    #[tokio::test]
    async fn connect_announces_first_epoch() {
        let mock = ScriptedFeed::new("binance").with_events(vec![tick_event(1)]);
        let mut feed = ReconnectingFeed::new(mock, backoff_config());
        feed.connect().await.unwrap();

        assert_eq!(feed.next_event().await, Some(FeedEvent::Connected { epoch: 1 }));
        match feed.next_event().await {
            Some(FeedEvent::Tick(tick)) => assert_eq!(tick.epoch, 1),
            other => panic!("expected tick, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_is_surfaced_then_new_epoch_opens() {
        let mock = ScriptedFeed::new("binance").with_events(vec![
            tick_event(1),
            Some(FeedEvent::Disconnected {
                reason: "reset by peer".into(),
            }),
            tick_event(2),
        ]);
        let (connects, subscribes) = mock.counts();

        let mut feed = ReconnectingFeed::new(mock, backoff_config());
        feed.connect().await.unwrap();
        feed.subscribe(&[InstrumentId::from("BTCUSDT")]).await.unwrap();

        let mut kinds = Vec::new();
        let mut last_epoch = 0;
        for _ in 0..5 {
            let event = feed.next_event().await.unwrap();
            if let FeedEvent::Tick(tick) = &event {
                last_epoch = tick.epoch;
            }
            kinds.push(event.kind());
        }

        assert_eq!(
            kinds,
            ["connected", "tick", "disconnected", "connected", "tick"]
        );
        assert_eq!(last_epoch, 2);
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(subscribes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn subscribe_before_connect_is_deferred() {
        let mock = ScriptedFeed::new("binance")
            .with_connect_results(vec![Err(crate::error::Error::Connection("refused".into()))])
            .with_events(vec![tick_event(1)]);
        let (connects, subscribes) = mock.counts();

        let mut feed = ReconnectingFeed::new(mock, backoff_config());
        assert!(feed.connect().await.is_err());
        feed.subscribe(&[InstrumentId::from("BTCUSDT")]).await.unwrap();
        assert_eq!(subscribes.load(Ordering::SeqCst), 0);

        assert_eq!(feed.next_event().await, Some(FeedEvent::Connected { epoch: 1 }));
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(subscribes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exponential_backoff_is_capped() {
        let mut feed = ReconnectingFeed::new(ScriptedFeed::new("binance"), backoff_config());

        let assert_delay_in_range = |delay: Duration, base_ms: u64| {
            let max_ms = base_ms + (base_ms / 5);
            assert!(
                (base_ms..=max_ms).contains(&(delay.as_millis() as u64)),
                "delay {delay:?} not within {base_ms}..={max_ms} ms"
            );
        };

        assert_delay_in_range(feed.next_delay(), 10);
        assert_delay_in_range(feed.next_delay(), 20);
        assert_delay_in_range(feed.next_delay(), 40);
        assert_delay_in_range(feed.next_delay(), 80);
        assert_delay_in_range(feed.next_delay(), 100);
    }

    #[tokio::test]
    async fn circuit_breaker_trips_after_consecutive_failures() {
        let mut feed = ReconnectingFeed::new(ScriptedFeed::new("binance"), backoff_config());

        for _ in 0..3 {
            feed.record_failure();
        }

        assert!(matches!(feed.circuit_state, CircuitState::Open { .. }));
        assert!(!feed.circuit_allows_connection());
    }

    #[tokio::test]
    async fn reset_backoff_restores_initial_delay() {
        let mut feed = ReconnectingFeed::new(ScriptedFeed::new("binance"), backoff_config());

        feed.consecutive_failures = 5;
        feed.current_delay_ms = 1000;
        feed.reset_backoff();

        assert_eq!(feed.consecutive_failures, 0);
        assert_eq!(feed.current_delay_ms, 10);
        assert!(matches!(feed.circuit_state, CircuitState::Closed));
    }
}
