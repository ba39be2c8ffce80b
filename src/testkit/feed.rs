//! Mock [`MarketDataFeed`] implementations for testing.
//!
//! - [`ScriptedFeed`]: pre-loaded connect/subscribe results and events.
//!   Best for: reconnection logic, error handling.
//!
//! - [`ChannelFeed`]: channel-backed feed with an external control handle.
//!   Best for: engine tests needing on-demand event delivery.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::domain::{InstrumentId, VenueId};
use crate::error::Result;
use crate::exchange::{FeedEvent, MarketDataFeed};

// ---------------------------------------------------------------------------
// ScriptedFeed
// ---------------------------------------------------------------------------

/// A mock feed with scripted connect/subscribe results and a fixed event queue.
///
/// Each call to `connect()` or `subscribe()` pops the next result from the
/// corresponding queue (defaults to `Ok(())` when exhausted). `next_event()`
/// yields `None` once the queue is empty.
pub struct ScriptedFeed {
    venue: VenueId,
    connect_results: VecDeque<Result<()>>,
    subscribe_results: VecDeque<Result<()>>,
    events: VecDeque<Option<FeedEvent>>,
    connect_count: Arc<AtomicU32>,
    subscribe_count: Arc<AtomicU32>,
}

impl ScriptedFeed {
    pub fn new(venue: &str) -> Self {
        Self {
            venue: VenueId::from(venue),
            connect_results: VecDeque::new(),
            subscribe_results: VecDeque::new(),
            events: VecDeque::new(),
            connect_count: Arc::new(AtomicU32::new(0)),
            subscribe_count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_connect_results(mut self, results: Vec<Result<()>>) -> Self {
        self.connect_results = results.into();
        self
    }

    pub fn with_subscribe_results(mut self, results: Vec<Result<()>>) -> Self {
        self.subscribe_results = results.into();
        self
    }

    pub fn with_events(mut self, events: Vec<Option<FeedEvent>>) -> Self {
        self.events = events.into();
        self
    }

    /// Shared counters for asserting connect/subscribe call counts.
    pub fn counts(&self) -> (Arc<AtomicU32>, Arc<AtomicU32>) {
        (self.connect_count.clone(), self.subscribe_count.clone())
    }
}

#[async_trait]
impl MarketDataFeed for ScriptedFeed {
    async fn connect(&mut self) -> Result<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        self.connect_results.pop_front().unwrap_or(Ok(()))
    }

    async fn subscribe(&mut self, _instruments: &[InstrumentId]) -> Result<()> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        self.subscribe_results.pop_front().unwrap_or(Ok(()))
    }

    async fn next_event(&mut self) -> Option<FeedEvent> {
        self.events.pop_front().flatten()
    }

    fn venue(&self) -> &VenueId {
        &self.venue
    }
}

// ---------------------------------------------------------------------------
// ChannelFeed
// ---------------------------------------------------------------------------

/// A mock feed controlled externally via a [`ChannelFeedHandle`].
pub struct ChannelFeed {
    venue: VenueId,
    event_rx: mpsc::Receiver<Option<FeedEvent>>,
    connect_count: Arc<AtomicU32>,
    subscribed: Arc<Mutex<Vec<InstrumentId>>>,
}

/// Control handle for a [`ChannelFeed`].
#[derive(Clone)]
pub struct ChannelFeedHandle {
    event_tx: mpsc::Sender<Option<FeedEvent>>,
    connect_count: Arc<AtomicU32>,
    subscribed: Arc<Mutex<Vec<InstrumentId>>>,
}

impl ChannelFeedHandle {
    /// Send an event to the feed.
    pub async fn send(&self, event: FeedEvent) {
        let _ = self.event_tx.send(Some(event)).await;
    }

    /// Signal end-of-stream (causes `next_event` to return `None`).
    pub async fn close(&self) {
        let _ = self.event_tx.send(None).await;
    }

    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Instruments from the last `subscribe` call.
    pub fn subscribed(&self) -> Vec<InstrumentId> {
        self.subscribed.lock().clone()
    }
}

/// Create a [`ChannelFeed`] for `venue` and its control handle.
pub fn channel_feed(venue: &str, buffer: usize) -> (ChannelFeed, ChannelFeedHandle) {
    let (tx, rx) = mpsc::channel(buffer);
    let connect_count = Arc::new(AtomicU32::new(0));
    let subscribed = Arc::new(Mutex::new(Vec::new()));
    (
        ChannelFeed {
            venue: VenueId::from(venue),
            event_rx: rx,
            connect_count: connect_count.clone(),
            subscribed: subscribed.clone(),
        },
        ChannelFeedHandle {
            event_tx: tx,
            connect_count,
            subscribed,
        },
    )
}

#[async_trait]
impl MarketDataFeed for ChannelFeed {
    async fn connect(&mut self) -> Result<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&mut self, instruments: &[InstrumentId]) -> Result<()> {
        *self.subscribed.lock() = instruments.to_vec();
        Ok(())
    }

    async fn next_event(&mut self) -> Option<FeedEvent> {
        match self.event_rx.recv().await {
            Some(Some(event)) => Some(event),
            Some(None) | None => None,
        }
    }

    fn venue(&self) -> &VenueId {
        &self.venue
    }
}
