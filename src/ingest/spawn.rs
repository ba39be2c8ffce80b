//! One task per venue feed.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::{InstrumentId, VenueId};
use crate::exchange::{FeedEvent, MarketDataFeed};

/// A feed event tagged with its venue.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueEvent {
    pub venue: VenueId,
    pub event: FeedEvent,
}

/// Run `feed` on its own task, forwarding every event to `tx`.
///
/// The task connects, subscribes to `instruments`, then pumps events until
/// shutdown is signalled, the feed ends, or the receiver is dropped. A slow
/// or dead venue only ever blocks its own task.
pub fn spawn_feed<F>(
    mut feed: F,
    instruments: Vec<InstrumentId>,
    tx: mpsc::Sender<VenueEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    F: MarketDataFeed + 'static,
{
    tokio::spawn(async move {
        let venue = feed.venue().clone();

        if let Err(err) = feed.connect().await {
            warn!(%venue, error = %err, "Initial connect failed");
        }
        if let Err(err) = feed.subscribe(&instruments).await {
            warn!(%venue, error = %err, "Initial subscribe failed");
        }
        info!(%venue, instruments = instruments.len(), "Feed task started");

        loop {
            tokio::select! {
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        info!(%venue, "Feed task shutting down");
                        break;
                    }
                }
                event = feed.next_event() => {
                    let event = match event {
                        Some(event) => event,
                        None => {
                            warn!(%venue, "Market data feed ended");
                            let _ = tx
                                .send(VenueEvent {
                                    venue: venue.clone(),
                                    event: FeedEvent::Disconnected { reason: "feed ended".into() },
                                })
                                .await;
                            break;
                        }
                    };
                    if tx.send(VenueEvent { venue: venue.clone(), event }).await.is_err() {
                        info!(%venue, "Engine channel closed, stopping feed");
                        break;
                    }
                }
            }
        }
    })
}
