//! Per-venue feed health.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::VenueId;

/// Why a venue is degraded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DegradedReason {
    /// The feed has not connected yet.
    AwaitingConnection,
    /// The feed reported a lost connection.
    Disconnected(String),
    /// No events for longer than the staleness threshold.
    Stale,
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingConnection => f.write_str("awaiting connection"),
            Self::Disconnected(reason) => write!(f, "disconnected: {reason}"),
            Self::Stale => f.write_str("stale"),
        }
    }
}

/// Health of one venue's feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VenueStatus {
    Healthy,
    Degraded {
        reason: DegradedReason,
        since: DateTime<Utc>,
    },
}

impl VenueStatus {
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    status: VenueStatus,
    last_event: Option<DateTime<Utc>>,
}

/// Health board for all venues, owned by the engine task.
///
/// Unknown venues count as degraded.
#[derive(Debug, Default)]
pub struct VenueHealth {
    venues: HashMap<VenueId, Entry>,
}

impl VenueHealth {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register venues as awaiting their first connection.
    pub fn with_venues<'a>(venues: impl IntoIterator<Item = &'a VenueId>, now: DateTime<Utc>) -> Self {
        let mut health = Self::new();
        for venue in venues {
            health.mark_degraded(venue, DegradedReason::AwaitingConnection, now);
        }
        health
    }

    pub fn mark_healthy(&mut self, venue: &VenueId, now: DateTime<Utc>) {
        let entry = self.entry(venue);
        entry.last_event = Some(now);
        if !entry.status.is_healthy() {
            entry.status = VenueStatus::Healthy;
            info!(%venue, "Venue healthy");
        }
    }

    /// Degrade a venue. A venue that is already degraded keeps its original
    /// `since` and takes the new reason.
    pub fn mark_degraded(&mut self, venue: &VenueId, reason: DegradedReason, now: DateTime<Utc>) {
        let entry = self.entry(venue);
        let since = match &entry.status {
            VenueStatus::Degraded { since, .. } => *since,
            VenueStatus::Healthy => {
                warn!(%venue, %reason, "Venue degraded");
                now
            }
        };
        entry.status = VenueStatus::Degraded { reason, since };
    }

    /// Record activity. A venue degraded only for staleness recovers; a
    /// disconnected venue waits for its `Connected` event.
    pub fn observe(&mut self, venue: &VenueId, now: DateTime<Utc>) {
        let entry = self.entry(venue);
        entry.last_event = Some(now);
        if let VenueStatus::Degraded {
            reason: DegradedReason::Stale,
            ..
        } = entry.status
        {
            entry.status = VenueStatus::Healthy;
            info!(%venue, "Venue recovered from staleness");
        }
    }

    #[must_use]
    pub fn is_degraded(&self, venue: &VenueId) -> bool {
        self.venues
            .get(venue)
            .map_or(true, |entry| !entry.status.is_healthy())
    }

    #[must_use]
    pub fn status(&self, venue: &VenueId) -> Option<&VenueStatus> {
        self.venues.get(venue).map(|entry| &entry.status)
    }

    /// Degrade healthy venues silent for longer than `stale_after`.
    ///
    /// Returns the venues degraded by this sweep.
    pub fn sweep_stale(&mut self, now: DateTime<Utc>, stale_after: Duration) -> Vec<VenueId> {
        let stale: Vec<VenueId> = self
            .venues
            .iter()
            .filter(|(_, entry)| entry.status.is_healthy())
            .filter(|(_, entry)| entry.last_event.map_or(true, |at| now - at > stale_after))
            .map(|(venue, _)| venue.clone())
            .collect();

        for venue in &stale {
            self.mark_degraded(venue, DegradedReason::Stale, now);
        }
        stale
    }

    /// Status of every known venue, sorted by venue id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(VenueId, VenueStatus)> {
        let mut venues: Vec<(VenueId, VenueStatus)> = self
            .venues
            .iter()
            .map(|(venue, entry)| (venue.clone(), entry.status.clone()))
            .collect();
        venues.sort_by(|a, b| a.0.cmp(&b.0));
        venues
    }

    fn entry(&mut self, venue: &VenueId) -> &mut Entry {
        self.venues.entry(venue.clone()).or_insert_with(|| Entry {
            status: VenueStatus::Degraded {
                reason: DegradedReason::AwaitingConnection,
                since: Utc::now(),
            },
            last_event: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn venue(id: &str) -> VenueId {
        VenueId::from(id)
    }

    #[test]
    fn unknown_and_new_venues_are_degraded() {
        let now = Utc::now();
        let health = VenueHealth::with_venues([&venue("pm")], now);

        assert!(health.is_degraded(&venue("pm")));
        assert!(health.is_degraded(&venue("nowhere")));
    }

    #[test]
    fn disconnect_degrades_until_marked_healthy() {
        let now = Utc::now();
        let mut health = VenueHealth::new();
        health.mark_healthy(&venue("pm"), now);
        assert!(!health.is_degraded(&venue("pm")));

        health.mark_degraded(&venue("pm"), DegradedReason::Disconnected("eof".into()), now);
        health.observe(&venue("pm"), now);
        assert!(health.is_degraded(&venue("pm")));

        health.mark_healthy(&venue("pm"), now);
        assert!(!health.is_degraded(&venue("pm")));
    }

    #[test]
    fn degraded_since_is_kept_across_reasons() {
        let t0 = Utc::now();
        let mut health = VenueHealth::new();
        health.mark_healthy(&venue("pm"), t0);
        health.mark_degraded(&venue("pm"), DegradedReason::Stale, t0);
        health.mark_degraded(
            &venue("pm"),
            DegradedReason::Disconnected("reset".into()),
            t0 + Duration::seconds(5),
        );

        match health.status(&venue("pm")) {
            Some(VenueStatus::Degraded { reason, since }) => {
                assert_eq!(*since, t0);
                assert!(matches!(reason, DegradedReason::Disconnected(_)));
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn sweep_degrades_silent_venues_and_activity_recovers_them() {
        let t0 = Utc::now();
        let mut health = VenueHealth::new();
        health.mark_healthy(&venue("pm"), t0);
        health.mark_healthy(&venue("bn"), t0 + Duration::seconds(25));

        let stale = health.sweep_stale(t0 + Duration::seconds(31), Duration::seconds(30));
        assert_eq!(stale, vec![venue("pm")]);
        assert!(health.is_degraded(&venue("pm")));
        assert!(!health.is_degraded(&venue("bn")));

        health.observe(&venue("pm"), t0 + Duration::seconds(32));
        assert!(!health.is_degraded(&venue("pm")));
    }

    #[test]
    fn snapshot_is_sorted() {
        let now = Utc::now();
        let mut health = VenueHealth::new();
        health.mark_healthy(&venue("zeta"), now);
        health.mark_healthy(&venue("alpha"), now);

        let names: Vec<String> = health
            .snapshot()
            .into_iter()
            .map(|(v, _)| v.to_string())
            .collect();
        assert_eq!(names, ["alpha", "zeta"]);
    }
}
