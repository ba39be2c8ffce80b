//! Engine activity counters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::risk::RejectReason;

/// Counters kept by the engine task. Reset only on restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Ticks accepted by the sequencer.
    pub ticks: u64,
    /// Ticks refused as duplicate, out of order or from an old epoch.
    pub dropped_ticks: u64,
    pub opportunities: u64,
    /// Opportunities that expired before reaching the gate.
    pub stale: u64,
    /// Opportunities dropped because trading was halted.
    pub halted: u64,
    /// Gate rejections keyed by reason tag.
    pub rejections: BTreeMap<String, u64>,
    pub positions_opened: u64,
    /// Approved trades the coordinator could not open.
    pub open_failures: u64,
    pub positions_closed: u64,
    pub positions_failed: u64,
}

impl Counters {
    #[must_use]
    pub fn new() -> Self {
        let rejections = RejectReason::ALL
            .iter()
            .map(|reason| (reason.as_str().to_string(), 0))
            .collect();
        Self {
            rejections,
            ..Self::default()
        }
    }

    pub fn reject(&mut self, reason: RejectReason) {
        *self.rejections.entry(reason.as_str().to_string()).or_insert(0) += 1;
    }

    #[must_use]
    pub fn rejections_for(&self, reason: RejectReason) -> u64 {
        self.rejections.get(reason.as_str()).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_rejections(&self) -> u64 {
        self.rejections.values().sum()
    }
}
