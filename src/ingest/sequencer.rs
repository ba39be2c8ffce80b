//! Per-instrument tick ordering.

use std::collections::HashMap;

use tracing::debug;

use crate::domain::{InstrumentKey, Tick, VenueId};

/// Outcome of offering a tick to the [`Sequencer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Same sequence number as the last accepted tick.
    Duplicate,
    /// Sequence number below the last accepted tick.
    OutOfOrder { last: u64 },
    /// Tick from a connection epoch that has been superseded.
    StaleEpoch { current: u64 },
}

impl Admission {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Duplicate => "duplicate",
            Self::OutOfOrder { .. } => "out_of_order",
            Self::StaleEpoch { .. } => "stale_epoch",
        }
    }
}

/// Enforces strictly increasing sequence numbers per instrument within a
/// venue's connection epoch.
///
/// A tick from a newer epoch implicitly resyncs its venue. Ticks from older
/// epochs are always refused.
#[derive(Debug, Default)]
pub struct Sequencer {
    epochs: HashMap<VenueId, u64>,
    last: HashMap<InstrumentKey, u64>,
}

impl Sequencer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&mut self, tick: &Tick) -> Admission {
        let current = *self.epochs.entry(tick.venue.clone()).or_insert(tick.epoch);
        if tick.epoch < current {
            return Admission::StaleEpoch { current };
        }
        if tick.epoch > current {
            self.resync(&tick.venue, tick.epoch);
        }

        match self.last.get(&tick.key()) {
            Some(&last) if tick.sequence == last => Admission::Duplicate,
            Some(&last) if tick.sequence < last => Admission::OutOfOrder { last },
            _ => {
                self.last.insert(tick.key(), tick.sequence);
                Admission::Accepted
            }
        }
    }

    /// Start `epoch` for `venue`, forgetting its sequence state.
    ///
    /// Ignored if `epoch` is older than the venue's current epoch.
    pub fn resync(&mut self, venue: &VenueId, epoch: u64) {
        let current = self.epochs.entry(venue.clone()).or_insert(epoch);
        if epoch < *current {
            debug!(%venue, epoch, current = *current, "Ignoring resync to older epoch");
            return;
        }
        *current = epoch;
        self.last.retain(|key, _| &key.venue != venue);
        debug!(%venue, epoch, "Sequencer resynced");
    }

    /// Current epoch of a venue, if any tick or resync has been seen.
    #[must_use]
    pub fn epoch(&self, venue: &VenueId) -> Option<u64> {
        self.epochs.get(venue).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::domain::{binary_tick_at, spot_tick};
    use rust_decimal_macros::dec;

    fn tick(seq: u64, epoch: u64) -> Tick {
        let mut tick = spot_tick("binance", "BTCUSDT", seq);
        tick.epoch = epoch;
        tick
    }

    #[test]
    fn accepts_strictly_increasing_sequences() {
        let mut seq = Sequencer::new();
        assert_eq!(seq.admit(&tick(1, 1)), Admission::Accepted);
        assert_eq!(seq.admit(&tick(2, 1)), Admission::Accepted);
        assert_eq!(seq.admit(&tick(7, 1)), Admission::Accepted);
    }

    #[test]
    fn drops_duplicates_and_out_of_order() {
        let mut seq = Sequencer::new();
        seq.admit(&tick(5, 1));
        assert_eq!(seq.admit(&tick(5, 1)), Admission::Duplicate);
        assert_eq!(seq.admit(&tick(3, 1)), Admission::OutOfOrder { last: 5 });
        assert_eq!(seq.admit(&tick(6, 1)), Admission::Accepted);
    }

    #[test]
    fn instruments_are_sequenced_independently() {
        let mut seq = Sequencer::new();
        let a = binary_tick_at("pm", "m1", 10, dec!(0.4), dec!(0.5));
        let b = binary_tick_at("pm", "m2", 1, dec!(0.4), dec!(0.5));
        assert!(seq.admit(&a).is_accepted());
        assert!(seq.admit(&b).is_accepted());
    }

    #[test]
    fn new_epoch_resets_sequence_and_old_epoch_is_stale() {
        let mut seq = Sequencer::new();
        seq.admit(&tick(100, 1));

        assert_eq!(seq.admit(&tick(1, 2)), Admission::Accepted);
        assert_eq!(seq.epoch(&VenueId::from("binance")), Some(2));
        assert_eq!(seq.admit(&tick(101, 1)), Admission::StaleEpoch { current: 2 });
    }

    #[test]
    fn explicit_resync_clears_only_that_venue() {
        let mut seq = Sequencer::new();
        seq.admit(&tick(10, 1));
        let pm = binary_tick_at("pm", "m1", 10, dec!(0.4), dec!(0.5));
        seq.admit(&pm);

        seq.resync(&VenueId::from("binance"), 2);
        seq.resync(&VenueId::from("binance"), 1);

        assert_eq!(seq.epoch(&VenueId::from("binance")), Some(2));
        assert_eq!(seq.admit(&tick(1, 2)), Admission::Accepted);
        assert_eq!(seq.admit(&pm), Admission::Duplicate);
    }
}
