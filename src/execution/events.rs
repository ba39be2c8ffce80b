//! Messages between the engine and position tasks.

use crate::domain::{AssetId, InstrumentKey, Position, PositionId, PositionStatus, Tick};

/// Market data fanned out to live positions.
#[derive(Debug, Clone)]
pub enum MarketUpdate {
    Tick(Tick),
    /// The venue settled an instrument.
    Resolved {
        key: InstrumentKey,
        winning_asset: AssetId,
    },
}

/// Lifecycle change published by a position task.
#[derive(Debug, Clone)]
pub enum PositionEvent {
    /// Leg fills or status changed.
    Updated(Position),
    /// Exited and committed to the ledger.
    Closed(Position),
    /// Rolled back.
    Failed(Position),
}

impl PositionEvent {
    #[must_use]
    pub fn position(&self) -> &Position {
        match self {
            Self::Updated(p) | Self::Closed(p) | Self::Failed(p) => p,
        }
    }

    #[must_use]
    pub fn position_id(&self) -> PositionId {
        self.position().id()
    }

    #[must_use]
    pub fn status(&self) -> PositionStatus {
        self.position().status()
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Updated(_) => "updated",
            Self::Closed(_) => "closed",
            Self::Failed(_) => "failed",
        }
    }
}
