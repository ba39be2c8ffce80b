//! Execution coordinator.
//!
//! The [`Coordinator`] reserves capital for an approved trade and returns a
//! [`PositionTask`] that owns the position from submission to close:
//!
//! - legs are submitted concurrently, each under a [`RetryPolicy`]
//! - fills are learned by polling the venue, never assumed
//! - on timeout, rejection, expiry or the [`KillSwitch`], outstanding legs
//!   are cancelled and filled quantity is flattened
//! - filled positions are monitored against [`MarketUpdate`]s until an exit
//!   condition fires, then closed and committed to the ledger
//!
//! Tasks report progress to the engine as [`PositionEvent`]s.

mod coordinator;
mod events;
mod exit;
mod kill_switch;
mod retry;
mod task;

pub use coordinator::Coordinator;
pub use events::{MarketUpdate, PositionEvent};
pub use exit::{exit_condition, holdings, mark_to_market, Holding, Marks};
pub use kill_switch::KillSwitch;
pub use retry::{is_transient, RetryPolicy};
pub use task::PositionTask;
