//! Risk and sizing gate.
//!
//! Every opportunity that survives detection passes through [`RiskGate`],
//! which either sizes it with a capped fractional Kelly rule or rejects it
//! with a labelled [`RejectReason`].

mod gate;
mod kelly;

pub use gate::{RejectReason, Rejection, RiskGate, SizedTrade};
pub use kelly::{kelly_fraction, KellySizer};
