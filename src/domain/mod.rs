//! Exchange-agnostic domain types.
//!
//! Everything here is plain data: identifiers, normalized ticks, fee model,
//! opportunities and positions. No I/O, no async.

mod fee;
mod ids;
mod money;
mod opportunity;
mod position;
mod tick;

pub use fee::FeeModel;
pub use ids::{AssetId, InstrumentId, OpportunityId, OrderId, PositionId, ReservationId, VenueId};
pub use money::{Price, Volume, MAX_BINARY_PRICE, MIN_BINARY_PRICE};
pub use opportunity::{
    Opportunity, OpportunityBuildError, OpportunityBuilder, OpportunityLeg, StrategyKind,
};
pub use position::{ExitReason, LegStatus, Position, PositionLeg, PositionStatus};
pub use tick::{InstrumentKey, Level, Outcome, Quote, Side, Tick, TickBook};
