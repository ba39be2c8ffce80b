//! Multi-leg positions and their lifecycle state machine.
//!
//! ```text
//! PENDING -> PARTIALLY_FILLED -> FILLED -> RESOLVING -> CLOSED
//!    |              |                          |
//!    +--------------+--------> FAILED <--------+ (only before CLOSED)
//! ```
//!
//! A position's legs end either all filled or rolled back: `FAILED` is only
//! reached through the compensating path, never by leaving legs hanging.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{AssetId, InstrumentId, OpportunityId, OrderId, PositionId, ReservationId, VenueId};
use super::money::{Price, Volume};
use super::opportunity::{OpportunityLeg, StrategyKind};
use super::tick::{InstrumentKey, Side};
use crate::error::ExecutionError;

/// Status of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    /// Legs being submitted.
    Pending,
    /// At least one leg confirmed, others outstanding.
    PartiallyFilled,
    /// All legs confirmed.
    Filled,
    /// Waiting for settlement or an exit trigger.
    Resolving,
    /// Realized and committed to the ledger.
    Closed,
    /// Rolled back.
    Failed,
}

impl PositionStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Resolving => "RESOLVING",
            Self::Closed => "CLOSED",
            Self::Failed => "FAILED",
        }
    }

    /// Terminal states never transition again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(&self, next: PositionStatus) -> bool {
        use PositionStatus::*;
        matches!(
            (self, next),
            (Pending, PartiallyFilled)
                | (Pending, Filled)
                | (Pending, Failed)
                | (PartiallyFilled, Filled)
                | (PartiallyFilled, Failed)
                | (Filled, Resolving)
                | (Resolving, Closed)
        )
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegStatus {
    /// Not yet acknowledged by the venue.
    Pending,
    /// Acknowledged, resting or partially filled.
    Working,
    /// Fully filled.
    Filled,
    /// Cancelled or rejected before filling completely.
    Cancelled,
    /// Filled quantity flattened by a compensating order.
    Flattened,
}

/// A single leg of a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionLeg {
    venue: VenueId,
    instrument: InstrumentId,
    asset: AssetId,
    side: Side,
    price: Price,
    size: Volume,
    order_id: Option<OrderId>,
    filled: Volume,
    avg_price: Price,
    status: LegStatus,
}

impl PositionLeg {
    /// Create a new pending leg.
    #[must_use]
    pub fn new(
        venue: VenueId,
        instrument: InstrumentId,
        asset: AssetId,
        side: Side,
        price: Price,
        size: Volume,
    ) -> Self {
        Self {
            venue,
            instrument,
            asset,
            side,
            price,
            size,
            order_id: None,
            filled: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            status: LegStatus::Pending,
        }
    }

    /// Create a leg from an opportunity leg sized to `size`.
    #[must_use]
    pub fn from_opportunity(leg: &OpportunityLeg, size: Volume) -> Self {
        Self::new(
            leg.venue.clone(),
            leg.instrument.clone(),
            leg.asset.clone(),
            leg.side,
            leg.price,
            size,
        )
    }

    #[must_use]
    pub fn venue(&self) -> &VenueId {
        &self.venue
    }

    #[must_use]
    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    #[must_use]
    pub fn key(&self) -> InstrumentKey {
        InstrumentKey::new(self.venue.clone(), self.instrument.clone())
    }

    #[must_use]
    pub fn asset(&self) -> &AssetId {
        &self.asset
    }

    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Limit price.
    #[must_use]
    pub fn price(&self) -> Price {
        self.price
    }

    /// Target size.
    #[must_use]
    pub fn size(&self) -> Volume {
        self.size
    }

    #[must_use]
    pub fn order_id(&self) -> Option<&OrderId> {
        self.order_id.as_ref()
    }

    /// Quantity confirmed filled by the venue.
    #[must_use]
    pub fn filled(&self) -> Volume {
        self.filled
    }

    /// Average fill price of the filled quantity.
    #[must_use]
    pub fn avg_price(&self) -> Price {
        self.avg_price
    }

    #[must_use]
    pub fn status(&self) -> LegStatus {
        self.status
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.status == LegStatus::Filled
    }

    /// Signed cash flow of the filled quantity (negative for buys).
    #[must_use]
    pub fn cash_flow(&self) -> Price {
        self.side.cash_sign() * self.filled * self.avg_price
    }

    /// Record the venue acknowledgment.
    pub fn acknowledge(&mut self, order_id: OrderId) {
        self.order_id = Some(order_id);
        if self.status == LegStatus::Pending {
            self.status = LegStatus::Working;
        }
    }

    /// Record the cumulative fill reported by the venue.
    pub fn record_fill(&mut self, filled: Volume, avg_price: Price) {
        self.filled = filled.min(self.size);
        self.avg_price = avg_price;
        if self.filled >= self.size {
            self.status = LegStatus::Filled;
        } else if self.status == LegStatus::Pending {
            self.status = LegStatus::Working;
        }
    }

    /// Mark the leg cancelled; filled quantity, if any, is kept.
    pub fn cancel(&mut self) {
        if self.status != LegStatus::Filled {
            self.status = LegStatus::Cancelled;
        }
    }

    /// Mark any filled quantity as flattened.
    pub fn flatten(&mut self) {
        self.status = LegStatus::Flattened;
    }
}

/// Why a position left the market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TimeLimit,
    Resolution { winning_asset: AssetId },
    KillSwitch,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TakeProfit => write!(f, "take-profit"),
            Self::StopLoss => write!(f, "stop-loss"),
            Self::TimeLimit => write!(f, "time-limit"),
            Self::Resolution { winning_asset } => write!(f, "resolution({winning_asset})"),
            Self::KillSwitch => write!(f, "kill-switch"),
        }
    }
}

/// A multi-leg position spawned from an opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    id: PositionId,
    opportunity_id: OpportunityId,
    strategy: StrategyKind,
    legs: Vec<PositionLeg>,
    reservation_id: ReservationId,
    reserved: Price,
    status: PositionStatus,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    realized_pnl: Option<Price>,
    exit_reason: Option<ExitReason>,
    failure: Option<String>,
}

impl Position {
    /// Create a new pending position.
    #[must_use]
    pub fn new(
        id: PositionId,
        opportunity_id: OpportunityId,
        strategy: StrategyKind,
        legs: Vec<PositionLeg>,
        reservation_id: ReservationId,
        reserved: Price,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            opportunity_id,
            strategy,
            legs,
            reservation_id,
            reserved,
            status: PositionStatus::Pending,
            opened_at,
            closed_at: None,
            realized_pnl: None,
            exit_reason: None,
            failure: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> PositionId {
        self.id
    }

    #[must_use]
    pub fn opportunity_id(&self) -> OpportunityId {
        self.opportunity_id
    }

    #[must_use]
    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    #[must_use]
    pub fn legs(&self) -> &[PositionLeg] {
        &self.legs
    }

    pub fn legs_mut(&mut self) -> &mut [PositionLeg] {
        &mut self.legs
    }

    #[must_use]
    pub fn reservation_id(&self) -> ReservationId {
        self.reservation_id
    }

    /// Capital reserved in the ledger for this position.
    #[must_use]
    pub fn reserved(&self) -> Price {
        self.reserved
    }

    #[must_use]
    pub fn status(&self) -> PositionStatus {
        self.status
    }

    #[must_use]
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    #[must_use]
    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    #[must_use]
    pub fn realized_pnl(&self) -> Option<Price> {
        self.realized_pnl
    }

    #[must_use]
    pub fn exit_reason(&self) -> Option<&ExitReason> {
        self.exit_reason.as_ref()
    }

    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// True when every leg is fully filled.
    #[must_use]
    pub fn all_legs_filled(&self) -> bool {
        self.legs.iter().all(PositionLeg::is_filled)
    }

    /// True when some but not all legs have filled quantity.
    #[must_use]
    pub fn any_leg_filled(&self) -> bool {
        self.legs.iter().any(|l| l.filled() > Decimal::ZERO)
    }

    /// Net cash spent on entry (positive when capital went out).
    #[must_use]
    pub fn entry_cost(&self) -> Price {
        -self.legs.iter().map(PositionLeg::cash_flow).sum::<Price>()
    }

    /// Apply a validated state transition.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::IllegalTransition` when the state machine does
    /// not allow `self.status -> next`. Re-entering the current state is a
    /// no-op.
    pub fn transition(&mut self, next: PositionStatus) -> Result<(), ExecutionError> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(ExecutionError::IllegalTransition {
                position_id: self.id,
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Derive PENDING / PARTIALLY_FILLED / FILLED from leg fills.
    ///
    /// # Errors
    ///
    /// Propagates an illegal transition.
    pub fn refresh_fill_status(&mut self) -> Result<PositionStatus, ExecutionError> {
        if self.all_legs_filled() {
            self.transition(PositionStatus::Filled)?;
        } else if self.any_leg_filled() {
            self.transition(PositionStatus::PartiallyFilled)?;
        }
        Ok(self.status)
    }

    /// Close with realized P&L.
    ///
    /// # Errors
    ///
    /// Fails unless the position is RESOLVING.
    pub fn close(
        &mut self,
        pnl: Price,
        reason: ExitReason,
        at: DateTime<Utc>,
    ) -> Result<(), ExecutionError> {
        self.transition(PositionStatus::Closed)?;
        self.realized_pnl = Some(pnl);
        self.exit_reason = Some(reason);
        self.closed_at = Some(at);
        Ok(())
    }

    /// Mark rolled back, recording the P&L of the unwind.
    ///
    /// # Errors
    ///
    /// Fails if the position already reached FILLED or a terminal state.
    pub fn fail(
        &mut self,
        reason: impl Into<String>,
        unwind_pnl: Price,
        at: DateTime<Utc>,
    ) -> Result<(), ExecutionError> {
        self.transition(PositionStatus::Failed)?;
        self.failure = Some(reason.into());
        self.realized_pnl = Some(unwind_pnl);
        self.closed_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn leg(asset: &str, price: Decimal) -> PositionLeg {
        PositionLeg::new(
            VenueId::from("polymarket"),
            InstrumentId::from("0xm"),
            AssetId::from(asset),
            Side::Buy,
            price,
            dec!(10),
        )
    }

    fn position() -> Position {
        Position::new(
            PositionId::new(1),
            OpportunityId::generate(),
            StrategyKind::Structural,
            vec![leg("yes", dec!(0.40)), leg("no", dec!(0.50))],
            ReservationId::new(1),
            dec!(9),
            Utc::now(),
        )
    }

    #[test]
    fn legal_transitions_follow_the_state_machine() {
        use PositionStatus::*;
        assert!(Pending.can_transition_to(PartiallyFilled));
        assert!(Pending.can_transition_to(Filled));
        assert!(PartiallyFilled.can_transition_to(Failed));
        assert!(Filled.can_transition_to(Resolving));
        assert!(Resolving.can_transition_to(Closed));

        assert!(!Filled.can_transition_to(Failed));
        assert!(!Closed.can_transition_to(Resolving));
        assert!(!Pending.can_transition_to(Closed));
        assert!(!Failed.can_transition_to(Pending));
    }

    #[test]
    fn illegal_transition_is_an_error() {
        let mut pos = position();
        let err = pos.transition(PositionStatus::Closed).unwrap_err();
        assert!(matches!(err, ExecutionError::IllegalTransition { .. }));
        assert_eq!(pos.status(), PositionStatus::Pending);
    }

    #[test]
    fn fills_drive_partial_then_filled() {
        let mut pos = position();

        pos.legs_mut()[0].record_fill(dec!(10), dec!(0.40));
        assert_eq!(pos.refresh_fill_status().unwrap(), PositionStatus::PartiallyFilled);

        pos.legs_mut()[1].record_fill(dec!(10), dec!(0.50));
        assert_eq!(pos.refresh_fill_status().unwrap(), PositionStatus::Filled);
        assert_eq!(pos.entry_cost(), dec!(9.00));
    }

    #[test]
    fn partial_leg_fill_keeps_leg_working() {
        let mut leg = leg("yes", dec!(0.40));
        leg.acknowledge(OrderId::from("o-1"));
        leg.record_fill(dec!(4), dec!(0.40));

        assert_eq!(leg.status(), LegStatus::Working);
        assert_eq!(leg.cash_flow(), dec!(-1.60));

        leg.cancel();
        assert_eq!(leg.status(), LegStatus::Cancelled);
        assert_eq!(leg.filled(), dec!(4));
    }

    #[test]
    fn close_requires_resolving() {
        let mut pos = position();
        assert!(pos.close(dec!(1), ExitReason::TakeProfit, Utc::now()).is_err());

        for leg in pos.legs_mut() {
            let price = leg.price();
            leg.record_fill(dec!(10), price);
        }
        pos.refresh_fill_status().unwrap();
        pos.transition(PositionStatus::Resolving).unwrap();
        pos.close(dec!(1), ExitReason::TakeProfit, Utc::now()).unwrap();

        assert_eq!(pos.status(), PositionStatus::Closed);
        assert_eq!(pos.realized_pnl(), Some(dec!(1)));
        assert!(pos.closed_at().is_some());
    }

    #[test]
    fn failed_after_partial_fill_records_unwind_pnl() {
        let mut pos = position();
        pos.legs_mut()[0].record_fill(dec!(10), dec!(0.40));
        pos.refresh_fill_status().unwrap();

        pos.fail("leg fill timeout", dec!(-0.10), Utc::now()).unwrap();
        assert_eq!(pos.status(), PositionStatus::Failed);
        assert_eq!(pos.failure(), Some("leg fill timeout"));
        assert!(pos.status().is_terminal());
    }
}
