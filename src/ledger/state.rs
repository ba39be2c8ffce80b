//! Ledger state and deterministic replay.
//!
//! [`LedgerState`] is pure data. Every mutation, live or replayed, goes
//! through [`LedgerState::apply`], so replaying the audit log from genesis
//! reproduces the live state exactly.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::audit::{AuditEntry, AuditKind};
use crate::domain::{PositionId, ReservationId};
use crate::error::LedgerError;

/// Capital held for one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    pub position_id: PositionId,
    pub amount: Decimal,
    pub at: DateTime<Utc>,
}

/// Cash, open notional and realized P&L.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerState {
    pub initial_capital: Decimal,
    pub cash: Decimal,
    /// Sum of active reservations.
    pub open_notional: Decimal,
    /// Realized P&L since the last daily reset.
    pub daily_pnl: Decimal,
    pub cumulative_pnl: Decimal,
    pub trading_day: NaiveDate,
    pub reservations: BTreeMap<ReservationId, Reservation>,
    pub last_seq: u64,
    next_reservation: u64,
}

impl LedgerState {
    /// Build the initial state from a genesis entry.
    ///
    /// # Errors
    ///
    /// Fails if the entry is not a well-formed genesis.
    pub fn from_genesis(entry: &AuditEntry) -> Result<Self, LedgerError> {
        if entry.kind != AuditKind::Genesis || entry.seq != 1 {
            return Err(violation(format!(
                "log must start with genesis at seq 1, found {} at seq {}",
                entry.kind, entry.seq
            )));
        }
        if entry.cash_delta <= Decimal::ZERO || entry.cash_after != entry.cash_delta {
            return Err(violation(format!(
                "genesis credits {} but records cash_after {}",
                entry.cash_delta, entry.cash_after
            )));
        }

        let state = Self {
            initial_capital: entry.cash_delta,
            cash: entry.cash_delta,
            open_notional: Decimal::ZERO,
            daily_pnl: Decimal::ZERO,
            cumulative_pnl: Decimal::ZERO,
            trading_day: entry.at.date_naive(),
            reservations: BTreeMap::new(),
            last_seq: 1,
            next_reservation: 1,
        };
        state.check_invariants()?;
        Ok(state)
    }

    /// Equity: cash plus capital tied up in reservations.
    #[must_use]
    pub fn equity(&self) -> Decimal {
        self.cash + self.open_notional
    }

    /// Unused part of today's loss budget.
    #[must_use]
    pub fn daily_loss_reserve(&self, daily_loss_limit: Decimal) -> Decimal {
        (daily_loss_limit + self.daily_pnl).max(Decimal::ZERO)
    }

    /// Largest amount a new reservation may take.
    #[must_use]
    pub fn available(&self, daily_loss_limit: Decimal) -> Decimal {
        (self.cash - self.daily_loss_reserve(daily_loss_limit)).max(Decimal::ZERO)
    }

    /// Id the next reservation will receive.
    #[must_use]
    pub fn next_reservation_id(&self) -> ReservationId {
        ReservationId::new(self.next_reservation)
    }

    /// Apply one entry, validating it against the current state.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if the entry is out of sequence, refers to
    /// an unknown reservation, disagrees with the reservation it releases,
    /// records a `cash_after` that does not match, or leaves the ledger in a
    /// state that breaks conservation or non-negative cash.
    pub fn apply(&mut self, entry: &AuditEntry) -> Result<(), LedgerError> {
        if entry.seq != self.last_seq + 1 {
            return Err(violation(format!(
                "expected seq {}, found {}",
                self.last_seq + 1,
                entry.seq
            )));
        }

        match entry.kind {
            AuditKind::Genesis => {
                return Err(violation(format!("second genesis at seq {}", entry.seq)));
            }
            AuditKind::Reserve => {
                let (position_id, reservation_id) = causal_ids(entry)?;
                if self.reservations.contains_key(&reservation_id) {
                    return Err(violation(format!("{reservation_id} reserved twice")));
                }
                if entry.notional_delta <= Decimal::ZERO
                    || entry.cash_delta != -entry.notional_delta
                    || !entry.pnl_delta.is_zero()
                {
                    return Err(violation(format!(
                        "seq {}: reserve must move cash into notional",
                        entry.seq
                    )));
                }
                self.reservations.insert(
                    reservation_id,
                    Reservation {
                        position_id,
                        amount: entry.notional_delta,
                        at: entry.at,
                    },
                );
                self.next_reservation = self.next_reservation.max(reservation_id.value() + 1);
            }
            AuditKind::Commit | AuditKind::Rollback => {
                let (position_id, reservation_id) = causal_ids(entry)?;
                let reservation = self
                    .reservations
                    .get(&reservation_id)
                    .ok_or_else(|| violation(format!("{reservation_id} released but not held")))?;
                if reservation.position_id != position_id {
                    return Err(violation(format!(
                        "{reservation_id} held by {} released by {position_id}",
                        reservation.position_id
                    )));
                }
                let pnl = if entry.kind == AuditKind::Rollback {
                    Decimal::ZERO
                } else {
                    entry.pnl_delta
                };
                if entry.notional_delta != -reservation.amount
                    || entry.cash_delta != reservation.amount + pnl
                    || entry.pnl_delta != pnl
                {
                    return Err(violation(format!(
                        "seq {}: {} of {reservation_id} does not release {}",
                        entry.seq, entry.kind, reservation.amount
                    )));
                }
                self.reservations.remove(&reservation_id);
                self.daily_pnl += pnl;
                self.cumulative_pnl += pnl;
            }
            AuditKind::DailyReset => {
                if !entry.cash_delta.is_zero()
                    || !entry.notional_delta.is_zero()
                    || !entry.pnl_delta.is_zero()
                {
                    return Err(violation(format!(
                        "seq {}: daily reset must not move money",
                        entry.seq
                    )));
                }
                self.trading_day = entry.at.date_naive();
                self.daily_pnl = Decimal::ZERO;
            }
        }

        self.cash += entry.cash_delta;
        self.open_notional += entry.notional_delta;
        self.last_seq = entry.seq;

        if self.cash != entry.cash_after {
            return Err(violation(format!(
                "seq {}: cash is {} but entry records {}",
                entry.seq, self.cash, entry.cash_after
            )));
        }

        self.check_invariants()
    }

    /// Check conservation, non-negative cash and reservation totals.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` describing the first broken invariant.
    pub fn check_invariants(&self) -> Result<(), LedgerError> {
        if self.cash < Decimal::ZERO {
            return Err(violation(format!("cash is negative: {}", self.cash)));
        }
        let reserved: Decimal = self.reservations.values().map(|r| r.amount).sum();
        if reserved != self.open_notional {
            return Err(violation(format!(
                "open notional {} differs from reservations {reserved}",
                self.open_notional
            )));
        }
        let expected = self.initial_capital + self.cumulative_pnl;
        if self.equity() != expected {
            return Err(violation(format!(
                "equity {} != initial capital + cumulative pnl {expected}",
                self.equity()
            )));
        }
        Ok(())
    }
}

/// Rebuild ledger state by replaying a log from genesis.
///
/// # Errors
///
/// Returns `InvariantViolation` at the first entry that does not replay
/// cleanly, or if the log is empty.
pub fn replay(entries: &[AuditEntry]) -> Result<LedgerState, LedgerError> {
    let (genesis, rest) = entries
        .split_first()
        .ok_or_else(|| violation("audit log is empty".to_string()))?;

    let mut state = LedgerState::from_genesis(genesis)?;
    for entry in rest {
        state.apply(entry)?;
    }
    Ok(state)
}

fn causal_ids(entry: &AuditEntry) -> Result<(PositionId, ReservationId), LedgerError> {
    match (entry.position_id, entry.reservation_id) {
        (Some(position_id), Some(reservation_id)) => Ok((position_id, reservation_id)),
        _ => Err(violation(format!(
            "seq {}: {} without position and reservation ids",
            entry.seq, entry.kind
        ))),
    }
}

fn violation(message: String) -> LedgerError {
    LedgerError::InvariantViolation(message)
}
