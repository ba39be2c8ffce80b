//! Single-writer capital ledger.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::audit::{AuditEntry, AuditKind, AuditSink};
use super::state::{replay, LedgerState};
use crate::domain::{PositionId, ReservationId};
use crate::error::LedgerError;

/// Point-in-time view of the ledger, consumed by the risk gate and the
/// status file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub initial_capital: Decimal,
    pub cash: Decimal,
    pub open_notional: Decimal,
    pub equity: Decimal,
    /// Capital a new reservation may take.
    pub available: Decimal,
    pub daily_pnl: Decimal,
    pub cumulative_pnl: Decimal,
    pub daily_loss_limit: Decimal,
    pub trading_day: NaiveDate,
    pub open_reservations: usize,
    pub entries: u64,
    pub halted: Option<String>,
}

impl LedgerSnapshot {
    /// Realized loss today, zero when the day is profitable.
    #[must_use]
    pub fn daily_loss(&self) -> Decimal {
        (-self.daily_pnl).max(Decimal::ZERO)
    }

    #[must_use]
    pub fn loss_limit_reached(&self) -> bool {
        self.daily_loss() >= self.daily_loss_limit
    }
}

struct Inner {
    state: LedgerState,
    entries: Vec<AuditEntry>,
    halted: Option<String>,
}

/// Authoritative record of cash, open notional and realized P&L.
///
/// All mutations serialize on one lock. Each mutation builds an audit entry,
/// applies it to a copy of the state, writes it to the sink, and only then
/// swaps the copy in. A mutation that would break an invariant is not applied
/// and halts the ledger permanently.
pub struct Ledger {
    inner: Mutex<Inner>,
    sink: Option<Arc<dyn AuditSink>>,
    daily_loss_limit: Decimal,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("daily_loss_limit", &self.daily_loss_limit)
            .field("durable", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Create an in-memory ledger holding `initial_capital`.
    ///
    /// # Errors
    ///
    /// Fails if `initial_capital` is not positive.
    pub fn new(
        initial_capital: Decimal,
        daily_loss_limit: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        let genesis = AuditEntry::genesis(initial_capital, at);
        let state = LedgerState::from_genesis(&genesis)?;
        Ok(Self::from_parts(state, vec![genesis], None, daily_loss_limit))
    }

    /// Open a durable ledger backed by `sink`.
    ///
    /// An empty sink receives a fresh genesis entry; otherwise the stored
    /// log is replayed and `initial_capital` is ignored.
    ///
    /// # Errors
    ///
    /// Fails if the sink cannot be read or written, or if the stored log does
    /// not replay cleanly.
    pub fn open(
        initial_capital: Decimal,
        daily_loss_limit: Decimal,
        sink: Arc<dyn AuditSink>,
        at: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        let stored = sink.load()?;
        if stored.is_empty() {
            let genesis = AuditEntry::genesis(initial_capital, at);
            let state = LedgerState::from_genesis(&genesis)?;
            sink.append(&genesis)?;
            info!(capital = %initial_capital, "Ledger created");
            return Ok(Self::from_parts(state, vec![genesis], Some(sink), daily_loss_limit));
        }

        let mut ledger = Self::restore(daily_loss_limit, stored)?;
        ledger.sink = Some(sink);
        Ok(ledger)
    }

    /// Rebuild a ledger from an audit log without a sink.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if the log does not replay cleanly.
    pub fn restore(
        daily_loss_limit: Decimal,
        entries: Vec<AuditEntry>,
    ) -> Result<Self, LedgerError> {
        let state = replay(&entries)?;
        info!(
            entries = entries.len(),
            cash = %state.cash,
            open_notional = %state.open_notional,
            reservations = state.reservations.len(),
            "Ledger restored from audit log"
        );
        Ok(Self::from_parts(state, entries, None, daily_loss_limit))
    }

    fn from_parts(
        state: LedgerState,
        entries: Vec<AuditEntry>,
        sink: Option<Arc<dyn AuditSink>>,
        daily_loss_limit: Decimal,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state,
                entries,
                halted: None,
            }),
            sink,
            daily_loss_limit,
        }
    }

    /// Move `amount` from cash into a new reservation for `position_id`.
    ///
    /// # Errors
    ///
    /// `NonPositiveAmount` or `InsufficientCapital` refuse the request without
    /// side effects. `Halted`, `InvariantViolation` and `Sink` are described
    /// on [`Ledger`].
    pub fn reserve(
        &self,
        position_id: PositionId,
        amount: Decimal,
    ) -> Result<ReservationId, LedgerError> {
        let mut inner = self.inner.lock();
        ensure_running(&inner)?;

        if amount <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        let available = inner.state.available(self.daily_loss_limit);
        if amount > available {
            return Err(LedgerError::InsufficientCapital {
                requested: amount,
                available,
            });
        }

        let reservation_id = inner.state.next_reservation_id();
        let entry = AuditEntry {
            seq: inner.state.last_seq + 1,
            at: Utc::now(),
            kind: AuditKind::Reserve,
            position_id: Some(position_id),
            reservation_id: Some(reservation_id),
            cash_delta: -amount,
            notional_delta: amount,
            pnl_delta: Decimal::ZERO,
            cash_after: inner.state.cash - amount,
        };
        self.write(&mut inner, entry)?;

        debug!(%position_id, %reservation_id, %amount, "Capital reserved");
        Ok(reservation_id)
    }

    /// Release a reservation and book `realized_pnl` against it.
    ///
    /// # Errors
    ///
    /// `UnknownReservation` and `ReservationOwnerMismatch` refuse the request.
    /// A loss that would drive cash negative is an invariant violation.
    pub fn commit(
        &self,
        position_id: PositionId,
        reservation_id: ReservationId,
        realized_pnl: Decimal,
    ) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock();
        ensure_running(&inner)?;

        let amount = held_amount(&inner.state, position_id, reservation_id)?;
        let entry = AuditEntry {
            seq: inner.state.last_seq + 1,
            at: Utc::now(),
            kind: AuditKind::Commit,
            position_id: Some(position_id),
            reservation_id: Some(reservation_id),
            cash_delta: amount + realized_pnl,
            notional_delta: -amount,
            pnl_delta: realized_pnl,
            cash_after: inner.state.cash + amount + realized_pnl,
        };
        self.write(&mut inner, entry)?;

        info!(%position_id, %reservation_id, pnl = %realized_pnl, "Reservation committed");
        Ok(())
    }

    /// Release a reservation with no P&L.
    ///
    /// # Errors
    ///
    /// `UnknownReservation` if the reservation is not held.
    pub fn rollback(&self, reservation_id: ReservationId) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock();
        ensure_running(&inner)?;

        let reservation = inner
            .state
            .reservations
            .get(&reservation_id)
            .ok_or(LedgerError::UnknownReservation(reservation_id))?;
        let (position_id, amount) = (reservation.position_id, reservation.amount);

        let entry = AuditEntry {
            seq: inner.state.last_seq + 1,
            at: Utc::now(),
            kind: AuditKind::Rollback,
            position_id: Some(position_id),
            reservation_id: Some(reservation_id),
            cash_delta: amount,
            notional_delta: -amount,
            pnl_delta: Decimal::ZERO,
            cash_after: inner.state.cash + amount,
        };
        self.write(&mut inner, entry)?;

        debug!(%position_id, %reservation_id, %amount, "Reservation rolled back");
        Ok(())
    }

    /// Start a new trading day if `now` falls after the current one.
    ///
    /// Returns true when a reset was recorded.
    ///
    /// # Errors
    ///
    /// `Halted` or `Sink`.
    pub fn roll_day(&self, now: DateTime<Utc>) -> Result<bool, LedgerError> {
        let mut inner = self.inner.lock();
        ensure_running(&inner)?;

        if now.date_naive() <= inner.state.trading_day {
            return Ok(false);
        }

        let previous = inner.state.trading_day;
        let closing_pnl = inner.state.daily_pnl;
        let entry = AuditEntry {
            seq: inner.state.last_seq + 1,
            at: now,
            kind: AuditKind::DailyReset,
            position_id: None,
            reservation_id: None,
            cash_delta: Decimal::ZERO,
            notional_delta: Decimal::ZERO,
            pnl_delta: Decimal::ZERO,
            cash_after: inner.state.cash,
        };
        self.write(&mut inner, entry)?;

        info!(%previous, day_pnl = %closing_pnl, "Trading day rolled");
        Ok(true)
    }

    /// Replay the full audit log and compare it with the live state.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if the log does not replay or replays to
    /// a different state.
    pub fn verify(&self) -> Result<(), LedgerError> {
        let inner = self.inner.lock();
        let replayed = replay(&inner.entries)?;
        if replayed != inner.state {
            return Err(LedgerError::InvariantViolation(format!(
                "replay gives cash {} / open {}, live state has {} / {}",
                replayed.cash, replayed.open_notional, inner.state.cash, inner.state.open_notional
            )));
        }
        inner.state.check_invariants()
    }

    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        let inner = self.inner.lock();
        let state = &inner.state;
        LedgerSnapshot {
            initial_capital: state.initial_capital,
            cash: state.cash,
            open_notional: state.open_notional,
            equity: state.equity(),
            available: state.available(self.daily_loss_limit),
            daily_pnl: state.daily_pnl,
            cumulative_pnl: state.cumulative_pnl,
            daily_loss_limit: self.daily_loss_limit,
            trading_day: state.trading_day,
            open_reservations: state.reservations.len(),
            entries: state.last_seq,
            halted: inner.halted.clone(),
        }
    }

    /// Clone of the full state, reservations included.
    #[must_use]
    pub fn state(&self) -> LedgerState {
        self.inner.lock().state.clone()
    }

    /// Clone of the audit log.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().entries.clone()
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.inner.lock().halted.is_some()
    }

    #[must_use]
    pub fn daily_loss_limit(&self) -> Decimal {
        self.daily_loss_limit
    }

    fn write(&self, inner: &mut Inner, entry: AuditEntry) -> Result<(), LedgerError> {
        let mut candidate = inner.state.clone();
        if let Err(err) = candidate.apply(&entry) {
            let reason = err.to_string();
            error!(seq = entry.seq, kind = %entry.kind, %reason, "Ledger invariant violated, halting");
            inner.halted = Some(reason);
            return Err(err);
        }

        if let Some(sink) = &self.sink {
            sink.append(&entry)?;
        }

        inner.state = candidate;
        inner.entries.push(entry);
        Ok(())
    }
}

fn ensure_running(inner: &Inner) -> Result<(), LedgerError> {
    match &inner.halted {
        Some(reason) => Err(LedgerError::Halted(reason.clone())),
        None => Ok(()),
    }
}

fn held_amount(
    state: &LedgerState,
    position_id: PositionId,
    reservation_id: ReservationId,
) -> Result<Decimal, LedgerError> {
    let reservation = state
        .reservations
        .get(&reservation_id)
        .ok_or(LedgerError::UnknownReservation(reservation_id))?;
    if reservation.position_id != position_id {
        return Err(LedgerError::ReservationOwnerMismatch {
            reservation_id,
            owner: reservation.position_id,
            position_id,
        });
    }
    Ok(reservation.amount)
}
