//! Capped fractional Kelly sizing.

use rust_decimal::Decimal;

/// Full Kelly fraction for a bet won with probability `p` at net payoff `b`
/// per unit staked: `(p·b − (1 − p)) / b`.
///
/// Returns zero when `b` is not positive. The result is negative when the bet
/// has no edge.
#[must_use]
pub fn kelly_fraction(p: Decimal, b: Decimal) -> Decimal {
    if b <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (p * b - (Decimal::ONE - p)) / b
}

/// Fraction of available capital to stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KellySizer {
    multiplier: Decimal,
    cap: Decimal,
}

impl KellySizer {
    #[must_use]
    pub const fn new(multiplier: Decimal, cap: Decimal) -> Self {
        Self { multiplier, cap }
    }

    /// `min(multiplier · f*, cap)`, or `None` when full Kelly is not positive.
    #[must_use]
    pub fn fraction(&self, p: Decimal, b: Decimal) -> Option<Decimal> {
        let full = kelly_fraction(p, b);
        if full <= Decimal::ZERO {
            return None;
        }
        Some((full * self.multiplier).min(self.cap))
    }
}
