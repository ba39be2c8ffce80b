//! Monetary types for price and volume representation.

use rust_decimal::Decimal;

/// Price represented as a Decimal for precision.
pub type Price = Decimal;

/// Volume represented as a Decimal for precision.
pub type Volume = Decimal;

/// Smallest price a binary outcome can trade at.
pub const MIN_BINARY_PRICE: Price = Decimal::from_parts(1, 0, 0, false, 2);

/// Largest price a binary outcome can trade at.
pub const MAX_BINARY_PRICE: Price = Decimal::from_parts(99, 0, 0, false, 2);
