//! Domain identifier types with proper encapsulation.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a string-backed identifier newtype.
///
/// The inner String is private to ensure all construction goes through
/// the defined constructors.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

string_id!(
    /// Venue identifier (e.g. `polymarket`, `binance`).
    VenueId
);

string_id!(
    /// Instrument identifier on a venue.
    ///
    /// For binary prediction markets this is the market (condition) id; for
    /// spot venues it is the trading symbol.
    InstrumentId
);

string_id!(
    /// Tradable asset identifier.
    ///
    /// Orders are placed against assets: the YES or NO outcome token of a
    /// binary market, or the symbol itself on a spot venue.
    AssetId
);

string_id!(
    /// Venue-assigned order identifier.
    OrderId
);

/// Unique opportunity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpportunityId(Uuid);

impl OpportunityId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for OpportunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "opp-{}", self.0)
    }
}

/// Unique position identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(u64);

impl PositionId {
    /// Create a new `PositionId` from a u64 value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pos-{}", self.0)
    }
}

/// Ledger reservation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(u64);

impl ReservationId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_ids_round_trip_through_constructors() {
        let venue = VenueId::from("polymarket");
        assert_eq!(venue.as_str(), "polymarket");
        assert_eq!(format!("{venue}"), "polymarket");

        let instrument = InstrumentId::from("0xabc".to_string());
        assert_eq!(instrument.as_str(), "0xabc");
    }

    #[test]
    fn string_ids_serialize_transparently() {
        let asset = AssetId::new("token-yes");
        let json = serde_json::to_string(&asset).unwrap();
        assert_eq!(json, r#""token-yes""#);
    }

    #[test]
    fn numeric_ids_display_with_prefix() {
        assert_eq!(PositionId::new(7).to_string(), "pos-7");
        assert_eq!(ReservationId::new(3).to_string(), "res-3");
        assert_eq!(PositionId::new(7).value(), 7);
    }

    #[test]
    fn opportunity_ids_are_unique() {
        let a = OpportunityId::generate();
        let b = OpportunityId::generate();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("opp-"));
    }
}
