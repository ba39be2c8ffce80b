//! Opportunity type with builder pattern.
//!
//! This module provides the `Opportunity` struct representing a detected
//! arbitrage opportunity, along with `OpportunityBuilder` for safe construction.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{AssetId, InstrumentId, OpportunityId, VenueId};
use super::money::{Price, Volume};
use super::tick::{InstrumentKey, Side};

/// Strategy that produced an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// YES + NO asks below the $1 payout.
    Structural,
    /// Same instrument priced differently on two venues.
    CrossVenue,
    /// Wide quoted spread captured with resting orders on both sides.
    SpreadCapture,
}

impl StrategyKind {
    /// Stable tag used in configuration, logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Structural => "structural",
            Self::CrossVenue => "cross-venue",
            Self::SpreadCapture => "spread-capture",
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "structural" => Ok(Self::Structural),
            "cross-venue" | "cross_venue" => Ok(Self::CrossVenue),
            "spread-capture" | "spread_capture" => Ok(Self::SpreadCapture),
            other => Err(format!("unknown strategy '{other}'")),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One order of a multi-leg opportunity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityLeg {
    pub venue: VenueId,
    pub instrument: InstrumentId,
    pub asset: AssetId,
    pub side: Side,
    /// Limit price for the leg.
    pub price: Price,
    /// Size available at that price when the opportunity was detected.
    pub available: Volume,
}

impl OpportunityLeg {
    pub fn new(
        venue: impl Into<VenueId>,
        instrument: impl Into<InstrumentId>,
        asset: impl Into<AssetId>,
        side: Side,
        price: Price,
        available: Volume,
    ) -> Self {
        Self {
            venue: venue.into(),
            instrument: instrument.into(),
            asset: asset.into(),
            side,
            price,
            available,
        }
    }

    /// Instrument key of this leg.
    #[must_use]
    pub fn key(&self) -> InstrumentKey {
        InstrumentKey::new(self.venue.clone(), self.instrument.clone())
    }
}

/// Error returned when building an Opportunity fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpportunityBuildError {
    /// Strategy is required but was not provided.
    MissingStrategy,
    /// Primary instrument key is required but was not provided.
    MissingKey,
    /// At least one leg is required.
    MissingLegs,
    /// Edge is required but was not provided.
    MissingEdge,
    /// Expected profit per unit is required but was not provided.
    MissingProfit,
    /// Time budget must be positive.
    InvalidTtl,
    /// Confidence must lie in (0, 1].
    InvalidConfidence,
}

impl fmt::Display for OpportunityBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingStrategy => write!(f, "strategy is required"),
            Self::MissingKey => write!(f, "instrument key is required"),
            Self::MissingLegs => write!(f, "at least one leg is required"),
            Self::MissingEdge => write!(f, "edge is required"),
            Self::MissingProfit => write!(f, "profit per unit is required"),
            Self::InvalidTtl => write!(f, "ttl must be positive"),
            Self::InvalidConfidence => write!(f, "confidence must be in (0, 1]"),
        }
    }
}

impl std::error::Error for OpportunityBuildError {}

/// A detected arbitrage opportunity.
///
/// Use `Opportunity::builder()` to construct instances. Edges are always net
/// of fees: strategies apply the fee model before building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    id: OpportunityId,
    strategy: StrategyKind,
    key: InstrumentKey,
    legs: Vec<OpportunityLeg>,
    edge: Decimal,
    profit_per_unit: Price,
    confidence: Decimal,
    discovered_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Opportunity {
    /// Create a new builder for constructing an Opportunity.
    pub fn builder() -> OpportunityBuilder {
        OpportunityBuilder::new()
    }

    #[must_use]
    pub fn id(&self) -> OpportunityId {
        self.id
    }

    #[must_use]
    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    /// Primary instrument, used for de-duplication.
    #[must_use]
    pub fn key(&self) -> &InstrumentKey {
        &self.key
    }

    #[must_use]
    pub fn legs(&self) -> &[OpportunityLeg] {
        &self.legs
    }

    /// All distinct instruments referenced by the legs.
    #[must_use]
    pub fn instruments(&self) -> Vec<InstrumentKey> {
        let mut keys: Vec<InstrumentKey> = self.legs.iter().map(OpportunityLeg::key).collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Venues referenced by the legs.
    pub fn venues(&self) -> impl Iterator<Item = &VenueId> {
        self.legs.iter().map(|l| &l.venue)
    }

    /// Expected edge, net of fees.
    #[must_use]
    pub fn edge(&self) -> Decimal {
        self.edge
    }

    /// Expected profit per unit of size, net of fees.
    #[must_use]
    pub fn profit_per_unit(&self) -> Price {
        self.profit_per_unit
    }

    /// Capital tied up per unit of size (sum of leg prices).
    #[must_use]
    pub fn notional_per_unit(&self) -> Price {
        self.legs.iter().map(|l| l.price.abs()).sum()
    }

    /// Expected return per unit of notional; the Kelly payoff ratio.
    #[must_use]
    pub fn return_on_notional(&self) -> Decimal {
        let notional = self.notional_per_unit();
        if notional.is_zero() {
            return Decimal::ZERO;
        }
        self.profit_per_unit / notional
    }

    /// Probability that the edge is realized.
    #[must_use]
    pub fn confidence(&self) -> Decimal {
        self.confidence
    }

    /// Largest size executable on every leg at detection time.
    #[must_use]
    pub fn max_size(&self) -> Volume {
        self.legs
            .iter()
            .map(|l| l.available)
            .min()
            .unwrap_or(Decimal::ZERO)
    }

    #[must_use]
    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// True once the time budget has elapsed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Builder for constructing `Opportunity` instances.
///
/// # Example
///
/// ```ignore
/// let opportunity = Opportunity::builder()
///     .strategy(StrategyKind::Structural)
///     .key(key)
///     .leg(yes_leg)
///     .leg(no_leg)
///     .edge(edge)
///     .profit_per_unit(edge)
///     .discovered_at(now)
///     .ttl(Duration::milliseconds(1500))
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct OpportunityBuilder {
    strategy: Option<StrategyKind>,
    key: Option<InstrumentKey>,
    legs: Vec<OpportunityLeg>,
    edge: Option<Decimal>,
    profit_per_unit: Option<Price>,
    confidence: Option<Decimal>,
    discovered_at: Option<DateTime<Utc>>,
    ttl: Option<Duration>,
}

impl OpportunityBuilder {
    /// Create a new empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn key(mut self, key: InstrumentKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn leg(mut self, leg: OpportunityLeg) -> Self {
        self.legs.push(leg);
        self
    }

    pub fn edge(mut self, edge: Decimal) -> Self {
        self.edge = Some(edge);
        self
    }

    pub fn profit_per_unit(mut self, profit: Price) -> Self {
        self.profit_per_unit = Some(profit);
        self
    }

    /// Probability the edge is realized. Defaults to 1.
    pub fn confidence(mut self, confidence: Decimal) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Detection time. Defaults to now.
    pub fn discovered_at(mut self, at: DateTime<Utc>) -> Self {
        self.discovered_at = Some(at);
        self
    }

    /// Time budget after which the opportunity is stale.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Build the Opportunity.
    ///
    /// # Errors
    ///
    /// Returns `OpportunityBuildError` if any required field is missing or
    /// out of range.
    pub fn build(self) -> Result<Opportunity, OpportunityBuildError> {
        let strategy = self.strategy.ok_or(OpportunityBuildError::MissingStrategy)?;
        let key = self.key.ok_or(OpportunityBuildError::MissingKey)?;
        if self.legs.is_empty() {
            return Err(OpportunityBuildError::MissingLegs);
        }
        let edge = self.edge.ok_or(OpportunityBuildError::MissingEdge)?;
        let profit_per_unit = self
            .profit_per_unit
            .ok_or(OpportunityBuildError::MissingProfit)?;

        let confidence = self.confidence.unwrap_or(Decimal::ONE);
        if confidence <= Decimal::ZERO || confidence > Decimal::ONE {
            return Err(OpportunityBuildError::InvalidConfidence);
        }

        let ttl = self.ttl.ok_or(OpportunityBuildError::InvalidTtl)?;
        if ttl <= Duration::zero() {
            return Err(OpportunityBuildError::InvalidTtl);
        }

        let discovered_at = self.discovered_at.unwrap_or_else(Utc::now);

        Ok(Opportunity {
            id: OpportunityId::generate(),
            strategy,
            key,
            legs: self.legs,
            edge,
            profit_per_unit,
            confidence,
            discovered_at,
            expires_at: discovered_at + ttl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn key() -> InstrumentKey {
        InstrumentKey::new(VenueId::from("polymarket"), InstrumentId::from("0xm"))
    }

    fn yes_leg() -> OpportunityLeg {
        OpportunityLeg::new("polymarket", "0xm", "yes", Side::Buy, dec!(0.40), dec!(100))
    }

    fn no_leg() -> OpportunityLeg {
        OpportunityLeg::new("polymarket", "0xm", "no", Side::Buy, dec!(0.50), dec!(60))
    }

    fn builder() -> OpportunityBuilder {
        Opportunity::builder()
            .strategy(StrategyKind::Structural)
            .key(key())
            .leg(yes_leg())
            .leg(no_leg())
            .edge(dec!(0.08))
            .profit_per_unit(dec!(0.08))
            .ttl(Duration::seconds(2))
    }

    #[test]
    fn builder_creates_opportunity_with_derived_fields() {
        let now = Utc::now();
        let opp = builder().discovered_at(now).build().unwrap();

        assert_eq!(opp.strategy(), StrategyKind::Structural);
        assert_eq!(opp.notional_per_unit(), dec!(0.90));
        assert_eq!(opp.max_size(), dec!(60));
        assert_eq!(opp.confidence(), Decimal::ONE);
        assert_eq!(opp.expires_at(), now + Duration::seconds(2));
        assert_eq!(opp.instruments(), vec![key()]);
        assert_eq!(opp.return_on_notional().round_dp(4), dec!(0.0889));
    }

    #[test]
    fn expiry_is_inclusive_of_deadline() {
        let now = Utc::now();
        let opp = builder().discovered_at(now).build().unwrap();

        assert!(!opp.is_expired(now));
        assert!(opp.is_expired(now + Duration::seconds(2)));
    }

    #[test]
    fn builder_fails_without_legs() {
        let result = Opportunity::builder()
            .strategy(StrategyKind::Structural)
            .key(key())
            .edge(dec!(0.1))
            .profit_per_unit(dec!(0.1))
            .ttl(Duration::seconds(1))
            .build();

        assert_eq!(result.unwrap_err(), OpportunityBuildError::MissingLegs);
    }

    #[test]
    fn builder_rejects_non_positive_ttl() {
        let result = builder().ttl(Duration::zero()).build();
        assert_eq!(result.unwrap_err(), OpportunityBuildError::InvalidTtl);
    }

    #[test]
    fn builder_rejects_confidence_out_of_range() {
        let result = builder().confidence(dec!(1.5)).build();
        assert_eq!(result.unwrap_err(), OpportunityBuildError::InvalidConfidence);
    }

    #[test]
    fn strategy_tags_are_kebab_case() {
        assert_eq!(StrategyKind::CrossVenue.as_str(), "cross-venue");
        let json = serde_json::to_string(&StrategyKind::SpreadCapture).unwrap();
        assert_eq!(json, r#""spread-capture""#);
    }

    #[test]
    fn strategy_kind_parses_config_names() {
        assert_eq!("structural".parse::<StrategyKind>(), Ok(StrategyKind::Structural));
        assert_eq!("cross_venue".parse::<StrategyKind>(), Ok(StrategyKind::CrossVenue));
        assert!("martingale".parse::<StrategyKind>().is_err());
    }
}
