//! Detection strategy configuration.

use rust_decimal::Decimal;
use serde::Deserialize;

use super::venue::QuoteRef;

/// Strategy selection plus per-strategy settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategiesConfig {
    /// Enabled strategy names: `structural`, `cross-venue`, `spread-capture`.
    #[serde(default = "default_enabled")]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub structural: StructuralConfig,
    #[serde(default)]
    pub cross_venue: CrossVenueConfig,
    #[serde(default)]
    pub spread_capture: SpreadCaptureConfig,
}

fn default_enabled() -> Vec<String> {
    vec!["structural".into()]
}

impl Default for StrategiesConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            structural: StructuralConfig::default(),
            cross_venue: CrossVenueConfig::default(),
            spread_capture: SpreadCaptureConfig::default(),
        }
    }
}

/// YES + NO < $1 on a single binary market.
#[derive(Debug, Clone, Deserialize)]
pub struct StructuralConfig {
    /// Minimum post-fee edge per unit payout. Must be positive.
    #[serde(default = "default_structural_min_edge")]
    pub min_edge: Decimal,
    #[serde(default = "default_structural_ttl_ms")]
    pub ttl_ms: u64,
    /// Probability the locked-in payout is realized.
    #[serde(default = "default_structural_confidence")]
    pub confidence: Decimal,
}

fn default_structural_min_edge() -> Decimal {
    Decimal::new(5, 3) // 0.5%
}

fn default_structural_ttl_ms() -> u64 {
    2_000
}

fn default_structural_confidence() -> Decimal {
    Decimal::new(99, 2)
}

impl Default for StructuralConfig {
    fn default() -> Self {
        Self {
            min_edge: default_structural_min_edge(),
            ttl_ms: default_structural_ttl_ms(),
            confidence: default_structural_confidence(),
        }
    }
}

/// A pair of quotes for the same underlying on two venues.
#[derive(Debug, Clone, Deserialize)]
pub struct PairConfig {
    pub a: QuoteRef,
    pub b: QuoteRef,
}

/// Price lag between two venues.
#[derive(Debug, Clone, Deserialize)]
pub struct CrossVenueConfig {
    #[serde(default = "default_cross_min_edge")]
    pub min_edge: Decimal,
    #[serde(default = "default_cross_ttl_ms")]
    pub ttl_ms: u64,
    #[serde(default = "default_cross_confidence")]
    pub confidence: Decimal,
    #[serde(default)]
    pub pairs: Vec<PairConfig>,
}

fn default_cross_min_edge() -> Decimal {
    Decimal::new(1, 2) // 1%
}

fn default_cross_ttl_ms() -> u64 {
    1_000
}

fn default_cross_confidence() -> Decimal {
    Decimal::new(98, 2)
}

impl Default for CrossVenueConfig {
    fn default() -> Self {
        Self {
            min_edge: default_cross_min_edge(),
            ttl_ms: default_cross_ttl_ms(),
            confidence: default_cross_confidence(),
            pairs: Vec::new(),
        }
    }
}

/// Quote both sides of a wide spread.
#[derive(Debug, Clone, Deserialize)]
pub struct SpreadCaptureConfig {
    #[serde(default = "default_spread_min_edge")]
    pub min_edge: Decimal,
    #[serde(default = "default_spread_ttl_ms")]
    pub ttl_ms: u64,
    #[serde(default = "default_spread_confidence")]
    pub confidence: Decimal,
    /// Ceiling on the instrument's own realized volatility.
    #[serde(default = "default_max_volatility")]
    pub max_volatility: Decimal,
    /// Mid samples required before volatility is trusted.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Optional spot reference whose volatility flags toxic flow.
    #[serde(default)]
    pub reference: Option<QuoteRef>,
    #[serde(default = "default_reference_max_volatility")]
    pub reference_max_volatility: Decimal,
}

fn default_spread_min_edge() -> Decimal {
    Decimal::new(2, 2) // 2%
}

fn default_spread_ttl_ms() -> u64 {
    3_000
}

fn default_spread_confidence() -> Decimal {
    Decimal::new(97, 2)
}

fn default_max_volatility() -> Decimal {
    Decimal::new(2, 2)
}

fn default_min_samples() -> usize {
    8
}

fn default_reference_max_volatility() -> Decimal {
    Decimal::new(5, 3)
}

impl Default for SpreadCaptureConfig {
    fn default() -> Self {
        Self {
            min_edge: default_spread_min_edge(),
            ttl_ms: default_spread_ttl_ms(),
            confidence: default_spread_confidence(),
            max_volatility: default_max_volatility(),
            min_samples: default_min_samples(),
            reference: None,
            reference_max_volatility: default_reference_max_volatility(),
        }
    }
}
