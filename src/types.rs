//! Core types used throughout FusionBot
//!
//! Defines the shared vocabulary: instruments, price sources, raw
//! observations, fused prices, and bias predictions.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current wall-clock time in milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Instrument identifier (open set, e.g. "BTC-USD", "ETH-USD")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instrument(String);

impl Instrument {
    pub fn new(id: impl Into<String>) -> Self {
        Instrument(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Instrument {
    fn from(s: &str) -> Self {
        Instrument(s.to_string())
    }
}

/// Price source identifier (open set: venues, oracles, proxies)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PriceSource(String);

impl PriceSource {
    pub fn new(id: impl Into<String>) -> Self {
        PriceSource(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PriceSource {
    fn from(s: &str) -> Self {
        PriceSource(s.to_string())
    }
}

/// A single source's price report at an instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Reporting venue/oracle
    pub source: PriceSource,
    /// Reported price, strictly positive for usable observations
    pub price: f64,
    /// Weight proxy (not necessarily true traded volume)
    pub volume: f64,
    /// Capture time in milliseconds
    pub timestamp: i64,
    /// Source-reported or derived reliability in [0, 1]
    pub confidence: f64,
}

impl Observation {
    pub fn new(
        source: impl Into<PriceSource>,
        price: f64,
        volume: f64,
        timestamp: i64,
        confidence: f64,
    ) -> Self {
        Self {
            source: source.into(),
            price,
            volume,
            timestamp,
            confidence,
        }
    }

    /// Construct with input sanitization.
    ///
    /// The fusion engine assumes validated inputs; malformed numeric
    /// fields (non-finite or non-positive price, negative volume,
    /// confidence outside [0, 1]) are sanitized here to a zero-confidence
    /// neutral value rather than rejected.
    pub fn validated(
        source: impl Into<PriceSource>,
        price: f64,
        volume: f64,
        timestamp: i64,
        confidence: f64,
    ) -> Self {
        let (price, confidence) = if price.is_finite() && price > 0.0 {
            (price, confidence)
        } else {
            (0.0, 0.0)
        };
        let volume = if volume.is_finite() && volume > 0.0 {
            volume
        } else {
            0.0
        };
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            source: source.into(),
            price,
            volume,
            timestamp,
            confidence,
        }
    }

    /// Whether this observation carries a usable price
    pub fn is_usable(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

/// Which algorithmic path produced a fused price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FusionMethod {
    /// Volume-weighted average of multiple valid sources
    Fused,
    /// Median of all observations (defensive fallback)
    Median,
    /// A single observation passed through
    Single,
}

impl fmt::Display for FusionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionMethod::Fused => write!(f, "fused"),
            FusionMethod::Median => write!(f, "median"),
            FusionMethod::Single => write!(f, "single"),
        }
    }
}

/// Fused price from all sources for one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedPrice {
    /// Computation time in milliseconds
    pub ts: i64,
    /// Fused value, >= 0
    pub price: f64,
    /// Confidence score in [0, 1]
    pub confidence: f64,
    /// Sources that contributed to the fused value
    pub sources_used: Vec<PriceSource>,
    /// Sources excluded as outliers (disjoint from sources_used)
    pub outliers_filtered: Vec<PriceSource>,
    /// Algorithmic path that produced the price
    pub method: FusionMethod,
}

impl AggregatedPrice {
    /// Zero-value result for an empty observation batch
    pub fn empty(ts: i64) -> Self {
        Self {
            ts,
            price: 0.0,
            confidence: 0.0,
            sources_used: Vec::new(),
            outliers_filtered: Vec::new(),
            method: FusionMethod::Single,
        }
    }
}

/// Predicted directional tendency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bias {
    Long,
    Short,
    Neutral,
}

impl Default for Bias {
    fn default() -> Self {
        Bias::Neutral
    }
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bias::Long => write!(f, "LONG"),
            Bias::Short => write!(f, "SHORT"),
            Bias::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Directional bias prediction for one instrument at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiasPrediction {
    /// Predicted direction
    pub bias: Bias,
    /// Confidence as an integer percentage in [0, 100]
    pub confidence: u8,
    /// |mean of the memory cell's hidden state| (diagnostic)
    pub temporal_strength: f64,
    /// Fraction of weak learners agreeing with the final score (diagnostic)
    pub ensemble_agreement: f64,
    /// Blended score after mean-reversion correction (diagnostic)
    pub adaptive_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validated_sanitizes_bad_price() {
        let obs = Observation::validated("binance", f64::NAN, 1.0, 0, 0.9);
        assert_eq!(obs.price, 0.0);
        assert_eq!(obs.confidence, 0.0);
        assert!(!obs.is_usable());

        let obs = Observation::validated("binance", -5.0, 1.0, 0, 0.9);
        assert!(!obs.is_usable());
    }

    #[test]
    fn test_validated_clamps_confidence() {
        let obs = Observation::validated("kraken", 100.0, 1.0, 0, 1.7);
        assert_eq!(obs.confidence, 1.0);
        let obs = Observation::validated("kraken", 100.0, -2.0, 0, -0.3);
        assert_eq!(obs.volume, 0.0);
        assert_eq!(obs.confidence, 0.0);
    }

    #[test]
    fn test_empty_aggregate_invariant() {
        let agg = AggregatedPrice::empty(1000);
        assert_eq!(agg.price, 0.0);
        assert_eq!(agg.confidence, 0.0);
        assert!(agg.sources_used.is_empty());
        assert_eq!(agg.method, FusionMethod::Single);
    }
}
