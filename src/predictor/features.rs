//! Feature extraction
//!
//! Turns a fused price plus auxiliary market stats into the fixed-size
//! normalized vector the bias predictor consumes.

use crate::types::AggregatedPrice;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Fixed-size normalized feature vector
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FeatureVector {
    /// Normalized price change, roughly [-1, 1]
    pub change: f64,
    /// Normalized volatility estimate, [0, 1]
    pub volatility: f64,
    /// Normalized momentum, roughly [-1, 1]
    pub momentum: f64,
    /// Log-compressed volume
    pub log_volume: f64,
    /// Log-compressed price level
    pub log_price: f64,
}

impl FeatureVector {
    /// Number of features
    pub const NUM_FEATURES: usize = 5;

    /// Ordered values for the models
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.change,
            self.volatility,
            self.momentum,
            self.log_volume,
            self.log_price,
        ]
    }

    /// Feature names in vector order (for diagnostics)
    pub fn feature_names() -> Vec<&'static str> {
        vec!["change", "volatility", "momentum", "log_volume", "log_price"]
    }
}

/// Auxiliary market stats supplied by the caller alongside the fused price
#[derive(Debug, Clone, Default)]
pub struct MarketStats {
    /// Price change over the caller's reference window, in percent
    pub change_pct: f64,
    /// Externally computed volatility estimate (e.g. stddev / mean)
    pub volatility: f64,
    /// Externally computed momentum estimate, in percent per interval
    pub momentum: f64,
    /// Volume over the caller's reference window
    pub volume: f64,
}

/// Normalizes market fields into a `FeatureVector`.
///
/// Carries a bounded history of fused prices so `extract_from_prices` can
/// derive change / volatility / momentum when the caller has no external
/// estimates of its own.
pub struct FeatureExtractor {
    price_history: VecDeque<f64>,
    max_history: usize,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self {
            price_history: VecDeque::with_capacity(32),
            max_history: 32,
        }
    }

    /// Build the feature vector from a fused price and caller-provided
    /// market stats.
    pub fn extract(&mut self, agg: &AggregatedPrice, stats: &MarketStats) -> FeatureVector {
        self.push_price(agg.price);
        Self::normalize(agg.price, stats)
    }

    /// Build the feature vector deriving the auxiliary stats from this
    /// extractor's own rolling price history (replay / offline use).
    pub fn extract_from_price(&mut self, agg: &AggregatedPrice) -> FeatureVector {
        let stats = self.derive_stats(agg.price);
        self.push_price(agg.price);
        Self::normalize(agg.price, &stats)
    }

    fn push_price(&mut self, price: f64) {
        self.price_history.push_back(price);
        while self.price_history.len() > self.max_history {
            self.price_history.pop_front();
        }
    }

    fn derive_stats(&self, price: f64) -> MarketStats {
        let prev = self.price_history.back().copied();
        let change_pct = match prev {
            Some(p) if p > 0.0 => (price - p) / p * 100.0,
            _ => 0.0,
        };

        let momentum = if self.price_history.len() >= 2 {
            let p2 = self.price_history[self.price_history.len() - 2];
            let p1 = self.price_history[self.price_history.len() - 1];
            let prev_change = if p2 > 0.0 { (p1 - p2) / p2 * 100.0 } else { 0.0 };
            change_pct - prev_change
        } else {
            0.0
        };

        let volatility = if self.price_history.len() >= 3 {
            let n = self.price_history.len() as f64;
            let mean = self.price_history.iter().sum::<f64>() / n;
            if mean > 0.0 {
                let variance = self
                    .price_history
                    .iter()
                    .map(|p| (p - mean).powi(2))
                    .sum::<f64>()
                    / n;
                variance.sqrt() / mean
            } else {
                0.0
            }
        } else {
            0.0
        };

        MarketStats {
            change_pct,
            volatility,
            momentum,
            volume: 0.0,
        }
    }

    /// Squash raw market fields into bounded, comparable ranges. A 10%
    /// change saturates the change feature; volatility is capped at 1.
    fn normalize(price: f64, stats: &MarketStats) -> FeatureVector {
        FeatureVector {
            change: (stats.change_pct / 10.0).tanh(),
            volatility: stats.volatility.abs().min(1.0),
            momentum: (stats.momentum / 10.0).tanh(),
            log_volume: (1.0 + stats.volume.max(0.0)).ln() / 20.0,
            log_price: (1.0 + price.max(0.0)).ln() / 15.0,
        }
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AggregatedPrice;

    fn agg(price: f64) -> AggregatedPrice {
        AggregatedPrice {
            price,
            ..AggregatedPrice::empty(0)
        }
    }

    #[test]
    fn test_vector_shape() {
        let features = FeatureVector::default();
        assert_eq!(features.to_vec().len(), FeatureVector::NUM_FEATURES);
        assert_eq!(
            FeatureVector::feature_names().len(),
            FeatureVector::NUM_FEATURES
        );
    }

    #[test]
    fn test_normalized_ranges() {
        let mut extractor = FeatureExtractor::new();
        let stats = MarketStats {
            change_pct: 250.0,
            volatility: 9.0,
            momentum: -400.0,
            volume: 1e12,
        };
        let features = extractor.extract(&agg(50_000.0), &stats);

        assert!(features.change <= 1.0 && features.change >= -1.0);
        assert!(features.volatility <= 1.0);
        assert!(features.momentum <= 1.0 && features.momentum >= -1.0);
        assert!(features.log_volume.is_finite());
        assert!(features.log_price.is_finite());
    }

    #[test]
    fn test_derived_change_sign() {
        let mut extractor = FeatureExtractor::new();
        extractor.extract_from_price(&agg(100.0));
        let rising = extractor.extract_from_price(&agg(105.0));
        assert!(rising.change > 0.0);

        let falling = extractor.extract_from_price(&agg(95.0));
        assert!(falling.change < 0.0);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let stats = MarketStats {
            change_pct: 1.5,
            volatility: 0.02,
            momentum: 0.4,
            volume: 1000.0,
        };
        let mut a = FeatureExtractor::new();
        let mut b = FeatureExtractor::new();
        assert_eq!(a.extract(&agg(100.0), &stats), b.extract(&agg(100.0), &stats));
    }
}
