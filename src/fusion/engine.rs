//! Price Fusion Engine
//!
//! Reduces a batch of observations for one instant into a single fused
//! price with a confidence score. Outliers are rejected with robust
//! statistics (median / MAD / modified z-score) before volume-weighted
//! averaging. Pure function of its inputs; never errors.

use crate::fusion::weights::{SourceWeightTable, WeightSnapshot};
use crate::types::{now_ms, AggregatedPrice, FusionMethod, Observation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Tunable fusion constants. Defaults follow the reference behavior;
/// expose them for calibration rather than hard-coding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Observations older than this are flagged stale (ms)
    pub stale_ms: i64,
    /// Observations below this confidence are flagged unreliable
    pub min_source_confidence: f64,
    /// Modified z-score above which a price is an outlier
    pub z_score_threshold: f64,
    /// Percentage deviation threshold used when MAD collapses to zero
    pub identical_pct_threshold: f64,
    /// Weight of the valid-source-count factor in the confidence score
    pub count_weight: f64,
    /// Weight of the average weighted source confidence
    pub confidence_weight: f64,
    /// Consistency bonus cap (bonus = max(0, cap - coefficient of variation))
    pub consistency_cap: f64,
    /// Confidence penalty per filtered outlier
    pub outlier_penalty: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            stale_ms: 5_000,
            min_source_confidence: 0.3,
            z_score_threshold: 2.0,
            identical_pct_threshold: 0.05,
            count_weight: 0.3,
            confidence_weight: 0.5,
            consistency_cap: 0.2,
            outlier_penalty: 0.1,
        }
    }
}

/// Multi-source price fusion engine
pub struct FusionEngine {
    config: FusionConfig,
    weights: Arc<SourceWeightTable>,
}

impl FusionEngine {
    pub fn new(config: FusionConfig, weights: Arc<SourceWeightTable>) -> Self {
        Self { config, weights }
    }

    /// Fuse a batch of observations using the current wall clock for
    /// staleness checks.
    pub fn aggregate(&self, observations: &[Observation]) -> AggregatedPrice {
        self.aggregate_at(observations, now_ms())
    }

    /// Fuse a batch of observations against an explicit "now" (ms).
    pub fn aggregate_at(&self, observations: &[Observation], now: i64) -> AggregatedPrice {
        if observations.is_empty() {
            return AggregatedPrice::empty(now);
        }

        // One consistent view of the weight table for the whole pass
        let weights = self.weights.snapshot();

        if observations.len() == 1 {
            let obs = &observations[0];
            return AggregatedPrice {
                ts: now,
                price: obs.price,
                confidence: (obs.confidence * weights.weight(&obs.source)).clamp(0.0, 1.0),
                sources_used: vec![obs.source.clone()],
                outliers_filtered: Vec::new(),
                method: FusionMethod::Single,
            };
        }

        let outlier_mask = self.detect_outliers(observations, now, &weights);

        let valid: Vec<&Observation> = observations
            .iter()
            .zip(&outlier_mask)
            .filter(|(_, &out)| !out)
            .map(|(o, _)| o)
            .collect();
        let outliers: Vec<&Observation> = observations
            .iter()
            .zip(&outlier_mask)
            .filter(|(_, &out)| out)
            .map(|(o, _)| o)
            .collect();

        let (price, method) = if valid.len() >= 2 {
            (Self::vwap(&valid, &weights), FusionMethod::Fused)
        } else if valid.len() == 1 {
            (valid[0].price, FusionMethod::Single)
        } else {
            // Unreachable given the never-empty override, kept defensively
            let all: Vec<f64> = observations.iter().map(|o| o.price).collect();
            (median(&all), FusionMethod::Median)
        };

        let confidence = self.score_confidence(&valid, outliers.len(), &weights);

        AggregatedPrice {
            ts: now,
            price,
            confidence,
            sources_used: valid.iter().map(|o| o.source.clone()).collect(),
            outliers_filtered: outliers.iter().map(|o| o.source.clone()).collect(),
            method,
        }
    }

    /// Robust outlier detection. Returns a flag per observation.
    ///
    /// The statistical test (median / MAD / modified z-score) needs at
    /// least three points; staleness and low-confidence flags apply
    /// regardless. If everything ends up flagged, the observation with the
    /// best weight-times-confidence product is kept so the engine never
    /// runs out of valid inputs.
    fn detect_outliers(
        &self,
        observations: &[Observation],
        now: i64,
        weights: &WeightSnapshot,
    ) -> Vec<bool> {
        let n = observations.len();
        let mut mask = vec![false; n];

        if n > 2 {
            let prices: Vec<f64> = observations.iter().map(|o| o.price).collect();
            let med = median(&prices);
            let deviations: Vec<f64> = prices.iter().map(|p| (p - med).abs()).collect();
            let mad = median(&deviations);

            for (i, obs) in observations.iter().enumerate() {
                if mad == 0.0 {
                    // All prices (near-)identical; fall back to a plain
                    // percentage deviation test
                    if med > 0.0 && (obs.price - med).abs() / med > self.config.identical_pct_threshold {
                        mask[i] = true;
                    }
                } else {
                    let z = 0.6745 * (obs.price - med).abs() / mad;
                    if z > self.config.z_score_threshold {
                        mask[i] = true;
                        debug!(
                            source = %obs.source,
                            price = obs.price,
                            z_score = z,
                            "observation flagged as statistical outlier"
                        );
                    }
                }
            }
        }

        for (i, obs) in observations.iter().enumerate() {
            if now - obs.timestamp > self.config.stale_ms {
                mask[i] = true;
            }
            if obs.confidence < self.config.min_source_confidence {
                mask[i] = true;
            }
        }

        if mask.iter().all(|&out| out) {
            // Never produce zero valid inputs: keep the strongest source
            let best = observations
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| {
                    let qa = weights.weight(&a.source) * a.confidence;
                    let qb = weights.weight(&b.source) * b.confidence;
                    qa.total_cmp(&qb)
                })
                .map(|(i, _)| i);
            if let Some(i) = best {
                mask[i] = false;
            }
        }

        mask
    }

    /// Volume-weighted average with reliability- and confidence-adjusted
    /// volumes; falls back to an arithmetic mean when all adjusted
    /// volumes are zero.
    fn vwap(valid: &[&Observation], weights: &WeightSnapshot) -> f64 {
        let mut weighted_sum = 0.0;
        let mut volume_sum = 0.0;
        for obs in valid {
            let adjusted = obs.volume * weights.weight(&obs.source) * obs.confidence;
            weighted_sum += obs.price * adjusted;
            volume_sum += adjusted;
        }
        if volume_sum > 0.0 {
            weighted_sum / volume_sum
        } else {
            valid.iter().map(|o| o.price).sum::<f64>() / valid.len() as f64
        }
    }

    /// Composite confidence: source count, weighted source confidence,
    /// price consistency, outlier penalty.
    fn score_confidence(
        &self,
        valid: &[&Observation],
        outlier_count: usize,
        weights: &WeightSnapshot,
    ) -> f64 {
        if valid.is_empty() {
            return 0.1;
        }

        let count_factor = (valid.len() as f64 / 3.0).min(1.0);

        let avg_weighted_confidence = valid
            .iter()
            .map(|o| o.confidence * weights.weight(&o.source))
            .sum::<f64>()
            / valid.len() as f64;

        let prices: Vec<f64> = valid.iter().map(|o| o.price).collect();
        let mean = prices.iter().sum::<f64>() / prices.len() as f64;
        // A lone surviving price has zero spread and earns the full bonus
        let consistency_bonus = if mean > 0.0 {
            let variance =
                prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / prices.len() as f64;
            let cv = variance.sqrt() / mean;
            (self.config.consistency_cap - cv).max(0.0)
        } else {
            0.0
        };

        let penalty = self.config.outlier_penalty * outlier_count as f64;

        (self.config.count_weight * count_factor
            + self.config.confidence_weight * avg_weighted_confidence
            + consistency_bonus
            - penalty)
            .clamp(0.1, 1.0)
    }
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(
            FusionConfig::default(),
            Arc::new(SourceWeightTable::with_defaults()),
        )
    }
}

/// Median of a slice (copies; slices here are tiny)
fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PriceSource;
    use std::collections::HashMap;

    const NOW: i64 = 1_700_000_000_000;

    fn make_obs(source: &str, price: f64, volume: f64, confidence: f64) -> Observation {
        Observation::new(source, price, volume, NOW, confidence)
    }

    fn equal_weight_engine() -> FusionEngine {
        // Empty table -> every source gets the 0.5 default, i.e. equal weights
        FusionEngine::new(FusionConfig::default(), Arc::new(SourceWeightTable::empty()))
    }

    #[test]
    fn test_empty_batch() {
        let engine = FusionEngine::default();
        let agg = engine.aggregate_at(&[], NOW);
        assert_eq!(agg.price, 0.0);
        assert_eq!(agg.confidence, 0.0);
        assert!(agg.sources_used.is_empty());
        assert_eq!(agg.method, FusionMethod::Single);
    }

    #[test]
    fn test_single_source_passthrough() {
        let engine = FusionEngine::default();
        let obs = make_obs("binance", 100.0, 1.0, 0.9);
        let agg = engine.aggregate_at(&[obs], NOW);

        assert_eq!(agg.price, 100.0);
        assert_eq!(agg.method, FusionMethod::Single);
        assert_eq!(agg.sources_used, vec![PriceSource::new("binance")]);
        assert!((agg.confidence - 0.9 * 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_outlier_rejected() {
        let engine = equal_weight_engine();
        let batch = vec![
            make_obs("a", 100.0, 1.0, 0.9),
            make_obs("b", 101.0, 1.0, 0.9),
            make_obs("c", 99.0, 1.0, 0.9),
            make_obs("d", 500.0, 1.0, 0.9),
        ];
        let agg = engine.aggregate_at(&batch, NOW);

        assert_eq!(agg.outliers_filtered, vec![PriceSource::new("d")]);
        assert_eq!(agg.sources_used.len(), 3);
        assert!(agg.price < 200.0, "outlier leaked into fusion: {}", agg.price);
        assert_eq!(agg.method, FusionMethod::Fused);
    }

    #[test]
    fn test_vwap_weighted_mean() {
        let engine = equal_weight_engine();
        let batch = vec![
            make_obs("a", 100.0, 10.0, 1.0),
            make_obs("b", 110.0, 30.0, 1.0),
        ];
        let agg = engine.aggregate_at(&batch, NOW);
        // (100*10 + 110*30) / 40 — equal source weights and confidence
        // cancel out of the ratio
        assert!((agg.price - 107.5).abs() < 1e-9);
        assert_eq!(agg.method, FusionMethod::Fused);
    }

    #[test]
    fn test_zero_volume_falls_back_to_mean() {
        let engine = equal_weight_engine();
        let batch = vec![
            make_obs("a", 100.0, 0.0, 1.0),
            make_obs("b", 110.0, 0.0, 1.0),
        ];
        let agg = engine.aggregate_at(&batch, NOW);
        assert!((agg.price - 105.0).abs() < 1e-9);
    }

    #[test]
    fn test_mad_zero_uses_pct_deviation() {
        let engine = equal_weight_engine();
        // Four identical prices and one 6% off: MAD is 0, the deviator
        // exceeds the 5% rule
        let batch = vec![
            make_obs("a", 100.0, 1.0, 0.9),
            make_obs("b", 100.0, 1.0, 0.9),
            make_obs("c", 100.0, 1.0, 0.9),
            make_obs("d", 100.0, 1.0, 0.9),
            make_obs("e", 106.0, 1.0, 0.9),
        ];
        let agg = engine.aggregate_at(&batch, NOW);
        assert_eq!(agg.outliers_filtered, vec![PriceSource::new("e")]);
    }

    #[test]
    fn test_stale_observation_filtered() {
        let engine = equal_weight_engine();
        let mut stale = make_obs("old", 100.0, 1.0, 0.9);
        stale.timestamp = NOW - 10_000;
        let batch = vec![stale, make_obs("fresh", 101.0, 1.0, 0.9)];
        let agg = engine.aggregate_at(&batch, NOW);

        assert_eq!(agg.outliers_filtered, vec![PriceSource::new("old")]);
        assert_eq!(agg.price, 101.0);
        assert_eq!(agg.method, FusionMethod::Single);
    }

    #[test]
    fn test_single_survivor_confidence() {
        let engine = equal_weight_engine();
        let mut stale = make_obs("old", 100.0, 1.0, 0.9);
        stale.timestamp = NOW - 10_000;
        let batch = vec![stale, make_obs("fresh", 101.0, 1.0, 0.9)];
        let agg = engine.aggregate_at(&batch, NOW);

        assert_eq!(agg.sources_used.len(), 1);
        // count: 0.3 * (1/3); confidence: 0.5 * (0.9 * 0.5);
        // consistency: full 0.2 for a single price; outlier penalty: 0.1
        let expected = 0.3 * (1.0 / 3.0) + 0.5 * (0.9 * 0.5) + 0.2 - 0.1;
        assert!(
            (agg.confidence - expected).abs() < 1e-9,
            "confidence {} != {}",
            agg.confidence,
            expected
        );
    }

    #[test]
    fn test_low_confidence_filtered() {
        let engine = equal_weight_engine();
        let batch = vec![
            make_obs("shaky", 100.0, 1.0, 0.1),
            make_obs("solid", 101.0, 1.0, 0.9),
        ];
        let agg = engine.aggregate_at(&batch, NOW);
        assert_eq!(agg.outliers_filtered, vec![PriceSource::new("shaky")]);
    }

    #[test]
    fn test_never_empty_guarantee() {
        let engine = equal_weight_engine();
        // Every observation is stale, so all get flagged; the strongest
        // one must be kept anyway
        let mut batch = vec![
            make_obs("a", 100.0, 1.0, 0.5),
            make_obs("b", 101.0, 1.0, 0.9),
            make_obs("c", 99.0, 1.0, 0.4),
        ];
        for obs in &mut batch {
            obs.timestamp = NOW - 60_000;
        }
        let agg = engine.aggregate_at(&batch, NOW);

        assert_eq!(agg.sources_used.len(), 1);
        assert_eq!(agg.sources_used[0], PriceSource::new("b"));
        assert!(agg.price > 0.0);
    }

    #[test]
    fn test_sources_and_outliers_disjoint() {
        let engine = equal_weight_engine();
        let batch = vec![
            make_obs("a", 100.0, 1.0, 0.9),
            make_obs("b", 101.0, 1.0, 0.9),
            make_obs("c", 99.0, 1.0, 0.9),
            make_obs("d", 500.0, 1.0, 0.9),
        ];
        let agg = engine.aggregate_at(&batch, NOW);
        for used in &agg.sources_used {
            assert!(!agg.outliers_filtered.contains(used));
        }
    }

    #[test]
    fn test_confidence_monotonicity() {
        let engine = equal_weight_engine();
        let single = engine.aggregate_at(&[make_obs("a", 100.0, 1.0, 0.9)], NOW);
        let double = engine.aggregate_at(
            &[make_obs("a", 100.0, 1.0, 0.9), make_obs("b", 100.0, 1.0, 0.95)],
            NOW,
        );
        assert!(double.confidence >= single.confidence);
    }

    #[test]
    fn test_confidence_bounds() {
        let engine = equal_weight_engine();
        let batch = vec![
            make_obs("a", 100.0, 1.0, 1.0),
            make_obs("b", 100.0, 1.0, 1.0),
            make_obs("c", 100.0, 1.0, 1.0),
            make_obs("d", 100.0, 1.0, 1.0),
        ];
        let agg = engine.aggregate_at(&batch, NOW);
        assert!(agg.confidence >= 0.0 && agg.confidence <= 1.0);
    }

    #[test]
    fn test_configured_weights_shift_vwap() {
        let mut overrides = HashMap::new();
        overrides.insert("trusted".to_string(), 1.0);
        overrides.insert("shaky".to_string(), 0.1);
        let engine = FusionEngine::new(
            FusionConfig::default(),
            Arc::new(SourceWeightTable::with_overrides(&overrides)),
        );
        let batch = vec![
            make_obs("trusted", 100.0, 10.0, 1.0),
            make_obs("shaky", 110.0, 10.0, 1.0),
        ];
        let agg = engine.aggregate_at(&batch, NOW);
        // Heavily weighted toward the trusted source
        assert!(agg.price < 102.0, "price {}", agg.price);
    }

    #[test]
    fn test_median_helper() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }
}
