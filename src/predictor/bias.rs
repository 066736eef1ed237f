//! Sequential bias predictor
//!
//! Combines the gated memory cell's temporal signal with the boosted
//! ensemble score, applies mean-reversion correction and self-tuned
//! thresholds, and classifies the result as LONG / SHORT / NEUTRAL.

use crate::predictor::features::FeatureVector;
use crate::predictor::memory::GatedMemoryCell;
use crate::predictor::state::{AdaptiveThresholds, PredictorState, ScoreEntry};
use crate::types::{now_ms, Bias, BiasPrediction};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// History entries consulted for mean-reversion correction
const MEAN_REVERSION_WINDOW: usize = 10;
/// History entries consulted when re-tuning thresholds
const THRESHOLD_WINDOW: usize = 20;
/// Minimum ensemble agreement for a directional call
const MIN_AGREEMENT: f64 = 0.5;

/// Tunable blend constants. These are calibration knobs with no derived
/// justification; defaults follow the reference behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Weight of the temporal signal in the blended score
    pub temporal_weight: f64,
    /// Weight of the ensemble score in the blended score
    pub ensemble_weight: f64,
    /// Temporal contribution to the ensemble's base score
    pub base_score_scale: f64,
    /// Boosting learning rate
    pub learning_rate: f64,
    /// Score regularization strength
    pub regularization: f64,
    /// Mean-reversion trigger on |mean of recent scores|
    pub mean_reversion_trigger: f64,
    /// Mean-reversion correction strength
    pub mean_reversion_strength: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            temporal_weight: 0.4,
            ensemble_weight: 0.6,
            base_score_scale: 0.3,
            learning_rate: 0.1,
            regularization: 0.05,
            mean_reversion_trigger: 0.5,
            mean_reversion_strength: 0.1,
        }
    }
}

/// Stateless predictor logic; all per-instrument state lives in
/// `PredictorState`, which the caller passes in exclusively borrowed.
pub struct BiasPredictor {
    cell: GatedMemoryCell,
    config: PredictorConfig,
}

impl BiasPredictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self {
            cell: GatedMemoryCell::new(FeatureVector::NUM_FEATURES),
            config,
        }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Fresh state matching this predictor's configuration
    pub fn initial_state(&self) -> PredictorState {
        PredictorState::new(self.config.learning_rate, self.config.regularization)
    }

    /// One prediction step. Mutates `state`; the `&mut` borrow is the
    /// per-instrument critical section required by the concurrency model.
    pub fn predict(
        &self,
        state: &mut PredictorState,
        features: &FeatureVector,
        now: i64,
    ) -> BiasPrediction {
        // Step 1: temporal memory update
        let h_new = self.cell.step(&state.memory, &features.to_vec());
        let temporal_signal = h_new.mean().unwrap_or(0.0);
        let temporal_strength = temporal_signal.abs();

        // Step 2: boosted ensemble score
        let base_score = temporal_signal * self.config.base_score_scale;
        let (ensemble_score, ensemble_agreement) = state.ensemble.score(base_score, features);

        // Step 3: blend, then lean against a persistently one-sided
        // recent history
        let raw_score = self.config.temporal_weight * temporal_signal
            + self.config.ensemble_weight * ensemble_score;
        let adaptive_score = match state.recent_score_mean(MEAN_REVERSION_WINDOW) {
            Some(mean_recent) if mean_recent.abs() > self.config.mean_reversion_trigger => {
                raw_score - self.config.mean_reversion_strength * mean_recent
            }
            _ => raw_score,
        };

        // Step 4: classify against the adaptive thresholds
        let bias = if adaptive_score > state.thresholds.bullish
            && ensemble_agreement > MIN_AGREEMENT
        {
            Bias::Long
        } else if adaptive_score < state.thresholds.bearish && ensemble_agreement > MIN_AGREEMENT {
            Bias::Short
        } else {
            Bias::Neutral
        };

        let base_confidence = (adaptive_score.abs() * 100.0
            + ensemble_agreement * 15.0
            + temporal_strength * 10.0)
            .min(80.0);
        let confidence = if bias == Bias::Neutral {
            (base_confidence * 0.6).min(55.0)
        } else {
            base_confidence
        };
        let confidence = confidence.round().clamp(0.0, 100.0) as u8;

        // Step 5: state update
        state.push_sequence(features.clone());
        state.push_history(ScoreEntry {
            score: adaptive_score,
            confidence,
            ts: now,
        });
        self.retune_thresholds(state);
        state.ensemble.update_weights(features, features.change);
        state.memory = h_new;
        state.predictions += 1;

        BiasPrediction {
            bias,
            confidence,
            temporal_strength,
            ensemble_agreement,
            adaptive_score,
        }
    }

    /// Prediction step against the wall clock
    pub fn predict_now(&self, state: &mut PredictorState, features: &FeatureVector) -> BiasPrediction {
        self.predict(state, features, now_ms())
    }

    /// Pull the classification boundaries toward the typical recent score
    /// magnitude once enough history has accumulated.
    fn retune_thresholds(&self, state: &mut PredictorState) {
        if let Some(avg_abs) = state.recent_abs_score_mean(THRESHOLD_WINDOW) {
            let bullish = (0.8 * avg_abs).clamp(0.2, 0.5);
            let new = AdaptiveThresholds {
                bullish,
                bearish: -bullish,
            };
            if (new.bullish - state.thresholds.bullish).abs() > 1e-12 {
                debug!(
                    bullish = new.bullish,
                    bearish = new.bearish,
                    "adaptive thresholds re-tuned"
                );
            }
            state.thresholds = new;
        }
    }
}

impl Default for BiasPredictor {
    fn default() -> Self {
        Self::new(PredictorConfig::default())
    }
}
