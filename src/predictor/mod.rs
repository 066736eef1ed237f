//! Predictor module - Sequential directional bias prediction
//!
//! A stateful per-instrument predictor combining:
//! - a gated recurrent memory cell (fixed deterministic projection)
//! - a boosted ensemble of single-feature weak learners
//! - mean-reversion correction and self-tuned decision thresholds

pub mod bias;
pub mod ensemble;
pub mod features;
pub mod memory;
pub mod state;

pub use bias::{BiasPredictor, PredictorConfig};
pub use ensemble::{BoostedEnsemble, WeakLearner, ENSEMBLE_SIZE};
pub use features::{FeatureExtractor, FeatureVector, MarketStats};
pub use memory::{GatedMemoryCell, HIDDEN_SIZE};
pub use state::{AdaptiveThresholds, PredictorState, ScoreEntry, HISTORY_CAP, SEQUENCE_CAP};
