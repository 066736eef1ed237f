//! Per-instrument predictor state
//!
//! The only entity in the core with a real lifecycle: created lazily on
//! first sight of an instrument, mutated on every prediction, resettable
//! by the caller. Never shared across instruments.

use crate::predictor::ensemble::BoostedEnsemble;
use crate::predictor::features::FeatureVector;
use crate::predictor::memory::GatedMemoryCell;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Bounded history of blended scores
pub const HISTORY_CAP: usize = 50;
/// Bounded buffer of raw feature inputs (replay / analysis only)
pub const SEQUENCE_CAP: usize = 100;

/// One past blended score with its confidence and time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub score: f64,
    pub confidence: u8,
    pub ts: i64,
}

/// Self-tuned classification boundaries
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdaptiveThresholds {
    pub bullish: f64,
    pub bearish: f64,
}

impl Default for AdaptiveThresholds {
    fn default() -> Self {
        Self {
            bullish: 0.3,
            bearish: -0.3,
        }
    }
}

/// Mutable state owned by one instrument's predictor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorState {
    /// Hidden state of the gated memory cell
    pub memory: Array1<f64>,
    /// Boosted ensemble with adaptive weights
    pub ensemble: BoostedEnsemble,
    /// Recent blended scores, most-recent-last
    pub history: VecDeque<ScoreEntry>,
    /// Recent raw feature inputs, most-recent-last
    pub sequence_buffer: VecDeque<FeatureVector>,
    /// Current classification boundaries
    pub thresholds: AdaptiveThresholds,
    /// Total predictions served from this state
    pub predictions: u64,
}

impl PredictorState {
    pub fn new(learning_rate: f64, regularization: f64) -> Self {
        Self {
            memory: GatedMemoryCell::initial_state(),
            ensemble: BoostedEnsemble::new(
                FeatureVector::NUM_FEATURES,
                learning_rate,
                regularization,
            ),
            history: VecDeque::with_capacity(HISTORY_CAP),
            sequence_buffer: VecDeque::with_capacity(SEQUENCE_CAP),
            thresholds: AdaptiveThresholds::default(),
            predictions: 0,
        }
    }

    /// Append to history, evicting the oldest entry beyond the cap
    pub fn push_history(&mut self, entry: ScoreEntry) {
        self.history.push_back(entry);
        while self.history.len() > HISTORY_CAP {
            self.history.pop_front();
        }
    }

    /// Append to the sequence buffer, evicting beyond the cap
    pub fn push_sequence(&mut self, features: FeatureVector) {
        self.sequence_buffer.push_back(features);
        while self.sequence_buffer.len() > SEQUENCE_CAP {
            self.sequence_buffer.pop_front();
        }
    }

    /// Mean of the last `n` blended scores, if at least `n` exist
    pub fn recent_score_mean(&self, n: usize) -> Option<f64> {
        if self.history.len() < n {
            return None;
        }
        let sum: f64 = self.history.iter().rev().take(n).map(|e| e.score).sum();
        Some(sum / n as f64)
    }

    /// Mean absolute score of the last `n` entries
    pub fn recent_abs_score_mean(&self, n: usize) -> Option<f64> {
        if self.history.len() < n {
            return None;
        }
        let sum: f64 = self
            .history
            .iter()
            .rev()
            .take(n)
            .map(|e| e.score.abs())
            .sum();
        Some(sum / n as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_cap() {
        let mut state = PredictorState::new(0.1, 0.05);
        for i in 0..120 {
            state.push_history(ScoreEntry {
                score: i as f64,
                confidence: 50,
                ts: i,
            });
        }
        assert_eq!(state.history.len(), HISTORY_CAP);
        // Oldest evicted, newest kept
        assert_eq!(state.history.front().unwrap().ts, 70);
        assert_eq!(state.history.back().unwrap().ts, 119);
    }

    #[test]
    fn test_sequence_cap() {
        let mut state = PredictorState::new(0.1, 0.05);
        for _ in 0..250 {
            state.push_sequence(FeatureVector::default());
        }
        assert_eq!(state.sequence_buffer.len(), SEQUENCE_CAP);
    }

    #[test]
    fn test_recent_means() {
        let mut state = PredictorState::new(0.1, 0.05);
        assert!(state.recent_score_mean(10).is_none());
        for i in 0..10 {
            state.push_history(ScoreEntry {
                score: if i % 2 == 0 { 0.5 } else { -0.5 },
                confidence: 50,
                ts: i,
            });
        }
        assert_eq!(state.recent_score_mean(10), Some(0.0));
        assert_eq!(state.recent_abs_score_mean(10), Some(0.5));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut state = PredictorState::new(0.1, 0.05);
        state.push_history(ScoreEntry {
            score: 0.42,
            confidence: 61,
            ts: 1,
        });
        let json = serde_json::to_string(&state).unwrap();
        let restored: PredictorState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.history.len(), 1);
        assert_eq!(restored.memory.len(), state.memory.len());
        assert_eq!(restored.thresholds.bullish, state.thresholds.bullish);
    }
}
