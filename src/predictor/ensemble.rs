//! Boosted ensemble of weak learners
//!
//! Fixed-size ensemble of single-feature threshold rules. Each learner
//! casts a +1/-1 vote; the boosted sum is regularized, and learner weights
//! drift toward rules whose direction matched the realized price change.

use crate::predictor::features::FeatureVector;
use serde::{Deserialize, Serialize};

/// Number of weak learners in the ensemble
pub const ENSEMBLE_SIZE: usize = 12;

/// One single-feature threshold rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeakLearner {
    pub weight: f64,
    pub threshold: f64,
    pub feature_index: usize,
    /// +1.0 or -1.0, flips the vote
    pub direction: f64,
}

impl WeakLearner {
    /// `direction * sign(x[feature_index] - threshold)`, always +1 or -1
    pub fn vote(&self, features: &[f64]) -> f64 {
        let value = features.get(self.feature_index).copied().unwrap_or(0.0);
        if value >= self.threshold {
            self.direction
        } else {
            -self.direction
        }
    }
}

/// Boosted ensemble score with regularization and adaptive weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedEnsemble {
    learners: Vec<WeakLearner>,
    learning_rate: f64,
    regularization: f64,
}

impl BoostedEnsemble {
    /// Deterministic initial ensemble: feature indices cycle through the
    /// vector, thresholds are sinusoidally spread, directions alternate.
    pub fn new(num_features: usize, learning_rate: f64, regularization: f64) -> Self {
        let learners = (0..ENSEMBLE_SIZE)
            .map(|m| WeakLearner {
                weight: 1.0,
                threshold: (m as f64 * 0.37).sin() * 0.5,
                feature_index: m % num_features,
                direction: if m % 2 == 0 { 1.0 } else { -1.0 },
            })
            .collect();
        Self {
            learners,
            learning_rate,
            regularization,
        }
    }

    /// Boosted, regularized score plus the fraction of learners agreeing
    /// with its sign.
    pub fn score(&self, base_score: f64, features: &FeatureVector) -> (f64, f64) {
        let values = features.to_vec();

        let mut score = base_score;
        for learner in &self.learners {
            score += self.learning_rate * learner.weight * learner.vote(&values);
        }
        score /= 1.0 + self.regularization * score.abs();

        let agreeing = self
            .learners
            .iter()
            .filter(|l| l.vote(&values).signum() == score.signum())
            .count();
        let agreement = agreeing as f64 / self.learners.len() as f64;

        (score, agreement)
    }

    /// Nudge learner weights toward rules aligned with the realized
    /// change: `w *= 1 + lr * alignment * 0.1`, clamped to [0.01, 2.0].
    pub fn update_weights(&mut self, features: &FeatureVector, actual_change: f64) {
        if actual_change == 0.0 {
            return;
        }
        let values = features.to_vec();
        let realized = actual_change.signum();
        for learner in &mut self.learners {
            let alignment = learner.vote(&values) * realized;
            learner.weight =
                (learner.weight * (1.0 + self.learning_rate * alignment * 0.1)).clamp(0.01, 2.0);
        }
    }

    pub fn learners(&self) -> &[WeakLearner] {
        &self.learners
    }
}
