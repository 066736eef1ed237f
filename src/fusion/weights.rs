//! Source reliability weights
//!
//! Fixed lookup table mapping source identifier to a weight in (0, 1].
//! This is configuration, not derived data: the table can be replaced at
//! runtime (hot reload), and readers always observe a consistent snapshot.

use crate::types::PriceSource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;

/// Weight assigned to sources absent from the table
pub const DEFAULT_SOURCE_WEIGHT: f64 = 0.5;

/// Immutable view of the weight table taken at the start of a computation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WeightSnapshot {
    weights: HashMap<String, f64>,
}

impl WeightSnapshot {
    pub fn weight(&self, source: &PriceSource) -> f64 {
        self.weights
            .get(source.as_str())
            .copied()
            .unwrap_or(DEFAULT_SOURCE_WEIGHT)
    }
}

/// Process-wide, hot-reloadable source reliability table
#[derive(Debug)]
pub struct SourceWeightTable {
    inner: RwLock<HashMap<String, f64>>,
}

impl SourceWeightTable {
    /// Table with the built-in venue defaults
    pub fn with_defaults() -> Self {
        let mut weights = HashMap::new();
        weights.insert("binance".to_string(), 0.95);
        weights.insert("coinbase".to_string(), 0.90);
        weights.insert("kraken".to_string(), 0.88);
        weights.insert("bybit".to_string(), 0.85);
        weights.insert("okx".to_string(), 0.82);
        weights.insert("chainlink".to_string(), 0.92);
        Self {
            inner: RwLock::new(weights),
        }
    }

    /// Empty table; every source falls back to the default weight
    pub fn empty() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Build from configured overrides layered on the defaults
    pub fn with_overrides(overrides: &HashMap<String, f64>) -> Self {
        let table = Self::with_defaults();
        if !overrides.is_empty() {
            let mut guard = table.inner.write().unwrap_or_else(|e| e.into_inner());
            for (source, weight) in overrides {
                guard.insert(source.clone(), clamp_weight(*weight));
            }
        }
        table
    }

    /// Weight for a single source; unknown sources default to 0.5
    pub fn weight(&self, source: &PriceSource) -> f64 {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(source.as_str())
            .copied()
            .unwrap_or(DEFAULT_SOURCE_WEIGHT)
    }

    /// Consistent snapshot for use across one aggregation pass
    pub fn snapshot(&self) -> WeightSnapshot {
        WeightSnapshot {
            weights: self.inner.read().unwrap_or_else(|e| e.into_inner()).clone(),
        }
    }

    /// Replace the whole table atomically (hot reload)
    pub fn reload(&self, weights: HashMap<String, f64>) {
        let sanitized: HashMap<String, f64> = weights
            .into_iter()
            .map(|(s, w)| (s, clamp_weight(w)))
            .collect();
        let count = sanitized.len();
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = sanitized;
        info!("Source weight table reloaded with {} entries", count);
    }
}

impl Default for SourceWeightTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn clamp_weight(w: f64) -> f64 {
    if w.is_finite() {
        w.clamp(0.01, 1.0)
    } else {
        DEFAULT_SOURCE_WEIGHT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_source_defaults() {
        let table = SourceWeightTable::with_defaults();
        let weight = table.weight(&PriceSource::new("mystery-dex"));
        assert_eq!(weight, DEFAULT_SOURCE_WEIGHT);
    }

    #[test]
    fn test_known_source_weight() {
        let table = SourceWeightTable::with_defaults();
        assert!(table.weight(&PriceSource::new("binance")) > 0.9);
    }

    #[test]
    fn test_reload_replaces_whole_table() {
        let table = SourceWeightTable::with_defaults();
        let mut weights = HashMap::new();
        weights.insert("binance".to_string(), 0.4);
        table.reload(weights);

        assert_eq!(table.weight(&PriceSource::new("binance")), 0.4);
        // Former defaults are gone after a full reload
        assert_eq!(
            table.weight(&PriceSource::new("coinbase")),
            DEFAULT_SOURCE_WEIGHT
        );
    }

    #[test]
    fn test_snapshot_is_stable_across_reload() {
        let table = SourceWeightTable::with_defaults();
        let snapshot = table.snapshot();
        table.reload(HashMap::new());
        assert!(snapshot.weight(&PriceSource::new("binance")) > 0.9);
    }

    #[test]
    fn test_overrides_layer_on_defaults() {
        let mut overrides = HashMap::new();
        overrides.insert("binance".to_string(), 0.5);
        overrides.insert("newvenue".to_string(), 0.7);
        let table = SourceWeightTable::with_overrides(&overrides);
        assert_eq!(table.weight(&PriceSource::new("binance")), 0.5);
        assert_eq!(table.weight(&PriceSource::new("newvenue")), 0.7);
        assert!(table.weight(&PriceSource::new("coinbase")) > 0.8);
    }
}
