//! Instrument state store
//!
//! Keyed store mapping instrument identifier to predictor state. State is
//! created lazily on first use, guarded by a mutex per instrument (the
//! predictor's step 1-5 read-modify-write must never interleave for the
//! same instrument), and can be reset, inspected, or snapshot to disk.

use crate::predictor::{BiasPredictor, FeatureVector, PredictorConfig, PredictorState};
use crate::types::{now_ms, BiasPrediction, Instrument};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

struct StoreEntry {
    state: Mutex<PredictorState>,
    last_used: AtomicI64,
}

/// Store-wide diagnostics
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub instruments: usize,
    pub predictions: u64,
}

/// Keyed predictor-state store with optional LRU eviction
pub struct InstrumentStore {
    predictor: BiasPredictor,
    states: RwLock<HashMap<Instrument, Arc<StoreEntry>>>,
    /// When set, the least recently used instrument is evicted once the
    /// store grows past this many entries
    capacity: Option<usize>,
}

impl InstrumentStore {
    pub fn new(config: PredictorConfig) -> Self {
        Self {
            predictor: BiasPredictor::new(config),
            states: RwLock::new(HashMap::new()),
            capacity: None,
        }
    }

    /// Store that evicts the least recently used instrument beyond
    /// `capacity` tracked instruments
    pub fn with_capacity(config: PredictorConfig, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::new(config)
        }
    }

    /// Predict for an instrument, creating its state on first sight.
    pub fn predict(&self, id: &Instrument, features: &FeatureVector) -> BiasPrediction {
        self.predict_at(id, features, now_ms())
    }

    /// Predict against an explicit timestamp (replay / tests).
    pub fn predict_at(&self, id: &Instrument, features: &FeatureVector, now: i64) -> BiasPrediction {
        let entry = self.get_or_create(id);
        entry.last_used.store(now, Ordering::Relaxed);
        // Poisoning only happens if another caller panicked mid-update;
        // the numeric state is still structurally valid, so recover it
        let mut state = entry.state.lock().unwrap_or_else(|e| e.into_inner());
        self.predictor.predict(&mut state, features, now)
    }

    /// Replace an instrument's state with a freshly initialized one.
    pub fn reset(&self, id: &Instrument) {
        let fresh = self.predictor.initial_state();
        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        match states.get(id) {
            Some(entry) => {
                *entry.state.lock().unwrap_or_else(|e| e.into_inner()) = fresh;
            }
            None => {
                states.insert(
                    id.clone(),
                    Arc::new(StoreEntry {
                        state: Mutex::new(fresh),
                        last_used: AtomicI64::new(now_ms()),
                    }),
                );
            }
        }
        debug!(instrument = %id, "predictor state reset");
    }

    /// Remove an instrument's state entirely.
    pub fn evict(&self, id: &Instrument) -> bool {
        self.states
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some()
    }

    /// Read-only snapshot of an instrument's state for diagnostics.
    pub fn get(&self, id: &Instrument) -> Option<PredictorState> {
        let states = self.states.read().unwrap_or_else(|e| e.into_inner());
        states
            .get(id)
            .map(|entry| entry.state.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    pub fn stats(&self) -> StoreStats {
        let states = self.states.read().unwrap_or_else(|e| e.into_inner());
        let predictions = states
            .values()
            .map(|e| e.state.lock().unwrap_or_else(|p| p.into_inner()).predictions)
            .sum();
        StoreStats {
            instruments: states.len(),
            predictions,
        }
    }

    /// Persist all instrument states as one JSON snapshot. The memory
    /// cell's projection weights are deterministic and rebuilt on load,
    /// so only mutable state is written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let states = self.states.read().unwrap_or_else(|e| e.into_inner());
        let snapshot: HashMap<Instrument, PredictorState> = states
            .iter()
            .map(|(id, entry)| {
                (
                    id.clone(),
                    entry.state.lock().unwrap_or_else(|p| p.into_inner()).clone(),
                )
            })
            .collect();
        drop(states);

        let json = serde_json::to_string_pretty(&snapshot)?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path.as_ref(), json)?;
        info!(
            instruments = snapshot.len(),
            path = %path.as_ref().display(),
            "predictor state snapshot saved"
        );
        Ok(())
    }

    /// Replace the store contents from a JSON snapshot.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let json = fs::read_to_string(path.as_ref())?;
        let snapshot: HashMap<Instrument, PredictorState> = serde_json::from_str(&json)?;
        let count = snapshot.len();

        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        states.clear();
        for (id, state) in snapshot {
            states.insert(
                id,
                Arc::new(StoreEntry {
                    state: Mutex::new(state),
                    last_used: AtomicI64::new(now_ms()),
                }),
            );
        }
        info!(instruments = count, "predictor state snapshot loaded");
        Ok(())
    }

    fn get_or_create(&self, id: &Instrument) -> Arc<StoreEntry> {
        {
            let states = self.states.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = states.get(id) {
                return entry.clone();
            }
        }

        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        // Another caller may have created it between the locks
        if let Some(entry) = states.get(id) {
            return entry.clone();
        }

        if let Some(capacity) = self.capacity {
            if states.len() >= capacity {
                let lru = states
                    .iter()
                    .min_by_key(|(_, e)| e.last_used.load(Ordering::Relaxed))
                    .map(|(id, _)| id.clone());
                if let Some(victim) = lru {
                    states.remove(&victim);
                    debug!(instrument = %victim, "evicted least recently used state");
                }
            }
        }

        let entry = Arc::new(StoreEntry {
            state: Mutex::new(self.predictor.initial_state()),
            last_used: AtomicI64::new(now_ms()),
        });
        states.insert(id.clone(), entry.clone());
        debug!(instrument = %id, "predictor state created");
        entry
    }
}

impl Default for InstrumentStore {
    fn default() -> Self {
        Self::new(PredictorConfig::default())
    }
}
