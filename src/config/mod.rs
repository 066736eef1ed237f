//! Configuration management for FusionBot
//!
//! Loads from YAML files + environment variables via .env. Every tunable
//! constant of the fusion engine and the predictor is configuration with
//! the reference defaults, not a hard-coded magic number.

use crate::fusion::FusionConfig;
use crate::predictor::PredictorConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub fusion: FusionConfig,
    pub predictor: PredictorConfig,
    pub persistence: PersistenceConfig,
    pub replay: ReplayConfig,
    /// Source reliability overrides layered on the built-in defaults
    #[serde(default)]
    pub sources: HashMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Data directory
    pub data_dir: String,
    /// Enable CSV recording of aggregates and predictions
    pub csv_enabled: bool,
    /// Predictor state snapshot file (relative to data_dir)
    pub snapshot_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayConfig {
    /// Quote grouping window in milliseconds
    pub window_ms: i64,
    /// Input quote stream (relative to data_dir)
    pub quotes_file: String,
    /// Output fused price records
    pub aggregates_file: String,
    /// Output prediction records
    pub predictions_file: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Fusion defaults
            .set_default("fusion.stale_ms", 5000)?
            .set_default("fusion.min_source_confidence", 0.3)?
            .set_default("fusion.z_score_threshold", 2.0)?
            .set_default("fusion.identical_pct_threshold", 0.05)?
            .set_default("fusion.count_weight", 0.3)?
            .set_default("fusion.confidence_weight", 0.5)?
            .set_default("fusion.consistency_cap", 0.2)?
            .set_default("fusion.outlier_penalty", 0.1)?
            // Predictor defaults
            .set_default("predictor.temporal_weight", 0.4)?
            .set_default("predictor.ensemble_weight", 0.6)?
            .set_default("predictor.base_score_scale", 0.3)?
            .set_default("predictor.learning_rate", 0.1)?
            .set_default("predictor.regularization", 0.05)?
            .set_default("predictor.mean_reversion_trigger", 0.5)?
            .set_default("predictor.mean_reversion_strength", 0.1)?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            .set_default("persistence.csv_enabled", true)?
            .set_default("persistence.snapshot_file", "predictor_state.json")?
            // Replay defaults
            .set_default("replay.window_ms", 1000)?
            .set_default("replay.quotes_file", "quotes.csv")?
            .set_default("replay.aggregates_file", "aggregates.csv")?
            .set_default("replay.predictions_file", "predictions.csv")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (FUSIONBOT_*)
            .add_source(Environment::with_prefix("FUSIONBOT").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "stale_ms={} z_thr={:.1} blend={:.1}/{:.1} lr={:.2} data_dir={}",
            self.fusion.stale_ms,
            self.fusion.z_score_threshold,
            self.predictor.temporal_weight,
            self.predictor.ensemble_weight,
            self.predictor.learning_rate,
            self.persistence.data_dir
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
