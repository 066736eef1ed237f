//! Offline replay of a recorded quote stream
//!
//! Usage: cargo run --bin replay [quotes.csv]
//!
//! Groups recorded quotes per instrument into time windows, fuses each
//! window, extracts features, and runs the bias predictor, writing fused
//! prices and predictions back out as CSV.

use anyhow::Result;
use fusionbot::config::AppConfig;
use fusionbot::fusion::{FusionEngine, SourceWeightTable};
use fusionbot::persistence::{AggregateRecord, CsvStore, PredictionRecord};
use fusionbot::predictor::FeatureExtractor;
use fusionbot::store::InstrumentStore;
use fusionbot::types::{Instrument, Observation};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = AppConfig::load()?;
    info!("Replay starting: {}", config.digest());

    let csv = CsvStore::new(&config.persistence.data_dir)?;
    let quotes_file = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.replay.quotes_file.clone());
    let quotes = csv.read_quotes(&quotes_file)?;
    if quotes.is_empty() {
        warn!("No quotes in {}, nothing to replay", quotes_file);
        return Ok(());
    }

    let weights = Arc::new(SourceWeightTable::with_overrides(&config.sources));
    let engine = FusionEngine::new(config.fusion.clone(), weights);
    let store = InstrumentStore::new(config.predictor.clone());
    let mut extractors: HashMap<Instrument, FeatureExtractor> = HashMap::new();

    // Group quotes into (instrument, window) batches, ordered by time
    let window_ms = config.replay.window_ms.max(1);
    let mut windows: BTreeMap<(i64, Instrument), Vec<Observation>> = BTreeMap::new();
    for quote in &quotes {
        let obs = Observation::validated(
            quote.source.as_str(),
            quote.price,
            quote.volume,
            quote.timestamp,
            quote.confidence,
        );
        if !obs.is_usable() {
            warn!(
                instrument = %quote.instrument,
                source = %quote.source,
                "dropping unusable quote"
            );
            continue;
        }
        let window = quote.timestamp / window_ms;
        windows
            .entry((window, Instrument::new(quote.instrument.as_str())))
            .or_default()
            .push(obs);
    }

    let mut aggregates = Vec::new();
    let mut predictions = Vec::new();

    for ((window, instrument), batch) in &windows {
        let window_end = (window + 1) * window_ms;
        let fused = engine.aggregate_at(batch, window_end);

        let extractor = extractors.entry(instrument.clone()).or_default();
        let features = extractor.extract_from_price(&fused);
        let prediction = store.predict_at(instrument, &features, window_end);

        aggregates.push(AggregateRecord {
            timestamp: fused.ts,
            instrument: instrument.to_string(),
            price: fused.price,
            confidence: fused.confidence,
            method: fused.method.to_string(),
            sources_used: join_sources(&fused.sources_used),
            outliers_filtered: join_sources(&fused.outliers_filtered),
        });
        predictions.push(PredictionRecord {
            timestamp: window_end,
            instrument: instrument.to_string(),
            bias: prediction.bias.to_string(),
            confidence: prediction.confidence,
            temporal_strength: prediction.temporal_strength,
            ensemble_agreement: prediction.ensemble_agreement,
            adaptive_score: prediction.adaptive_score,
        });
    }

    if config.persistence.csv_enabled {
        csv.append_aggregates(&config.replay.aggregates_file, &aggregates)?;
        csv.append_predictions(&config.replay.predictions_file, &predictions)?;
    }

    let snapshot_path =
        std::path::Path::new(&config.persistence.data_dir).join(&config.persistence.snapshot_file);
    store.save(&snapshot_path)?;

    let stats = store.stats();
    info!(
        quotes = quotes.len(),
        windows = aggregates.len(),
        instruments = stats.instruments,
        predictions = stats.predictions,
        "replay complete"
    );

    Ok(())
}

fn join_sources(sources: &[fusionbot::types::PriceSource]) -> String {
    sources
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(";")
}
