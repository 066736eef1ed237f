//! CSV Persistence Module
//!
//! Records fused prices and bias predictions for audit and replay, and
//! reads recorded quote streams back in.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::info;

/// Raw quote record as delivered by the (out-of-scope) transport layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub timestamp: i64,
    pub instrument: String,
    pub source: String,
    pub price: f64,
    pub volume: f64,
    pub confidence: f64,
}

/// Fused price record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub timestamp: i64,
    pub instrument: String,
    pub price: f64,
    pub confidence: f64,
    pub method: String,
    /// Contributing sources, ';'-joined
    pub sources_used: String,
    /// Outlier sources, ';'-joined
    pub outliers_filtered: String,
}

/// Bias prediction record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub timestamp: i64,
    pub instrument: String,
    pub bias: String,
    pub confidence: u8,
    pub temporal_strength: f64,
    pub ensemble_agreement: f64,
    pub adaptive_score: f64,
}

/// CSV-backed record store rooted at a data directory
pub struct CsvStore {
    data_dir: PathBuf,
}

impl CsvStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;
        Ok(Self { data_dir })
    }

    /// Read a recorded quote stream (header expected)
    pub fn read_quotes(&self, file: impl AsRef<Path>) -> Result<Vec<QuoteRecord>> {
        let path = self.resolve(file.as_ref());
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .with_context(|| format!("Failed to open quotes file {}", path.display()))?;

        let mut records = Vec::new();
        for result in reader.deserialize() {
            let record: QuoteRecord =
                result.with_context(|| format!("Malformed quote row in {}", path.display()))?;
            records.push(record);
        }
        info!(count = records.len(), path = %path.display(), "quotes loaded");
        Ok(records)
    }

    /// Append fused price records (header written on first use)
    pub fn append_aggregates(
        &self,
        file: impl AsRef<Path>,
        records: &[AggregateRecord],
    ) -> Result<()> {
        self.append(file.as_ref(), records)
    }

    /// Append prediction records (header written on first use)
    pub fn append_predictions(
        &self,
        file: impl AsRef<Path>,
        records: &[PredictionRecord],
    ) -> Result<()> {
        self.append(file.as_ref(), records)
    }

    fn append<T: Serialize>(&self, file: &Path, records: &[T]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let path = self.resolve(file);
        let write_headers = !path.exists();

        let handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let mut writer = WriterBuilder::new()
            .has_headers(write_headers)
            .from_writer(handle);

        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.data_dir.join(file)
        }
    }
}
