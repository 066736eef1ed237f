//! Fusion module - Multi-source price aggregation
//!
//! Fuses price observations from independently unreliable sources into a
//! single trustworthy price with a confidence score. Robust outlier
//! rejection (MAD / modified z-score) followed by reliability-adjusted
//! volume weighting.

mod engine;
mod weights;

pub use engine::{FusionConfig, FusionEngine};
pub use weights::{SourceWeightTable, WeightSnapshot, DEFAULT_SOURCE_WEIGHT};
