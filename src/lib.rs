//! FusionBot Library
//!
//! Multi-source price fusion with robust outlier rejection, plus a
//! stateful per-instrument directional bias predictor.

pub mod config;
pub mod fusion;
pub mod persistence;
pub mod predictor;
pub mod store;
pub mod types;
