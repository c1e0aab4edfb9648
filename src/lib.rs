//! Panel Engine - longitudinal panel reconciliation and reweighting
//!
//! This library provides:
//! - Missing-value normalization across survey eras
//! - Deterministic correction of structurally-implied missing values
//! - Per-individual longitudinal fill (forward, backward, monotonic, interpolated)
//! - Complete-case filtering with per-variable year exceptions
//! - Stratified reweighting against demographic projections
//! - Replenishing population generation for future years

pub mod config;
pub mod correction;
pub mod error;
pub mod panel;
pub mod pipeline;
pub mod replenishment;
pub mod weighting;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{PanelError, Result};
pub use panel::{normalize, MissingCode, Observation, Panel, Schema, Value};
pub use pipeline::{ReconciliationRunner, RunSummary};
pub use replenishment::{ReplenishmentConfig, ReplenishmentGenerator};
pub use weighting::{ProjectionTable, Reweighter};
