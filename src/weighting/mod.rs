//! Population reweighting against demographic projections

mod future;
mod projection;
mod reweight;

pub use future::project_weights;
pub use projection::{Dimension, ProjectionTable, StratumKey};
pub use reweight::{global_rescale, Calibration, ReweightReport, Reweighter};
