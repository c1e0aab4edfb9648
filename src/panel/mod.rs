//! Panel data structures, missing-value normalization and CSV loading

mod data;
mod missingness;
mod value;
pub mod loader;

pub use data::{ColumnSpec, Observation, Panel, Schema};
pub use missingness::MissingnessReport;
pub use value::{normalize, ColumnKind, MissingCode, Value, STRUCTURAL_TOKEN};
pub use loader::{load_panel, load_waves, save_panel, save_waves, ColumnKinds};

#[cfg(test)]
pub(crate) use data::test_support;
