//! Correction stages applied to a loaded panel
//!
//! Each stage takes a panel and returns a new one together with a report
//! of what it changed.

mod complete_case;
mod deterministic;
mod fill;
pub mod partition;

pub use complete_case::{CompleteCaseFilter, CompleteCaseReport, RequiredVariable, YearSpan};
pub use deterministic::{
    Correction, CorrectionReport, DeterministicCorrector, Predicate, ReplacementRule,
};
pub use fill::{fill_person, AttributeClass, FillEngine, FillMode, FillPlan, FillReport, FillRule};
