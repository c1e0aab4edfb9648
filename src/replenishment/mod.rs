//! Synthetic new-entrant cohorts for future years

mod generator;
mod ids;

pub use generator::{AttributeCap, ReplenishmentConfig, ReplenishmentGenerator, ReplenishmentReport};
pub use ids::{IdKind, IdMinter};
