//! Stratified calibration of survey weights against population projections
//!
//! Each stratum's weights are scaled by `projected_count / sum(weight)`, so
//! that the weighted population in every cell matches the projection. Strata
//! with no projection (or no weight) are excluded by setting their weight to
//! zero. A final min-max transform brings the whole weight vector into [0, 1],
//! which keeps downstream model fitting numerically stable.

use super::projection::{Dimension, ProjectionTable, StratumKey};
use crate::error::Result;
use crate::panel::{Observation, Panel, Schema};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

fn default_dimensions() -> Vec<Dimension> {
    Dimension::ALL.to_vec()
}

fn default_sex_column() -> String {
    "sex".to_string()
}

fn default_ethnicity_column() -> String {
    "ethnicity".to_string()
}

fn default_age_column() -> String {
    "age".to_string()
}

/// Which dimensions to stratify on and where they live in the panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    #[serde(default = "default_dimensions")]
    pub dimensions: Vec<Dimension>,

    #[serde(default = "default_sex_column")]
    pub sex_column: String,

    #[serde(default = "default_ethnicity_column")]
    pub ethnicity_column: String,

    #[serde(default = "default_age_column")]
    pub age_column: String,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            sex_column: default_sex_column(),
            ethnicity_column: default_ethnicity_column(),
            age_column: default_age_column(),
        }
    }
}

impl Calibration {
    /// Same columns, different dimensions
    pub fn with_dimensions(&self, dimensions: &[Dimension]) -> Self {
        Self {
            dimensions: dimensions.to_vec(),
            ..self.clone()
        }
    }

    fn bind(&self, schema: &Schema) -> Result<KeyColumns> {
        let column = |dim: Dimension, name: &str| -> Result<Option<usize>> {
            if self.dimensions.contains(&dim) {
                schema.require(name).map(Some)
            } else {
                Ok(None)
            }
        };
        Ok(KeyColumns {
            sex: column(Dimension::Sex, &self.sex_column)?,
            ethnicity: column(Dimension::Ethnicity, &self.ethnicity_column)?,
            age: column(Dimension::Age, &self.age_column)?,
            time: self.dimensions.contains(&Dimension::Time),
        })
    }
}

/// Column positions of the stratifying dimensions
struct KeyColumns {
    sex: Option<usize>,
    ethnicity: Option<usize>,
    age: Option<usize>,
    time: bool,
}

impl KeyColumns {
    /// Stratum of one row; `None` when a stratifying cell is not a usable value
    fn key(&self, row: &Observation) -> Option<StratumKey> {
        let label = |col: Option<usize>| -> Option<Option<String>> {
            match col {
                None => Some(None),
                Some(c) => {
                    let value = row.get(c);
                    if value.is_missing() {
                        None
                    } else {
                        Some(Some(value.to_string()))
                    }
                }
            }
        };
        let age = match self.age {
            None => None,
            Some(c) => Some(row.get(c).as_i64()?),
        };
        Some(StratumKey {
            sex: label(self.sex)?,
            ethnicity: label(self.ethnicity)?,
            age,
            time: self.time.then_some(row.time),
        })
    }
}

/// Outcome of a calibration run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReweightReport {
    /// Panel strata found in the projection table
    pub matched_strata: usize,

    /// Panel strata with no projection; their rows are excluded
    pub unmatched_strata: Vec<StratumKey>,

    /// Projection strata with no panel rows
    pub projection_only_strata: usize,

    /// Rows whose weight was forced to zero
    pub rows_excluded: usize,

    /// Weight range before the global rescale
    pub global_range: Option<(f64, f64)>,
}

/// Rescale every weight to [0, 1] by a single min-max transform
///
/// When all weights are equal, positive weights become 1.0 and zeros stay 0.0.
/// Returns the (min, max) used, or `None` for an empty panel.
pub fn global_rescale(panel: Panel) -> (Panel, Option<(f64, f64)>) {
    let schema = panel.shared_schema();
    let mut rows = panel.into_rows();
    let range = rows.iter().fold(None, |acc: Option<(f64, f64)>, r| match acc {
        None => Some((r.weight, r.weight)),
        Some((lo, hi)) => Some((lo.min(r.weight), hi.max(r.weight))),
    });

    if let Some((min, max)) = range {
        let span = max - min;
        for row in rows.iter_mut() {
            row.weight = if span > 0.0 {
                (row.weight - min) / span
            } else if row.weight > 0.0 {
                1.0
            } else {
                0.0
            };
        }
    }
    (Panel::new(schema, rows), range)
}

/// Calibrates panel weights against a projection table
#[derive(Debug, Clone)]
pub struct Reweighter {
    targets: ProjectionTable,
    calibration: Calibration,
}

impl Reweighter {
    /// Projections are summed down to the calibration dimensions once here
    pub fn new(projections: &ProjectionTable, calibration: Calibration) -> Self {
        Self {
            targets: projections.marginal(&calibration.dimensions),
            calibration,
        }
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Scale each stratum's weights to its projected count
    pub fn stratum_rescale(&self, panel: Panel) -> Result<(Panel, ReweightReport)> {
        let columns = self.calibration.bind(panel.schema())?;
        let schema = panel.shared_schema();
        let mut rows = panel.into_rows();

        let keys: Vec<Option<StratumKey>> = rows.iter().map(|r| columns.key(r)).collect();
        let mut sums: BTreeMap<&StratumKey, f64> = BTreeMap::new();
        for (row, key) in rows.iter().zip(&keys) {
            if let Some(key) = key {
                *sums.entry(key).or_insert(0.0) += row.weight;
            }
        }

        let mut report = ReweightReport::default();
        let mut ratios: BTreeMap<&StratumKey, f64> = BTreeMap::new();
        for (key, sum) in &sums {
            let ratio = match self.targets.get(key) {
                Some(count) if *sum > 0.0 => {
                    report.matched_strata += 1;
                    count / sum
                }
                Some(_) => {
                    log::warn!("Stratum {:?} has zero total weight, excluded", key);
                    report.matched_strata += 1;
                    0.0
                }
                None => {
                    report.unmatched_strata.push((*key).clone());
                    0.0
                }
            };
            log::debug!("Stratum {:?}: weight sum {:.3}, ratio {:.6}", key, sum, ratio);
            ratios.insert(key, ratio);
        }

        let present: BTreeSet<&StratumKey> = sums.keys().copied().collect();
        report.projection_only_strata = self
            .targets
            .iter()
            .filter(|(k, _)| !present.contains(k))
            .count();

        for (row, key) in rows.iter_mut().zip(&keys) {
            let ratio = key.as_ref().and_then(|k| ratios.get(k)).copied().unwrap_or(0.0);
            row.weight *= ratio;
            if row.weight == 0.0 {
                report.rows_excluded += 1;
            }
        }

        if !report.unmatched_strata.is_empty() {
            log::warn!(
                "{} panel strata have no projection and were excluded",
                report.unmatched_strata.len()
            );
        }
        log::info!(
            "Reweighted {} strata, {} rows at zero weight",
            report.matched_strata,
            report.rows_excluded
        );

        Ok((Panel::new(schema, rows), report))
    }

    /// Stratum rescale followed by the global [0, 1] rescale
    pub fn reweight(&self, panel: Panel) -> Result<(Panel, ReweightReport)> {
        let (panel, mut report) = self.stratum_rescale(panel)?;
        let (panel, range) = global_rescale(panel);
        report.global_range = range;
        Ok((panel, report))
    }
}
