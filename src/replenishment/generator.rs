//! Replenishing population generator
//!
//! Takes the households of everyone at (or one year above) the replenishing
//! age in the base year, and copies them into every future year with fresh
//! identifiers. Only the entrant carries weight; the rest of the household
//! is context. The stacked copies are then calibrated against the projected
//! number of people reaching the replenishing age each year.

use super::ids::{IdKind, IdMinter};
use crate::error::{PanelError, Result};
use crate::panel::{ColumnKind, Observation, Panel, Value};
use crate::weighting::{Calibration, Dimension, ProjectionTable, ReweightReport, Reweighter};
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Upper bound on a numeric attribute for new entrants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeCap {
    pub column: String,
    pub max: f64,
}

fn default_base_year() -> i32 {
    2019
}

fn default_first_year() -> i32 {
    2020
}

fn default_last_year() -> i32 {
    2070
}

fn default_replenishing_age() -> i64 {
    16
}

fn default_age_column() -> String {
    "age".to_string()
}

fn default_caps() -> Vec<AttributeCap> {
    vec![AttributeCap {
        column: "education_state".to_string(),
        max: 2.0,
    }]
}

fn default_shifted_columns() -> Vec<String> {
    vec!["birth_year".to_string(), "hh_int_y".to_string()]
}

fn default_dimensions() -> Vec<Dimension> {
    vec![Dimension::Sex, Dimension::Ethnicity, Dimension::Time]
}

/// Replenishment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplenishmentConfig {
    /// Year of the snapshot entrants are drawn from
    #[serde(default = "default_base_year")]
    pub base_year: i32,

    #[serde(default = "default_first_year")]
    pub first_year: i32,

    /// Horizon, inclusive
    #[serde(default = "default_last_year")]
    pub last_year: i32,

    #[serde(default = "default_replenishing_age")]
    pub replenishing_age: i64,

    #[serde(default = "default_age_column")]
    pub age_column: String,

    /// Entrant attributes above what is attainable at the replenishing age
    #[serde(default = "default_caps")]
    pub caps: Vec<AttributeCap>,

    /// Year-valued columns advanced with the copy
    #[serde(default = "default_shifted_columns")]
    pub shifted_columns: Vec<String>,

    /// Date columns (`YYYY-MM-DD`, `YYYY-MM` or `YYYYMM`) advanced with the copy
    #[serde(default)]
    pub date_columns: Vec<String>,

    #[serde(default)]
    pub id_seed: u64,

    /// Calibration dimensions; age is fixed so it is not one of them
    #[serde(default = "default_dimensions")]
    pub dimensions: Vec<Dimension>,
}

impl Default for ReplenishmentConfig {
    fn default() -> Self {
        Self {
            base_year: default_base_year(),
            first_year: default_first_year(),
            last_year: default_last_year(),
            replenishing_age: default_replenishing_age(),
            age_column: default_age_column(),
            caps: default_caps(),
            shifted_columns: default_shifted_columns(),
            date_columns: Vec::new(),
            id_seed: 0,
            dimensions: default_dimensions(),
        }
    }
}

impl ReplenishmentConfig {
    /// `replenishing_pop_{first}-{last}.csv` under `dir`
    pub fn output_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!(
            "replenishing_pop_{}-{}.csv",
            self.first_year, self.last_year
        ))
    }

    fn validate(&self) -> Result<()> {
        if self.first_year > self.last_year {
            return Err(PanelError::InvalidConfig(format!(
                "replenishment horizon {}-{} is empty",
                self.first_year, self.last_year
            )));
        }
        if self.first_year <= self.base_year {
            return Err(PanelError::InvalidConfig(format!(
                "replenishment must start after base year {}",
                self.base_year
            )));
        }
        Ok(())
    }
}

/// What the generator produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplenishmentReport {
    pub households: usize,
    pub entrants_per_year: usize,
    pub members_per_year: usize,
    pub years: usize,
    pub rows: usize,
    pub dates_unparsed: usize,
    pub reweight: ReweightReport,
}

/// Resolved column positions
struct Columns {
    age: usize,
    caps: Vec<(usize, f64)>,
    shifted: Vec<usize>,
    dates: Vec<usize>,
}

/// Builds the replenishing population from a reconciled panel
#[derive(Debug, Clone)]
pub struct ReplenishmentGenerator {
    config: ReplenishmentConfig,
    calibration: Calibration,
}

impl ReplenishmentGenerator {
    pub fn new(config: ReplenishmentConfig, calibration: Calibration) -> Self {
        Self {
            config,
            calibration,
        }
    }

    pub fn config(&self) -> &ReplenishmentConfig {
        &self.config
    }

    fn bind(&self, panel: &Panel) -> Result<Columns> {
        let schema = panel.schema();
        let mut caps = Vec::new();
        for cap in &self.config.caps {
            let col = schema.require(&cap.column)?;
            if schema.kind(col) == ColumnKind::Text {
                return Err(PanelError::InvalidConfig(format!(
                    "cannot cap text column '{}'",
                    cap.column
                )));
            }
            caps.push((col, cap.max));
        }
        let resolve = |names: &[String]| -> Result<Vec<usize>> {
            names.iter().map(|n| schema.require(n)).collect()
        };
        Ok(Columns {
            age: schema.require(&self.config.age_column)?,
            caps,
            shifted: resolve(&self.config.shifted_columns)?,
            dates: resolve(&self.config.date_columns)?,
        })
    }

    /// At the replenishing age or one year above it
    fn is_entrant(&self, row: &Observation, columns: &Columns) -> bool {
        let age = self.config.replenishing_age;
        matches!(row.get(columns.age).as_i64(), Some(a) if a == age || a == age + 1)
    }

    /// Base-year households with an entrant, entrants promoted and capped,
    /// everyone else at zero weight
    fn template(&self, panel: &Panel, columns: &Columns) -> Vec<Observation> {
        let age = self.config.replenishing_age;
        let is_entrant = |row: &Observation| self.is_entrant(row, columns);

        let households: BTreeSet<i64> = panel
            .wave(self.config.base_year)
            .filter(|&r| is_entrant(r))
            .map(|r| r.hidp)
            .collect();

        panel
            .wave(self.config.base_year)
            .filter(|r| households.contains(&r.hidp))
            .map(|r| {
                let mut row = r.clone();
                if is_entrant(r) {
                    row.values[columns.age] = Value::Int(age);
                    for (col, max) in &columns.caps {
                        cap_value(&mut row.values[*col], *max);
                    }
                } else {
                    row.weight = 0.0;
                }
                row
            })
            .collect()
    }

    /// Generate and calibrate the replenishing population
    ///
    /// Every pidp and hidp in `panel`, from any year, is reserved before
    /// minting, so pass all reconciled waves rather than the base wave alone.
    pub fn generate(
        &self,
        panel: &Panel,
        projections: &ProjectionTable,
    ) -> Result<(Panel, ReplenishmentReport)> {
        self.config.validate()?;
        let columns = self.bind(panel)?;
        let template = self.template(panel, &columns);

        let mut report = ReplenishmentReport {
            households: template.iter().map(|r| r.hidp).collect::<BTreeSet<_>>().len(),
            entrants_per_year: template
                .iter()
                .filter(|r| self.is_entrant(r, &columns))
                .count(),
            members_per_year: template.len(),
            ..Default::default()
        };
        if template.is_empty() {
            log::warn!(
                "No individuals aged {} or {} in {}, replenishing population is empty",
                self.config.replenishing_age,
                self.config.replenishing_age + 1,
                self.config.base_year
            );
        }

        let mut minter = IdMinter::new(self.config.id_seed);
        for row in panel.rows() {
            minter.reserve(IdKind::Person, row.pidp);
            minter.reserve(IdKind::Household, row.hidp);
        }

        let mut rows = Vec::with_capacity(template.len() * self.year_count());
        for year in self.config.first_year..=self.config.last_year {
            let offset = year - self.config.base_year;
            let mut households: HashMap<i64, i64> = HashMap::new();
            for source in &template {
                let mut row = source.clone();
                row.time = year;
                row.pidp = minter.mint(IdKind::Person, year, source.pidp)?;
                row.hidp = match households.get(&source.hidp) {
                    Some(hidp) => *hidp,
                    None => {
                        let hidp = minter.mint(IdKind::Household, year, source.hidp)?;
                        households.insert(source.hidp, hidp);
                        hidp
                    }
                };
                for col in &columns.shifted {
                    shift_year(&mut row.values[*col], offset);
                }
                for col in &columns.dates {
                    if !shift_date(&mut row.values[*col], offset) {
                        report.dates_unparsed += 1;
                    }
                }
                rows.push(row);
            }
            report.years += 1;
        }
        if report.dates_unparsed > 0 {
            log::warn!(
                "{} interview dates could not be parsed and were copied unchanged",
                report.dates_unparsed
            );
        }

        let targets = projections.restrict_age(self.config.replenishing_age);
        let reweighter = Reweighter::new(
            &targets,
            self.calibration.with_dimensions(&self.config.dimensions),
        );
        let (replenishing, reweight) = reweighter.reweight(panel.with_rows(rows))?;
        report.rows = replenishing.len();
        report.reweight = reweight;

        log::info!(
            "Replenishing population: {} households, {} entrants per year, {} rows for {}-{}",
            report.households,
            report.entrants_per_year,
            report.rows,
            self.config.first_year,
            self.config.last_year
        );
        Ok((replenishing, report))
    }

    fn year_count(&self) -> usize {
        (self.config.last_year - self.config.first_year + 1).max(0) as usize
    }
}

fn cap_value(value: &mut Value, max: f64) {
    match value {
        Value::Int(i) if (*i as f64) > max => *i = max.floor() as i64,
        Value::Float(f) if *f > max => *f = max,
        _ => {}
    }
}

fn shift_year(value: &mut Value, offset: i32) {
    match value {
        Value::Int(i) => *i += offset as i64,
        Value::Float(f) => *f += offset as f64,
        Value::Text(s) => {
            if let Ok(year) = s.trim().parse::<i64>() {
                *s = (year + offset as i64).to_string();
            }
        }
        Value::Missing(_) | Value::Structural => {}
    }
}

const DATE_FORMATS: [(&str, &str, &str); 3] = [
    // (input suffix to complete a day, parse format, output format)
    ("", "%Y-%m-%d", "%Y-%m-%d"),
    ("-01", "%Y-%m-%d", "%Y-%m"),
    ("01", "%Y%m%d", "%Y%m"),
];

/// Advance a date cell by whole years; false if a present value was not a date
fn shift_date(value: &mut Value, years: i32) -> bool {
    let raw = match &*value {
        Value::Missing(_) | Value::Structural => return true,
        other => other.to_string(),
    };

    for (suffix, parse, output) in DATE_FORMATS {
        let Ok(date) = NaiveDate::parse_from_str(&format!("{}{}", raw.trim(), suffix), parse) else {
            continue;
        };
        let months = Months::new(12 * years.unsigned_abs());
        let shifted = if years >= 0 {
            date.checked_add_months(months)
        } else {
            date.checked_sub_months(months)
        };
        let Some(shifted) = shifted else {
            return false;
        };
        let text = shifted.format(output).to_string();
        let shifted = match value {
            Value::Int(_) => text.parse().map(Value::Int).unwrap_or(Value::Text(text)),
            Value::Float(_) => text.parse().map(Value::Float).unwrap_or(Value::Text(text)),
            _ => Value::Text(text),
        };
        *value = shifted;
        return true;
    }
    false
}
