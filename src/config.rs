//! Pipeline configuration
//!
//! One JSON file describes a whole reconciliation run. Every field has a
//! default matching the Understanding Society / BHPS cohort layout, so an
//! empty `{}` is a valid configuration.

use crate::correction::{
    AttributeClass, Correction, FillMode, FillPlan, Predicate, ReplacementRule, RequiredVariable,
};
use crate::error::{PanelError, Result};
use crate::panel::{ColumnKinds, MissingCode, Value};
use crate::replenishment::ReplenishmentConfig;
use crate::weighting::Calibration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

fn default_input_dir() -> PathBuf {
    PathBuf::from("data/raw_US")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/corrected_US")
}

fn default_projections_path() -> PathBuf {
    PathBuf::from("persistent_data/age-sex-ethnic_projections_2008-2061.csv")
}

fn default_first_wave() -> i32 {
    1991
}

fn default_last_wave() -> i32 {
    2019
}

fn default_first_save_year() -> i32 {
    2009
}

fn default_last_save_year() -> i32 {
    2019
}

fn default_min_observations() -> usize {
    2
}

fn default_classes() -> BTreeMap<String, AttributeClass> {
    use AttributeClass::*;
    let mut classes = BTreeMap::new();
    for column in ["sex", "ethnicity", "birth_year"] {
        classes.insert(column.to_string(), Immutable);
    }
    for column in ["education_state", "labour_state", "heating"] {
        classes.insert(column.to_string(), Sticky);
    }
    for column in JOB_COLUMNS {
        classes.insert(column.to_string(), Deterministic);
    }
    classes.insert("age".to_string(), Interpolable);
    classes
}

const JOB_COLUMNS: [&str; 5] = [
    "job_industry",
    "job_duration_m",
    "job_duration_y",
    "job_sec",
    "job_occupation",
];

fn default_corrections() -> Vec<Correction> {
    let not_working = ["Unemployed", "Family Care", "Student", "Sick/Disabled", "Retired", "Short-term Working"]
        .iter()
        .map(|s| Value::Text(s.to_string()))
        .collect();
    fn zero(columns: &[&str], predicate: Predicate) -> Correction {
        Correction {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            predicate,
            rule: ReplacementRule::Zero,
        }
    }
    let not_applicable = |column: &str| Predicate::MissingCode {
        column: column.to_string(),
        code: MissingCode::NotApplicable,
    };

    vec![
        zero(&JOB_COLUMNS, Predicate::value_in("labour_state_raw", not_working)),
        zero(
            &["ncigs"],
            Predicate::Equals {
                column: "smoker".to_string(),
                value: Value::Int(2),
            },
        ),
        zero(&["job_sector"], not_applicable("job_sector")),
        zero(&["nkids_ind_raw"], not_applicable("nkids_ind_raw")),
    ]
}

fn default_fill_plan() -> FillPlan {
    FillPlan::default()
        .with(
            FillMode::Forward,
            &[
                "education_state",
                "labour_state",
                "job_sec",
                "heating",
                "yearly_gas",
                "yearly_electric",
                "yearly_gas_electric",
                "yearly_oil",
                "yearly_other_fuel",
            ],
        )
        .with(FillMode::ForwardBackward, &["sex", "ethnicity", "birth_year"])
        .with(FillMode::Interpolate, &["age"])
}

/// Settings for a full reconciliation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory of `{year}_US_cohort.csv` extracts
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_projections_path")]
    pub projections_path: PathBuf,

    /// Waves loaded for longitudinal fill
    #[serde(default = "default_first_wave")]
    pub first_wave: i32,

    #[serde(default = "default_last_wave")]
    pub last_wave: i32,

    /// Waves kept and written after correction
    #[serde(default = "default_first_save_year")]
    pub first_save_year: i32,

    #[serde(default = "default_last_save_year")]
    pub last_save_year: i32,

    /// Individuals with fewer waves are dropped before correction
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,

    /// Declared column kinds; undeclared columns are inferred
    #[serde(default)]
    pub column_kinds: ColumnKinds,

    #[serde(default = "default_classes")]
    pub attribute_classes: BTreeMap<String, AttributeClass>,

    #[serde(default = "default_corrections")]
    pub corrections: Vec<Correction>,

    #[serde(default = "default_fill_plan")]
    pub fill_plan: FillPlan,

    /// Required variables; `None` requires every column in every year
    #[serde(default)]
    pub required: Option<Vec<RequiredVariable>>,

    #[serde(default)]
    pub calibration: Calibration,

    #[serde(default)]
    pub replenishment: ReplenishmentConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            projections_path: default_projections_path(),
            first_wave: default_first_wave(),
            last_wave: default_last_wave(),
            first_save_year: default_first_save_year(),
            last_save_year: default_last_save_year(),
            min_observations: default_min_observations(),
            column_kinds: ColumnKinds::new(),
            attribute_classes: default_classes(),
            corrections: default_corrections(),
            fill_plan: default_fill_plan(),
            required: None,
            calibration: Calibration::default(),
            replenishment: ReplenishmentConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| PanelError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PipelineConfig =
            serde_json::from_str(&text).map_err(|source| PanelError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Year ranges must nest: saved waves inside loaded waves
    pub fn validate(&self) -> Result<()> {
        if self.first_wave > self.last_wave {
            return Err(PanelError::InvalidConfig(format!(
                "wave range {}-{} is empty",
                self.first_wave, self.last_wave
            )));
        }
        if self.first_save_year < self.first_wave || self.last_save_year > self.last_wave {
            return Err(PanelError::InvalidConfig(format!(
                "save years {}-{} fall outside loaded waves {}-{}",
                self.first_save_year, self.last_save_year, self.first_wave, self.last_wave
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::YearSpan;
    use crate::panel::ColumnKind;
    use crate::weighting::Dimension;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.min_observations, 2);
        assert_eq!(config.corrections.len(), 4);
        assert_eq!(config.attribute_classes["ethnicity"], AttributeClass::Immutable);
        assert_eq!(config.replenishment.replenishing_age, 16);
    }

    #[test]
    fn test_full_json() {
        let json = r#"{
            "input_dir": "in",
            "first_wave": 2010,
            "last_wave": 2020,
            "first_save_year": 2015,
            "last_save_year": 2020,
            "column_kinds": {"loneliness": "int"},
            "attribute_classes": {"sex": "immutable", "qualification": "monotonic"},
            "corrections": [
                {"columns": ["ncigs"], "rule": "structural",
                 "predicate": {"op": "not", "predicate": {"op": "equals", "column": "smoker", "value": 1}}}
            ],
            "fill_plan": [
                {"mode": "forward_backward", "columns": ["sex"]},
                {"mode": "monotonic_forward", "columns": ["qualification"]}
            ],
            "required": [
                {"column": "loneliness", "exceptions": [{"to": 2016}, {"from": 2021}]},
                {"column": "sex"}
            ],
            "calibration": {"dimensions": ["sex", "time"]},
            "replenishment": {"last_year": 2030, "id_seed": 9}
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.input_dir, PathBuf::from("in"));
        assert_eq!(config.output_dir, default_output_dir());
        assert_eq!(config.column_kinds["loneliness"], ColumnKind::Int);
        assert_eq!(config.corrections[0].rule, ReplacementRule::Structural);
        assert_eq!(config.fill_plan.rules[1].mode, FillMode::MonotonicForward);

        let required = config.required.unwrap();
        assert_eq!(required[0].exceptions[0], YearSpan::new(None, Some(2016)));
        assert!(required[1].exceptions.is_empty());

        assert_eq!(config.calibration.dimensions, vec![Dimension::Sex, Dimension::Time]);
        assert_eq!(config.calibration.sex_column, "sex");
        assert_eq!(config.replenishment.last_year, 2030);
        assert_eq!(config.replenishment.base_year, 2019);
    }

    #[test]
    fn test_save_years_must_be_loaded() {
        let config = PipelineConfig {
            first_save_year: 1980,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_path_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            PipelineConfig::from_path(&path),
            Err(PanelError::ConfigParse { .. })
        ));
    }
}
