//! Demographic projection table
//!
//! Loads the external population projections (midyear estimates followed by
//! principal projections) keyed by time, sex, ethnicity and age.

use crate::error::{PanelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// A calibration dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Sex,
    Ethnicity,
    Age,
    Time,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Sex,
        Dimension::Ethnicity,
        Dimension::Age,
        Dimension::Time,
    ];
}

/// One demographic cell; dimensions not stratified on are `None`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StratumKey {
    pub sex: Option<String>,
    pub ethnicity: Option<String>,
    pub age: Option<i64>,
    pub time: Option<i32>,
}

impl StratumKey {
    pub fn new(sex: &str, ethnicity: &str, age: i64, time: i32) -> Self {
        Self {
            sex: Some(sex.to_string()),
            ethnicity: Some(ethnicity.to_string()),
            age: Some(age),
            time: Some(time),
        }
    }

    /// Keep only the given dimensions
    pub fn project(&self, dims: &[Dimension]) -> StratumKey {
        StratumKey {
            sex: self.sex.clone().filter(|_| dims.contains(&Dimension::Sex)),
            ethnicity: self
                .ethnicity
                .clone()
                .filter(|_| dims.contains(&Dimension::Ethnicity)),
            age: self.age.filter(|_| dims.contains(&Dimension::Age)),
            time: self.time.filter(|_| dims.contains(&Dimension::Time)),
        }
    }
}

/// One row of the projection CSV
#[derive(Debug, Deserialize)]
struct ProjectionRecord {
    #[serde(alias = "year")]
    time: i32,
    sex: String,
    ethnicity: String,
    age: f64,
    count: f64,
}

/// Immutable target population counts per stratum
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionTable {
    counts: BTreeMap<StratumKey, f64>,
}

impl ProjectionTable {
    pub fn from_counts<I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (StratumKey, f64)>,
    {
        let mut table = BTreeMap::new();
        for (key, count) in counts {
            *table.entry(key).or_insert(0.0) += count;
        }
        Self { counts: table }
    }

    /// Load from a CSV with `time` (or `year`), `sex`, `ethnicity`, `age`, `count`
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| PanelError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file).map_err(|err| match err {
            PanelError::SchemaMismatch { reason, .. } => PanelError::SchemaMismatch {
                path: path.to_path_buf(),
                reason,
            },
            PanelError::Csv { source, .. } => PanelError::Csv {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut records = Vec::new();
        for result in reader.deserialize() {
            let record: ProjectionRecord = result.map_err(|source| PanelError::Csv {
                path: Default::default(),
                source,
            })?;
            if record.age.fract() != 0.0 {
                return Err(PanelError::SchemaMismatch {
                    path: Default::default(),
                    reason: format!("non-integer age {} in projections", record.age),
                });
            }
            records.push((
                StratumKey::new(&record.sex, &record.ethnicity, record.age as i64, record.time),
                record.count,
            ));
        }
        let table = Self::from_counts(records);
        log::info!("Loaded {} projection strata", table.len());
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn get(&self, key: &StratumKey) -> Option<f64> {
        self.counts.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StratumKey, f64)> {
        self.counts.iter().map(|(k, v)| (k, *v))
    }

    /// Sum counts over every dimension not in `dims`
    pub fn marginal(&self, dims: &[Dimension]) -> ProjectionTable {
        Self::from_counts(self.counts.iter().map(|(k, v)| (k.project(dims), *v)))
    }

    /// Keep only strata for one age
    pub fn restrict_age(&self, age: i64) -> ProjectionTable {
        Self {
            counts: self
                .counts
                .iter()
                .filter(|(k, _)| k.age == Some(age))
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }

    /// Total projected population
    pub fn total(&self) -> f64 {
        self.counts.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const CSV: &str = ",year,sex,ethnicity,age,count
0,2020,Female,WBI,30,150.0
1,2020,Male,WBI,30,140.0
2,2020,Female,BAN,30,10.0
3,2020,Female,WBI,16,50.0
4,2021,Female,WBI,30,155.0
";

    #[test]
    fn test_load_accepts_year_and_index_column() {
        let table = ProjectionTable::from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(table.len(), 5);
        assert_eq!(
            table.get(&StratumKey::new("Female", "WBI", 30, 2020)),
            Some(150.0)
        );
    }

    #[test]
    fn test_marginal_sums_dropped_dimensions() {
        let table = ProjectionTable::from_reader(CSV.as_bytes()).unwrap();
        let by_sex_time = table.marginal(&[Dimension::Sex, Dimension::Time]);
        let key = StratumKey {
            sex: Some("Female".into()),
            time: Some(2020),
            ..Default::default()
        };
        assert_relative_eq!(by_sex_time.get(&key).unwrap(), 210.0);
        assert_relative_eq!(by_sex_time.total(), table.total());
    }

    #[test]
    fn test_restrict_age() {
        let table = ProjectionTable::from_reader(CSV.as_bytes()).unwrap();
        let sixteen = table.restrict_age(16);
        assert_eq!(sixteen.len(), 1);
        assert_relative_eq!(sixteen.total(), 50.0);
    }

    #[test]
    fn test_fractional_age_rejected() {
        let csv = "time,sex,ethnicity,age,count\n2020,Male,WBI,30.5,1\n";
        assert!(ProjectionTable::from_reader(csv.as_bytes()).is_err());
    }
}
