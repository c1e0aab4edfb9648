//! Structurally-implied missing values
//!
//! Some cells are missing only because another field makes the question
//! inapplicable: job codes for someone not in work, cigarettes per day for a
//! non-smoker. Those cells are resolved here from the other fields of the
//! same row. Every predicate reads the row as it was before any correction,
//! so corrections never compound on each other's output.

use crate::error::{PanelError, Result};
use crate::panel::{ColumnKind, MissingCode, Observation, Panel, Schema, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Row condition under which a missing cell is structurally implied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Column value is one of `values`
    ValueIn { column: String, values: Vec<Value> },
    /// Column value equals `value`
    Equals { column: String, value: Value },
    /// Column is missing with this specific code
    MissingCode { column: String, code: MissingCode },
    /// Column is missing with any code
    IsMissing { column: String },
    Not { predicate: Box<Predicate> },
    All { predicates: Vec<Predicate> },
    Any { predicates: Vec<Predicate> },
}

impl Predicate {
    /// Convenience for the common "labour state is one of ..." style test
    pub fn value_in<S: Into<String>>(column: S, values: Vec<Value>) -> Self {
        Predicate::ValueIn {
            column: column.into(),
            values,
        }
    }

    fn bind(&self, schema: &Schema) -> Result<BoundPredicate> {
        Ok(match self {
            Predicate::ValueIn { column, values } => {
                let index = schema.require(column)?;
                let values = values
                    .iter()
                    .map(|v| coerce_literal(schema, index, v))
                    .collect::<Result<Vec<_>>>()?;
                BoundPredicate::ValueIn(index, values)
            }
            Predicate::Equals { column, value } => {
                let index = schema.require(column)?;
                BoundPredicate::ValueIn(index, vec![coerce_literal(schema, index, value)?])
            }
            Predicate::MissingCode { column, code } => {
                BoundPredicate::MissingCode(schema.require(column)?, *code)
            }
            Predicate::IsMissing { column } => BoundPredicate::IsMissing(schema.require(column)?),
            Predicate::Not { predicate } => BoundPredicate::Not(Box::new(predicate.bind(schema)?)),
            Predicate::All { predicates } => BoundPredicate::All(
                predicates.iter().map(|p| p.bind(schema)).collect::<Result<_>>()?,
            ),
            Predicate::Any { predicates } => BoundPredicate::Any(
                predicates.iter().map(|p| p.bind(schema)).collect::<Result<_>>()?,
            ),
        })
    }
}

/// Literals from configuration are compared in the column's own kind
fn coerce_literal(schema: &Schema, index: usize, value: &Value) -> Result<Value> {
    schema.kind(index).coerce(value.clone()).ok_or_else(|| {
        PanelError::InvalidConfig(format!(
            "value '{}' cannot be compared with column '{}' ({:?})",
            value,
            schema.name(index),
            schema.kind(index)
        ))
    })
}

/// Predicate with column names resolved to schema positions
#[derive(Debug, Clone)]
enum BoundPredicate {
    ValueIn(usize, Vec<Value>),
    MissingCode(usize, MissingCode),
    IsMissing(usize),
    Not(Box<BoundPredicate>),
    All(Vec<BoundPredicate>),
    Any(Vec<BoundPredicate>),
}

impl BoundPredicate {
    fn eval(&self, row: &Observation) -> bool {
        match self {
            BoundPredicate::ValueIn(col, values) => values.contains(row.get(*col)),
            BoundPredicate::MissingCode(col, code) => row.get(*col).missing_code() == Some(*code),
            BoundPredicate::IsMissing(col) => row.get(*col).is_missing(),
            BoundPredicate::Not(p) => !p.eval(row),
            BoundPredicate::All(ps) => ps.iter().all(|p| p.eval(row)),
            BoundPredicate::Any(ps) => ps.iter().any(|p| p.eval(row)),
        }
    }
}

/// What a structurally-implied missing cell becomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementRule {
    /// Zero of the column's kind
    Zero,
    /// The distinct structurally-missing marker
    Structural,
}

impl ReplacementRule {
    fn replacement(self, kind: ColumnKind) -> Value {
        match self {
            ReplacementRule::Zero => kind.zero(),
            ReplacementRule::Structural => Value::Structural,
        }
    }
}

/// One (target columns, predicate, rule) triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub columns: Vec<String>,
    pub predicate: Predicate,
    pub rule: ReplacementRule,
}

/// Cells replaced by the corrector
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrectionReport {
    /// Replacements per target column
    pub replaced: BTreeMap<String, usize>,

    /// Rows on which each correction's predicate held
    pub predicate_matches: Vec<usize>,
}

impl CorrectionReport {
    pub fn total_replaced(&self) -> usize {
        self.replaced.values().sum()
    }
}

/// Applies deterministic corrections against the uncorrected panel
#[derive(Debug, Clone, Default)]
pub struct DeterministicCorrector {
    corrections: Vec<Correction>,
}

impl DeterministicCorrector {
    pub fn new(corrections: Vec<Correction>) -> Self {
        Self { corrections }
    }

    pub fn corrections(&self) -> &[Correction] {
        &self.corrections
    }

    /// Produce a corrected copy of `panel`
    ///
    /// Columns are resolved before any row is touched, so an unknown column
    /// name fails the stage without partial output.
    pub fn apply(&self, panel: &Panel) -> Result<(Panel, CorrectionReport)> {
        let schema = panel.schema();
        let mut bound = Vec::with_capacity(self.corrections.len());
        for correction in &self.corrections {
            let predicate = correction.predicate.bind(schema)?;
            let targets = correction
                .columns
                .iter()
                .map(|c| schema.require(c))
                .collect::<Result<Vec<_>>>()?;
            bound.push((predicate, targets, correction.rule));
        }

        let mut report = CorrectionReport {
            predicate_matches: vec![0; bound.len()],
            ..Default::default()
        };
        let mut replaced = vec![0usize; schema.len()];

        let mut rows = panel.rows().to_vec();
        // A cell written by several corrections is counted once
        let mut touched = vec![false; schema.len()];
        for (source, target) in panel.rows().iter().zip(rows.iter_mut()) {
            touched.fill(false);
            for (i, (predicate, targets, rule)) in bound.iter().enumerate() {
                if !predicate.eval(source) {
                    continue;
                }
                report.predicate_matches[i] += 1;
                for &col in targets {
                    if source.get(col).is_missing() {
                        target.values[col] = rule.replacement(schema.kind(col));
                        if !touched[col] {
                            touched[col] = true;
                            replaced[col] += 1;
                        }
                    }
                }
            }
        }

        for (col, count) in replaced.into_iter().enumerate() {
            if count > 0 {
                report.replaced.insert(schema.name(col).to_string(), count);
            }
        }
        log::info!(
            "Deterministic correction replaced {} cells across {} columns",
            report.total_replaced(),
            report.replaced.len()
        );

        Ok((panel.with_rows(rows), report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::test_support::{obs, schema};

    const MISSING: Value = Value::Missing(MissingCode::Missing);

    fn labour_panel() -> Panel {
        let schema = schema(&[
            ("labour_state", ColumnKind::Text),
            ("job_sec", ColumnKind::Int),
            ("job_sector", ColumnKind::Int),
        ]);
        Panel::new(
            schema,
            vec![
                obs(1, 2010, vec![Value::Text("Retired".into()), MISSING, Value::Int(1)]),
                obs(2, 2010, vec![Value::Text("Employed".into()), MISSING, Value::Int(2)]),
                obs(3, 2010, vec![Value::Text("Student".into()), Value::Int(4), MISSING]),
                obs(
                    4,
                    2010,
                    vec![
                        Value::Text("Employed".into()),
                        Value::Int(3),
                        Value::Missing(MissingCode::NotApplicable),
                    ],
                ),
            ],
        )
    }

    fn not_working() -> Predicate {
        Predicate::value_in(
            "labour_state",
            vec![Value::Text("Retired".into()), Value::Text("Student".into())],
        )
    }

    #[test]
    fn test_zero_when_predicate_holds() {
        let corrector = DeterministicCorrector::new(vec![Correction {
            columns: vec!["job_sec".into()],
            predicate: not_working(),
            rule: ReplacementRule::Zero,
        }]);
        let input = labour_panel();
        let (out, report) = corrector.apply(&input).unwrap();

        let job_sec = out.schema().require("job_sec").unwrap();
        assert_eq!(out.rows()[0].get(job_sec), &Value::Int(0));
        // Employed and missing: left for later stages
        assert_eq!(out.rows()[1].get(job_sec), &MISSING);
        // Student but not missing: untouched
        assert_eq!(out.rows()[2].get(job_sec), &Value::Int(4));
        assert_eq!(report.replaced["job_sec"], 1);
        assert_eq!(report.predicate_matches, vec![2]);

        // Input is not modified
        assert_eq!(input.rows()[0].get(job_sec), &MISSING);
    }

    #[test]
    fn test_overlapping_corrections_count_cell_once() {
        let corrector = DeterministicCorrector::new(vec![
            Correction {
                columns: vec!["job_sec".into()],
                predicate: not_working(),
                rule: ReplacementRule::Zero,
            },
            Correction {
                columns: vec!["job_sec".into()],
                predicate: Predicate::value_in("labour_state", vec![Value::Text("Retired".into())]),
                rule: ReplacementRule::Zero,
            },
        ]);
        let (out, report) = corrector.apply(&labour_panel()).unwrap();
        let job_sec = out.schema().require("job_sec").unwrap();
        assert_eq!(out.rows()[0].get(job_sec), &Value::Int(0));
        assert_eq!(report.predicate_matches, vec![2, 1]);
        assert_eq!(report.replaced["job_sec"], 1);
    }

    #[test]
    fn test_structural_marker_and_missing_code_predicate() {
        let corrector = DeterministicCorrector::new(vec![Correction {
            columns: vec!["job_sector".into()],
            predicate: Predicate::MissingCode {
                column: "job_sector".into(),
                code: MissingCode::NotApplicable,
            },
            rule: ReplacementRule::Structural,
        }]);
        let (out, report) = corrector.apply(&labour_panel()).unwrap();
        let col = out.schema().require("job_sector").unwrap();
        assert_eq!(out.rows()[3].get(col), &Value::Structural);
        assert_eq!(out.rows()[2].get(col), &MISSING);
        assert_eq!(report.total_replaced(), 1);
    }

    #[test]
    fn test_predicates_see_pre_correction_row() {
        // First correction fills job_sec; second fires only when job_sec is
        // missing. Row 1 must still be corrected by the second one.
        let corrector = DeterministicCorrector::new(vec![
            Correction {
                columns: vec!["job_sec".into()],
                predicate: not_working(),
                rule: ReplacementRule::Zero,
            },
            Correction {
                columns: vec!["job_sector".into()],
                predicate: Predicate::All {
                    predicates: vec![
                        Predicate::IsMissing { column: "job_sec".into() },
                        Predicate::Not {
                            predicate: Box::new(Predicate::Equals {
                                column: "labour_state".into(),
                                value: Value::Text("Employed".into()),
                            }),
                        },
                    ],
                },
                rule: ReplacementRule::Zero,
            },
        ]);

        let schema = schema(&[
            ("labour_state", ColumnKind::Text),
            ("job_sec", ColumnKind::Int),
            ("job_sector", ColumnKind::Int),
        ]);
        let panel = Panel::new(
            schema,
            vec![obs(1, 2010, vec![Value::Text("Retired".into()), MISSING, MISSING])],
        );
        let (out, report) = corrector.apply(&panel).unwrap();
        assert_eq!(out.rows()[0].values, vec![Value::Text("Retired".into()), Value::Int(0), Value::Int(0)]);
        assert_eq!(report.predicate_matches, vec![1, 1]);
    }

    #[test]
    fn test_no_match_is_noop() {
        let corrector = DeterministicCorrector::new(vec![Correction {
            columns: vec!["job_sec".into()],
            predicate: Predicate::Equals {
                column: "labour_state".into(),
                value: Value::Text("Astronaut".into()),
            },
            rule: ReplacementRule::Zero,
        }]);
        let input = labour_panel();
        let (out, report) = corrector.apply(&input).unwrap();
        assert_eq!(out.rows(), input.rows());
        assert_eq!(report.total_replaced(), 0);
    }

    #[test]
    fn test_unknown_column_rejected() {
        let corrector = DeterministicCorrector::new(vec![Correction {
            columns: vec!["no_such".into()],
            predicate: not_working(),
            rule: ReplacementRule::Zero,
        }]);
        assert!(matches!(
            corrector.apply(&labour_panel()),
            Err(PanelError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_predicate_from_json() {
        let json = r#"{"op": "value_in", "column": "smoker", "values": [2]}"#;
        let p: Predicate = serde_json::from_str(json).unwrap();
        assert_eq!(p, Predicate::value_in("smoker", vec![Value::Int(2)]));
    }
}
