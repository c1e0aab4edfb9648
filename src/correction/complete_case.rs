//! Complete-case filter with per-variable year exceptions

use crate::error::Result;
use crate::panel::Panel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inclusive year range, open at either end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct YearSpan {
    #[serde(default)]
    pub from: Option<i32>,
    #[serde(default)]
    pub to: Option<i32>,
}

impl YearSpan {
    pub fn new(from: Option<i32>, to: Option<i32>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, year: i32) -> bool {
        self.from.map_or(true, |f| year >= f) && self.to.map_or(true, |t| year <= t)
    }
}

/// A column that must be present, except in its exempted years
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredVariable {
    pub column: String,

    /// Years in which a missing value is tolerated
    #[serde(default)]
    pub exceptions: Vec<YearSpan>,
}

impl RequiredVariable {
    pub fn new(column: &str) -> Self {
        Self {
            column: column.to_string(),
            exceptions: Vec::new(),
        }
    }

    /// Required only for `from..=to`; any year outside is exempt
    ///
    /// Used for questions that were only asked in a few waves.
    pub fn only_within(column: &str, from: i32, to: i32) -> Self {
        Self {
            column: column.to_string(),
            exceptions: vec![
                YearSpan::new(None, Some(from - 1)),
                YearSpan::new(Some(to + 1), None),
            ],
        }
    }

    pub fn except(mut self, span: YearSpan) -> Self {
        self.exceptions.push(span);
        self
    }

    pub fn is_exempt(&self, year: i32) -> bool {
        self.exceptions.iter().any(|span| span.contains(year))
    }
}

/// What the filter removed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompleteCaseReport {
    pub rows_before: usize,
    pub rows_after: usize,

    /// Rows dropped because of each variable; a row can count against several
    pub dropped_by_variable: BTreeMap<String, usize>,

    /// (variable, year) pairs where that variable alone emptied the wave
    pub emptied: Vec<(String, i32)>,
}

impl CompleteCaseReport {
    pub fn rows_dropped(&self) -> usize {
        self.rows_before - self.rows_after
    }
}

/// Drops rows still missing a required variable outside its exceptions
#[derive(Debug, Clone, Default)]
pub struct CompleteCaseFilter {
    required: Vec<RequiredVariable>,
}

impl CompleteCaseFilter {
    pub fn new(required: Vec<RequiredVariable>) -> Self {
        Self { required }
    }

    /// Every column of the panel required in every year
    pub fn all_columns(panel: &Panel) -> Self {
        Self::new(
            panel
                .schema()
                .columns()
                .iter()
                .map(|c| RequiredVariable::new(&c.name))
                .collect(),
        )
    }

    pub fn required(&self) -> &[RequiredVariable] {
        &self.required
    }

    pub fn apply(&self, panel: Panel) -> Result<(Panel, CompleteCaseReport)> {
        let bound = self
            .required
            .iter()
            .map(|r| Ok((r, panel.schema().require(&r.column)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut report = CompleteCaseReport {
            rows_before: panel.len(),
            ..Default::default()
        };
        let mut rows_per_year: BTreeMap<i32, usize> = BTreeMap::new();
        let mut dropped_per_year: BTreeMap<(usize, i32), usize> = BTreeMap::new();

        let schema = panel.shared_schema();
        let mut kept = Vec::with_capacity(panel.len());
        for row in panel.into_rows() {
            *rows_per_year.entry(row.time).or_default() += 1;
            let mut complete = true;
            for (i, (variable, col)) in bound.iter().enumerate() {
                if row.get(*col).is_missing() && !variable.is_exempt(row.time) {
                    complete = false;
                    *report
                        .dropped_by_variable
                        .entry(variable.column.clone())
                        .or_default() += 1;
                    *dropped_per_year.entry((i, row.time)).or_default() += 1;
                }
            }
            if complete {
                kept.push(row);
            }
        }

        for ((i, year), dropped) in dropped_per_year {
            if rows_per_year.get(&year) == Some(&dropped) {
                let column = &bound[i].0.column;
                log::warn!(
                    "Complete-case filter: '{}' is missing for every row of {}, the whole wave is dropped",
                    column,
                    year
                );
                report.emptied.push((column.clone(), year));
            }
        }

        report.rows_after = kept.len();
        log::info!(
            "Complete-case filter kept {} of {} rows",
            report.rows_after,
            report.rows_before
        );
        for (column, n) in &report.dropped_by_variable {
            log::debug!("  {} rows dropped for missing '{}'", n, column);
        }

        Ok((Panel::new(schema, kept), report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::test_support::{obs, schema};
    use crate::panel::{ColumnKind, MissingCode, Value};

    const MISSING: Value = Value::Missing(MissingCode::Missing);

    #[test]
    fn test_exception_keeps_row_outside_window() {
        let panel = Panel::new(
            schema(&[("loneliness", ColumnKind::Int)]),
            vec![
                obs(1, 2015, vec![MISSING]),
                obs(1, 2018, vec![MISSING]),
                obs(2, 2018, vec![Value::Int(2)]),
            ],
        );
        let filter =
            CompleteCaseFilter::new(vec![RequiredVariable::only_within("loneliness", 2017, 2020)]);
        let (out, report) = filter.apply(panel).unwrap();

        let kept: Vec<_> = out.rows().iter().map(|r| (r.pidp, r.time)).collect();
        assert_eq!(kept, vec![(1, 2015), (2, 2018)]);
        assert_eq!(report.rows_dropped(), 1);
        assert_eq!(report.dropped_by_variable["loneliness"], 1);
        assert!(report.emptied.is_empty());
    }

    #[test]
    fn test_exceptions_are_per_variable() {
        let panel = Panel::new(
            schema(&[("loneliness", ColumnKind::Int), ("sex", ColumnKind::Text)]),
            vec![obs(1, 2015, vec![MISSING, MISSING])],
        );
        let filter = CompleteCaseFilter::new(vec![
            RequiredVariable::only_within("loneliness", 2017, 2020),
            RequiredVariable::new("sex"),
        ]);
        let (out, report) = filter.apply(panel).unwrap();
        assert!(out.is_empty());
        assert_eq!(report.dropped_by_variable.get("loneliness"), None);
        assert_eq!(report.dropped_by_variable["sex"], 1);
    }

    #[test]
    fn test_emptied_wave_is_reported() {
        let panel = Panel::new(
            schema(&[("income", ColumnKind::Float)]),
            vec![
                obs(1, 2019, vec![MISSING]),
                obs(2, 2019, vec![MISSING]),
                obs(1, 2020, vec![Value::Float(1.0)]),
                obs(2, 2020, vec![MISSING]),
            ],
        );
        let (out, report) = CompleteCaseFilter::all_columns(&panel).apply(panel).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(report.dropped_by_variable["income"], 3);
        assert_eq!(report.emptied, vec![("income".to_string(), 2019)]);
    }

    #[test]
    fn test_structural_counts_as_present() {
        let panel = Panel::new(
            schema(&[("job_sector", ColumnKind::Int)]),
            vec![obs(1, 2015, vec![Value::Structural])],
        );
        let (out, _) = CompleteCaseFilter::all_columns(&panel).apply(panel).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_unknown_required_column() {
        let panel = Panel::empty(schema(&[("age", ColumnKind::Int)]));
        let filter = CompleteCaseFilter::new(vec![RequiredVariable::new("nope")]);
        assert!(filter.apply(panel).is_err());
    }

    #[test]
    fn test_year_span_bounds() {
        let span = YearSpan::new(Some(2010), None);
        assert!(span.contains(2010));
        assert!(span.contains(2070));
        assert!(!span.contains(2009));
        assert!(YearSpan::default().contains(1990));
    }
}
