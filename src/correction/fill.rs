//! Longitudinal fill engine
//!
//! Missing cells are resolved from the same individual's other waves:
//! - **Forward**: last observation carried forward
//! - **Backward**: next observation carried backward (immutable attributes only)
//! - **ForwardBackward**: forward, then backward for any leading gap (immutable only)
//! - **MonotonicForward**: forward with a running maximum, for attributes that cannot decrease
//! - **Interpolate**: linear in time between known points, clamped to the edges outside them
//!
//! Each individual is an independent partition processed on the rayon pool.

use super::partition::par_map_groups;
use crate::error::{PanelError, Result};
use crate::panel::{ColumnKind, Observation, Panel, Schema, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

/// How a column is filled across an individual's waves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    Forward,
    Backward,
    ForwardBackward,
    MonotonicForward,
    Interpolate,
}

/// Mutability contract of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeClass {
    /// Fixed at birth or entry (sex, ethnicity, birth year)
    Immutable,
    /// Persists until next true observation (employment, heating)
    Sticky,
    /// Cannot decrease (highest qualification, cumulative births)
    Monotonic,
    /// Derived from another field
    Deterministic,
    /// Progresses smoothly between observations (age)
    Interpolable,
}

impl FillMode {
    /// Whether this mode is safe for an attribute of the given class
    ///
    /// Filling backward in time is only sound for attributes that never
    /// change, so it requires an explicit `Immutable` declaration.
    pub fn permits(self, class: Option<AttributeClass>) -> bool {
        use AttributeClass::{Immutable, Interpolable, Monotonic};
        match self {
            FillMode::Forward => true,
            FillMode::Backward | FillMode::ForwardBackward => class == Some(Immutable),
            FillMode::MonotonicForward => matches!(class, None | Some(Monotonic)),
            FillMode::Interpolate => matches!(class, None | Some(Interpolable)),
        }
    }

    fn needs_numeric(self) -> bool {
        matches!(self, FillMode::MonotonicForward | FillMode::Interpolate)
    }
}

/// One fill mode applied to a list of columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillRule {
    pub mode: FillMode,
    pub columns: Vec<String>,
}

/// Ordered fill rules; each column belongs to exactly one rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FillPlan {
    pub rules: Vec<FillRule>,
}

impl FillPlan {
    pub fn new(rules: Vec<FillRule>) -> Self {
        Self { rules }
    }

    pub fn with(mut self, mode: FillMode, columns: &[&str]) -> Self {
        self.rules.push(FillRule {
            mode,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// Resolve and check the plan against a schema and attribute classes
    fn bind(
        &self,
        schema: &Schema,
        classes: &BTreeMap<String, AttributeClass>,
    ) -> Result<Vec<(FillMode, usize)>> {
        let mut seen = HashSet::new();
        let mut bound = Vec::new();
        for rule in &self.rules {
            for column in &rule.columns {
                let index = schema.require(column)?;
                if !seen.insert(index) {
                    return Err(PanelError::InvalidConfig(format!(
                        "column '{}' appears under more than one fill rule",
                        column
                    )));
                }
                let class = classes.get(column).copied();
                if !rule.mode.permits(class) {
                    return Err(PanelError::InvalidConfig(format!(
                        "{:?} fill is not allowed for column '{}' (class {:?})",
                        rule.mode, column, class
                    )));
                }
                if rule.mode.needs_numeric() && schema.kind(index) == ColumnKind::Text {
                    return Err(PanelError::InvalidConfig(format!(
                        "{:?} fill needs a numeric column, '{}' is text",
                        rule.mode, column
                    )));
                }
                bound.push((rule.mode, index));
            }
        }
        Ok(bound)
    }
}

/// Cells filled per column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillReport {
    pub filled: BTreeMap<String, usize>,
}

impl FillReport {
    pub fn total_filled(&self) -> usize {
        self.filled.values().sum()
    }
}

/// Per-individual fill over the whole panel
#[derive(Debug, Clone, Default)]
pub struct FillEngine {
    plan: FillPlan,
    classes: BTreeMap<String, AttributeClass>,
}

impl FillEngine {
    pub fn new(plan: FillPlan, classes: BTreeMap<String, AttributeClass>) -> Self {
        Self { plan, classes }
    }

    /// Fill a panel, returning the new panel sorted by (pidp, time) within each individual
    pub fn apply(&self, panel: Panel) -> Result<(Panel, FillReport)> {
        let bound = self.plan.bind(panel.schema(), &self.classes)?;
        let panel = if panel.is_sorted() { panel } else { panel.sorted() };

        let schema = panel.shared_schema();
        let before = missing_counts(panel.rows(), &bound);
        let kinds: Vec<ColumnKind> = bound.iter().map(|(_, col)| schema.kind(*col)).collect();

        let rows = par_map_groups(
            panel.into_rows(),
            |row| row.pidp,
            |mut person| {
                for ((mode, col), kind) in bound.iter().zip(&kinds) {
                    fill_person(&mut person, *mode, *col, *kind);
                }
                person
            },
        );

        let after = missing_counts(&rows, &bound);
        let mut report = FillReport::default();
        for (((_, col), b), a) in bound.iter().zip(before).zip(after) {
            report.filled.insert(schema.name(*col).to_string(), b - a);
        }
        log::info!(
            "Longitudinal fill resolved {} cells in {} columns",
            report.total_filled(),
            bound.len()
        );

        Ok((Panel::new(schema, rows), report))
    }
}

fn missing_counts(rows: &[Observation], bound: &[(FillMode, usize)]) -> Vec<usize> {
    bound
        .iter()
        .map(|(_, col)| rows.iter().filter(|r| r.get(*col).is_missing()).count())
        .collect()
}

/// Fill one column for one individual's time-ordered rows
pub fn fill_person(person: &mut [Observation], mode: FillMode, col: usize, kind: ColumnKind) {
    match mode {
        FillMode::Forward => forward(person, col),
        FillMode::Backward => backward(person, col),
        FillMode::ForwardBackward => {
            forward(person, col);
            backward(person, col);
        }
        FillMode::MonotonicForward => monotonic_forward(person, col),
        FillMode::Interpolate => interpolate(person, col, kind),
    }
}

fn carry<'a, I>(cells: I)
where
    I: Iterator<Item = &'a mut Value>,
{
    let mut last: Option<Value> = None;
    for cell in cells {
        if cell.is_missing() {
            if let Some(value) = &last {
                *cell = value.clone();
            }
        } else {
            last = Some(cell.clone());
        }
    }
}

fn forward(person: &mut [Observation], col: usize) {
    carry(person.iter_mut().map(|r| &mut r.values[col]));
}

fn backward(person: &mut [Observation], col: usize) {
    carry(person.iter_mut().rev().map(|r| &mut r.values[col]));
}

fn monotonic_forward(person: &mut [Observation], col: usize) {
    let mut best: Option<Value> = None;
    for row in person.iter_mut() {
        let cell = &mut row.values[col];
        if cell.is_missing() {
            if let Some(value) = &best {
                *cell = value.clone();
            }
            continue;
        }
        match &best {
            // A lower reading after a higher one is a reporting regression
            Some(value) if cell.compare(value) == Some(Ordering::Less) => *cell = value.clone(),
            Some(value) if cell.compare(value).is_none() => {}
            _ => best = Some(cell.clone()),
        }
    }
}

fn interpolate(person: &mut [Observation], col: usize, kind: ColumnKind) {
    let known: Vec<(f64, f64)> = person
        .iter()
        .filter_map(|r| r.get(col).as_f64().map(|v| (r.time as f64, v)))
        .collect();
    let (Some(first), Some(last)) = (known.first().copied(), known.last().copied()) else {
        return;
    };

    for row in person.iter_mut() {
        if !row.get(col).is_missing() {
            continue;
        }
        let t = row.time as f64;
        let estimate = if t <= first.0 {
            first.1
        } else if t >= last.0 {
            last.1
        } else {
            let upper = known.iter().position(|(kt, _)| *kt >= t).unwrap_or(known.len() - 1);
            let (t0, v0) = known[upper - 1];
            let (t1, v1) = known[upper];
            if t1 == t0 {
                v0
            } else {
                v0 + (v1 - v0) * (t - t0) / (t1 - t0)
            }
        };
        row.values[col] = match kind {
            ColumnKind::Int => Value::Int(estimate.round() as i64),
            _ => Value::Float(estimate),
        };
    }
}
