//! Panel data structures: schema, observations and the panel table

use super::value::{ColumnKind, Value};
use crate::error::{PanelError, Result};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// One attribute column of the harmonized schema
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

/// Ordered attribute columns shared by every observation of a panel
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<ColumnSpec>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self { columns, index }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Index of a column the caller cannot do without
    pub fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| PanelError::UnknownColumn(name.to_string()))
    }

    pub fn kind(&self, index: usize) -> ColumnKind {
        self.columns[index].kind
    }

    pub fn name(&self, index: usize) -> &str {
        &self.columns[index].name
    }
}

/// One individual in one year
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Person identifier, stable across waves
    pub pidp: i64,

    /// Household identifier
    pub hidp: i64,

    /// Calendar year of the wave
    pub time: i32,

    /// Survey analysis weight
    pub weight: f64,

    /// Attribute cells, positionally matching the panel schema
    pub values: Vec<Value>,
}

impl Observation {
    pub fn get(&self, column: usize) -> &Value {
        &self.values[column]
    }
}

/// The individual-by-year table every stage consumes and produces
#[derive(Debug, Clone)]
pub struct Panel {
    schema: Arc<Schema>,
    rows: Vec<Observation>,
}

impl Panel {
    pub fn new(schema: Arc<Schema>, rows: Vec<Observation>) -> Self {
        Self { schema, rows }
    }

    pub fn empty(schema: Arc<Schema>) -> Self {
        Self::new(schema, Vec::new())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn shared_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Observation> {
        self.rows
    }

    /// Build a panel over the same schema from a new set of rows
    pub fn with_rows(&self, rows: Vec<Observation>) -> Panel {
        Panel::new(self.shared_schema(), rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sort into (pidp, time) order
    pub fn sorted(mut self) -> Self {
        self.rows.sort_by(|a, b| (a.pidp, a.time).cmp(&(b.pidp, b.time)));
        self
    }

    pub fn is_sorted(&self) -> bool {
        self.rows
            .windows(2)
            .all(|w| (w[0].pidp, w[0].time) <= (w[1].pidp, w[1].time))
    }

    /// Distinct wave years present
    pub fn years(&self) -> BTreeSet<i32> {
        self.rows.iter().map(|r| r.time).collect()
    }

    pub fn person_count(&self) -> usize {
        self.rows.iter().map(|r| r.pidp).collect::<BTreeSet<_>>().len()
    }

    /// Keep rows with `from <= time <= to`
    pub fn restrict_years(self, from: i32, to: i32) -> Self {
        let rows = self
            .rows
            .into_iter()
            .filter(|r| r.time >= from && r.time <= to)
            .collect();
        Panel::new(self.schema, rows)
    }

    /// Keep only individuals observed in at least `k` waves
    pub fn restrict_chains(self, k: usize) -> Self {
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for row in &self.rows {
            *counts.entry(row.pidp).or_default() += 1;
        }
        let rows = self
            .rows
            .into_iter()
            .filter(|r| counts.get(&r.pidp).copied().unwrap_or(0) >= k)
            .collect();
        Panel::new(self.schema, rows)
    }

    /// Rows observed in one wave
    pub fn wave(&self, year: i32) -> impl Iterator<Item = &Observation> {
        self.rows.iter().filter(move |r| r.time == year)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::panel::MissingCode;

    fn sample() -> Panel {
        let schema = schema(&[("age", ColumnKind::Int)]);
        Panel::new(
            schema,
            vec![
                obs(2, 2011, vec![Value::Int(31)]),
                obs(1, 2012, vec![Value::Int(41)]),
                obs(1, 2010, vec![Value::Missing(MissingCode::Missing)]),
                obs(3, 2010, vec![Value::Int(20)]),
            ],
        )
    }

    #[test]
    fn test_sorted_order() {
        let panel = sample();
        assert!(!panel.is_sorted());
        let panel = panel.sorted();
        assert!(panel.is_sorted());
        let keys: Vec<_> = panel.rows().iter().map(|r| (r.pidp, r.time)).collect();
        assert_eq!(keys, vec![(1, 2010), (1, 2012), (2, 2011), (3, 2010)]);
    }

    #[test]
    fn test_restrict_chains() {
        let panel = sample().restrict_chains(2);
        assert_eq!(panel.len(), 2);
        assert!(panel.rows().iter().all(|r| r.pidp == 1));
    }

    #[test]
    fn test_restrict_years() {
        let panel = sample().restrict_years(2011, 2012);
        assert_eq!(panel.len(), 2);
        assert_eq!(panel.years().into_iter().collect::<Vec<_>>(), vec![2011, 2012]);
    }

    #[test]
    fn test_wave_and_person_count() {
        let panel = sample();
        assert_eq!(panel.wave(2010).count(), 2);
        assert_eq!(panel.person_count(), 3);
        assert!(Panel::empty(schema(&[("sex", ColumnKind::Text)])).is_empty());
    }
}
