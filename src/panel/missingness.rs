//! Missing-value accounting by column and code

use super::data::Panel;
use super::value::MissingCode;
use std::collections::BTreeMap;

/// Counts of missing cells per column, broken down by missing code
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissingnessReport {
    /// column name -> code -> count
    pub by_column: BTreeMap<String, BTreeMap<MissingCode, usize>>,

    /// Total attribute cells inspected
    pub total_cells: usize,
}

impl MissingnessReport {
    pub fn from_panel(panel: &Panel) -> Self {
        let schema = panel.schema();
        let mut counts = vec![BTreeMap::<MissingCode, usize>::new(); schema.len()];
        for row in panel.rows() {
            for (column, value) in row.values.iter().enumerate() {
                if let Some(code) = value.missing_code() {
                    *counts[column].entry(code).or_default() += 1;
                }
            }
        }

        let by_column = counts
            .into_iter()
            .enumerate()
            .map(|(i, c)| (schema.name(i).to_string(), c))
            .collect();

        Self {
            by_column,
            total_cells: panel.len() * schema.len(),
        }
    }

    /// Missing cells in one column
    pub fn column_total(&self, column: &str) -> usize {
        self.by_column
            .get(column)
            .map(|codes| codes.values().sum())
            .unwrap_or(0)
    }

    pub fn total_missing(&self) -> usize {
        self.by_column.values().flat_map(|c| c.values()).sum()
    }

    /// Share of all cells that are missing, in percent
    pub fn percent_missing(&self) -> f64 {
        if self.total_cells == 0 {
            0.0
        } else {
            100.0 * self.total_missing() as f64 / self.total_cells as f64
        }
    }

    /// Log a one-line summary plus per-column detail at debug level
    pub fn log(&self, stage: &str) {
        log::info!(
            "{}: {} missing cells ({:.3}% of all data)",
            stage,
            self.total_missing(),
            self.percent_missing()
        );
        for (column, codes) in &self.by_column {
            if !codes.is_empty() {
                log::debug!("{}:   {} {:?}", stage, column, codes);
            }
        }
    }
}
