//! Reconciliation runner
//!
//! Loads the projection table once, then runs the correction stages in
//! order over a panel:
//! restrict chains -> deterministic -> fill -> target years -> complete case -> reweight
//!
//! # Example
//! ```ignore
//! let config = PipelineConfig::from_path(Path::new("config.json"))?;
//! let runner = ReconciliationRunner::from_config(config)?;
//! let (panel, summary) = runner.run()?;
//! let (replenishing, _) = runner.replenish(&panel)?;
//! ```

use crate::config::PipelineConfig;
use crate::correction::{
    CompleteCaseFilter, CompleteCaseReport, CorrectionReport, DeterministicCorrector, FillEngine,
    FillReport,
};
use crate::error::Result;
use crate::panel::{load_waves, save_panel, save_waves, MissingnessReport, Panel};
use crate::replenishment::{ReplenishmentGenerator, ReplenishmentReport};
use crate::weighting::{ProjectionTable, ReweightReport, Reweighter};
use std::path::{Path, PathBuf};

/// Stage-by-stage account of one reconciliation run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub rows_loaded: usize,
    pub rows_after_chains: usize,
    pub missing_before: MissingnessReport,
    pub correction: CorrectionReport,
    pub missing_after_correction: MissingnessReport,
    pub fill: FillReport,
    pub missing_after_fill: MissingnessReport,
    pub complete_case: CompleteCaseReport,
    pub reweight: ReweightReport,
    pub rows_final: usize,
    pub written: Vec<PathBuf>,
}

/// Runs the full correction pipeline with pre-loaded projections
#[derive(Debug, Clone)]
pub struct ReconciliationRunner {
    config: PipelineConfig,
    projections: ProjectionTable,
}

impl ReconciliationRunner {
    pub fn new(config: PipelineConfig, projections: ProjectionTable) -> Self {
        Self {
            config,
            projections,
        }
    }

    /// Create runner by loading projections from the configured path
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let projections = ProjectionTable::load(&config.projections_path)?;
        Ok(Self::new(config, projections))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn projections(&self) -> &ProjectionTable {
        &self.projections
    }

    /// Run every stage over an already-loaded panel
    pub fn reconcile(&self, panel: Panel) -> Result<(Panel, RunSummary)> {
        let config = &self.config;
        let mut summary = RunSummary {
            rows_loaded: panel.len(),
            ..Default::default()
        };

        let panel = panel.restrict_chains(config.min_observations);
        summary.rows_after_chains = panel.len();
        log::info!(
            "Kept {} of {} rows for individuals with at least {} waves",
            summary.rows_after_chains,
            summary.rows_loaded,
            config.min_observations
        );
        summary.missing_before = MissingnessReport::from_panel(&panel);
        summary.missing_before.log("Raw data before correction");

        let corrector = DeterministicCorrector::new(config.corrections.clone());
        let (panel, correction) = corrector.apply(&panel)?;
        summary.correction = correction;
        summary.missing_after_correction = MissingnessReport::from_panel(&panel);
        summary
            .missing_after_correction
            .log("After removing deterministically missing values");

        let engine = FillEngine::new(config.fill_plan.clone(), config.attribute_classes.clone());
        let (panel, fill) = engine.apply(panel)?;
        summary.fill = fill;
        summary.missing_after_fill = MissingnessReport::from_panel(&panel);
        summary.missing_after_fill.log("After longitudinal fill");

        let panel = panel.restrict_years(config.first_save_year, config.last_save_year);

        let filter = match &config.required {
            Some(required) => CompleteCaseFilter::new(required.clone()),
            None => CompleteCaseFilter::all_columns(&panel),
        };
        let (panel, complete_case) = filter.apply(panel)?;
        summary.complete_case = complete_case;

        let reweighter = Reweighter::new(&self.projections, config.calibration.clone());
        let (panel, reweight) = reweighter.reweight(panel)?;
        summary.reweight = reweight;

        let panel = panel.sorted();
        summary.rows_final = panel.len();
        Ok((panel, summary))
    }

    /// Load the configured waves, reconcile them and write one file per year
    pub fn run(&self) -> Result<(Panel, RunSummary)> {
        let config = &self.config;
        let panel = load_waves(
            &config.input_dir,
            config.first_wave,
            config.last_wave,
            &config.column_kinds,
        )?;
        let (panel, mut summary) = self.reconcile(panel)?;
        summary.written = save_waves(&panel, &config.output_dir)?;
        Ok((panel, summary))
    }

    /// Reload the reconciled waves written by [`run`](Self::run)
    ///
    /// Covers the saved years and the replenishment base year, so every id
    /// already in use is seen by the minter.
    pub fn load_reconciled(&self, dir: &Path) -> Result<Panel> {
        let config = &self.config;
        let base = config.replenishment.base_year;
        load_waves(
            dir,
            config.first_save_year.min(base),
            config.last_save_year.max(base),
            &config.column_kinds,
        )
    }

    /// Build the replenishing population from a reconciled panel
    pub fn replenish(&self, panel: &Panel) -> Result<(Panel, ReplenishmentReport)> {
        let generator = ReplenishmentGenerator::new(
            self.config.replenishment.clone(),
            self.config.calibration.clone(),
        );
        generator.generate(panel, &self.projections)
    }

    /// Replenish and write `replenishing_pop_{first}-{last}.csv` under `dir`
    pub fn save_replenishment(
        &self,
        panel: &Panel,
        dir: &Path,
    ) -> Result<(PathBuf, ReplenishmentReport)> {
        let (replenishing, report) = self.replenish(panel)?;
        let path = self.config.replenishment.output_path(dir);
        save_panel(&replenishing, &path)?;
        Ok((path, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::{FillMode, FillPlan, RequiredVariable};
    use crate::panel::test_support::schema;
    use crate::panel::{ColumnKind, MissingCode, Observation, Value};
    use crate::weighting::StratumKey;

    const MISSING: Value = Value::Missing(MissingCode::Missing);

    fn row(pidp: i64, time: i32, sex: Value, age: Value) -> Observation {
        Observation {
            pidp,
            hidp: pidp,
            time,
            weight: 1.0,
            values: vec![sex, Value::Text("WBI".into()), age],
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            first_wave: 2009,
            last_wave: 2011,
            first_save_year: 2010,
            last_save_year: 2011,
            corrections: Vec::new(),
            fill_plan: FillPlan::default()
                .with(FillMode::ForwardBackward, &["sex", "ethnicity"])
                .with(FillMode::Interpolate, &["age"]),
            required: Some(vec![RequiredVariable::new("sex"), RequiredVariable::new("age")]),
            ..Default::default()
        }
    }

    #[test]
    fn test_reconcile_stages_in_order() {
        let panel = Panel::new(
            schema(&[
                ("sex", ColumnKind::Text),
                ("ethnicity", ColumnKind::Text),
                ("age", ColumnKind::Int),
            ]),
            vec![
                row(1, 2009, MISSING, Value::Int(30)),
                row(1, 2010, Value::Text("Female".into()), MISSING),
                row(1, 2011, MISSING, Value::Int(32)),
                // Single wave, removed by the chain restriction
                row(2, 2010, Value::Text("Male".into()), Value::Int(50)),
                // Never has a sex, removed by the complete-case filter
                row(3, 2010, MISSING, Value::Int(40)),
                row(3, 2011, MISSING, Value::Int(41)),
            ],
        );
        let projections = ProjectionTable::from_counts(vec![
            (StratumKey::new("Female", "WBI", 31, 2010), 10.0),
            (StratumKey::new("Female", "WBI", 32, 2011), 20.0),
        ]);

        let runner = ReconciliationRunner::new(config(), projections);
        let (out, summary) = runner.reconcile(panel).unwrap();

        assert_eq!(summary.rows_loaded, 6);
        assert_eq!(summary.rows_after_chains, 5);
        assert_eq!(summary.fill.filled["sex"], 2);
        assert_eq!(summary.fill.filled["age"], 1);
        assert_eq!(summary.complete_case.dropped_by_variable["sex"], 2);

        let kept: Vec<_> = out.rows().iter().map(|r| (r.pidp, r.time)).collect();
        assert_eq!(kept, vec![(1, 2010), (1, 2011)]);
        assert_eq!(out.rows()[0].get(2), &Value::Int(31));
        assert_eq!(out.rows()[0].weight, 0.0);
        assert_eq!(out.rows()[1].weight, 1.0);
    }
}
