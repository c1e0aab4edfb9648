//! Panel reconciliation CLI
//!
//! Loads the per-wave cohort extracts, runs the correction and reweighting
//! stages, and writes one reconciled file per year.

use anyhow::{Context, Result};
use clap::Parser;
use panel_engine::{PipelineConfig, ReconciliationRunner};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(
    name = "panel_engine",
    version,
    about = "Reconcile and reweight longitudinal survey waves"
)]
struct Args {
    /// Pipeline configuration (JSON); defaults apply when omitted
    #[arg(long, short, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory of `{year}_US_cohort.csv` extracts
    #[arg(long, value_name = "DIR")]
    input_dir: Option<PathBuf>,

    /// Directory for reconciled per-year files
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Demographic projections CSV
    #[arg(long, value_name = "FILE")]
    projections: Option<PathBuf>,

    /// Also write the replenishing population to the output directory
    #[arg(long)]
    replenish: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = args.input_dir {
        config.input_dir = dir;
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(path) = args.projections {
        config.projections_path = path;
    }

    println!("Panel Engine v{}", env!("CARGO_PKG_VERSION"));
    println!("======================\n");
    println!("Waves:      {}-{}", config.first_wave, config.last_wave);
    println!("Saving:     {}-{}", config.first_save_year, config.last_save_year);
    println!("Input:      {}", config.input_dir.display());
    println!("Output:     {}", config.output_dir.display());
    println!();

    let start = Instant::now();
    let runner = ReconciliationRunner::from_config(config)
        .context("loading demographic projections")?;
    let (panel, summary) = runner.run().context("reconciliation failed")?;

    println!("Rows loaded:              {}", summary.rows_loaded);
    println!("Rows after chain filter:  {}", summary.rows_after_chains);
    println!(
        "Missing cells:            {} -> {} -> {}",
        summary.missing_before.total_missing(),
        summary.missing_after_correction.total_missing(),
        summary.missing_after_fill.total_missing()
    );
    println!("Deterministic fixes:      {}", summary.correction.total_replaced());
    println!("Longitudinal fills:       {}", summary.fill.total_filled());
    println!("Complete-case drops:      {}", summary.complete_case.rows_dropped());
    for (variable, year) in &summary.complete_case.emptied {
        println!("  WARNING: {} emptied wave {}", variable, year);
    }
    println!(
        "Calibrated strata:        {} ({} unmatched)",
        summary.reweight.matched_strata,
        summary.reweight.unmatched_strata.len()
    );
    println!("Final rows:               {}", summary.rows_final);
    println!("Files written:            {}", summary.written.len());

    if args.replenish {
        let (path, report) = runner
            .save_replenishment(&panel, &runner.config().output_dir)
            .context("replenishment failed")?;
        println!(
            "\nReplenishing population: {} rows ({} entrants/year) written to {}",
            report.rows,
            report.entrants_per_year,
            path.display()
        );
    }

    println!("\nCompleted in {:?}", start.elapsed());
    Ok(())
}
