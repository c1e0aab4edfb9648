//! Generate the replenishing population from a reconciled base-year wave
//!
//! Reads the reconciled `{year}_US_cohort.csv` files, draws entrants from
//! the base year and writes `replenishing_pop_{first}-{last}.csv`.

use anyhow::{Context, Result};
use clap::Parser;
use panel_engine::{PipelineConfig, ReconciliationRunner};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "replenish", about = "Build future new-entrant cohorts")]
struct Args {
    /// Pipeline configuration (JSON); defaults apply when omitted
    #[arg(long, short, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the reconciled per-year files
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Output directory (default: data/replenishing)
    #[arg(long, value_name = "DIR", default_value = "data/replenishing")]
    output_dir: PathBuf,

    /// Last year of the horizon
    #[arg(long)]
    last_year: Option<i32>,

    /// Seed for minted identifiers
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(year) = args.last_year {
        config.replenishment.last_year = year;
    }
    if let Some(seed) = args.seed {
        config.replenishment.id_seed = seed;
    }
    let data_dir = args.data_dir.unwrap_or_else(|| config.output_dir.clone());

    let runner = ReconciliationRunner::from_config(config)
        .context("loading demographic projections")?;
    let config = runner.config();
    println!("Loading reconciled waves from {}...", data_dir.display());
    let panel = runner
        .load_reconciled(&data_dir)
        .with_context(|| format!("loading reconciled waves from {}", data_dir.display()))?;

    let (path, report) = runner
        .save_replenishment(&panel, &args.output_dir)
        .context("generating replenishing population")?;

    println!(
        "Replenishing population generated for {} - {}",
        config.replenishment.first_year, config.replenishment.last_year
    );
    println!("  Households copied:  {}", report.households);
    println!("  Entrants per year:  {}", report.entrants_per_year);
    println!("  Rows written:       {}", report.rows);
    println!("  Output:             {}", path.display());
    Ok(())
}
