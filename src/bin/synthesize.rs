//! Synthetic Telemetry Writer
//!
//! Writes the seeded demonstration telemetry as CSV so it can be replayed
//! through `fault-sentinel --csv`.
//!
//! # Usage
//! ```bash
//! ./synthesize --rows 1000 --seed 7 > telemetry.csv
//! ./fault-sentinel --csv telemetry.csv
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::sync::Arc;

use fault_sentinel::acquisition::{write_table, SyntheticGenerator};
use fault_sentinel::config::AnalysisConfig;

#[derive(Parser, Debug)]
#[command(name = "synthesize")]
#[command(about = "Seeded sensor telemetry generator for fault-sentinel testing")]
#[command(version)]
struct Args {
    /// Number of data rows (default: [synthetic].rows)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    rows: Option<u64>,

    /// Random seed for reproducibility (default: [synthetic].seed)
    #[arg(long)]
    seed: Option<u64>,

    /// Share of rows drawn from the fault profile (0.0 - 1.0)
    #[arg(long)]
    failure_rate: Option<f64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut config = AnalysisConfig::load();
    if let Some(rows) = args.rows {
        config.synthetic.rows = usize::try_from(rows).context("--rows is too large")?;
    }
    if let Some(seed) = args.seed {
        config.synthetic.seed = seed;
    }
    if let Some(rate) = args.failure_rate {
        anyhow::ensure!(
            (0.0..=1.0).contains(&rate),
            "--failure-rate must be within [0, 1] (got {rate})"
        );
        config.synthetic.failure_rate = rate;
    }

    let channels = Arc::new(config.channel_set()?);
    let records = SyntheticGenerator::new(Arc::clone(&channels), config.synthetic)
        .generate()
        .context("Failed to generate synthetic telemetry")?;

    let mut stdout = io::stdout().lock();
    stdout
        .write_all(write_table(&channels, &records).as_bytes())
        .context("Failed to write telemetry")?;
    stdout.flush()?;
    Ok(())
}
