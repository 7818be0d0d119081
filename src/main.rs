//! Fault Sentinel - sensor telemetry failure analysis
//!
//! Runs one analysis over a CSV telemetry file (or seeded synthetic data)
//! and prints the report.
//!
//! # Usage
//!
//! ```bash
//! # Analyze a CSV file
//! fault-sentinel --csv telemetry.csv
//!
//! # Analyze synthetic demonstration data, JSON report on stdout
//! fault-sentinel --synthetic --rows 1000 --seed 7 --json
//!
//! # Show the effective configuration
//! fault-sentinel --print-config
//! ```
//!
//! # Environment Variables
//!
//! - `FAULT_SENTINEL_CONFIG`: Path to the TOML config (default: ./fault_sentinel.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use fault_sentinel::config::{AnalysisConfig, ConfigProvenance};
use fault_sentinel::pipeline::{AnalysisInput, LogProgress, PipelineCoordinator};
use fault_sentinel::types::AnalysisResult;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "fault-sentinel")]
#[command(about = "Sensor telemetry failure analysis")]
#[command(version)]
struct CliArgs {
    /// Path to CSV file with a header row naming the sensor channels
    #[arg(long, value_name = "FILE", conflicts_with = "synthetic")]
    csv: Option<PathBuf>,

    /// Analyze seeded synthetic telemetry instead of a file
    #[arg(long)]
    synthetic: bool,

    /// Synthetic row count (overrides [synthetic].rows)
    #[arg(long, requires = "synthetic")]
    rows: Option<usize>,

    /// Synthetic random seed (overrides [synthetic].seed)
    #[arg(long, requires = "synthetic")]
    seed: Option<u64>,

    /// Config file (overrides the FAULT_SENTINEL_CONFIG / ./fault_sentinel.toml search)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, env = "FAULT_SENTINEL_LOG_JSON")]
    log_json: bool,

    /// Print the effective config as TOML, with its source and user-set keys, and exit
    #[arg(long)]
    print_config: bool,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(args: &CliArgs) -> Result<(AnalysisConfig, ConfigProvenance)> {
    let (mut config, provenance) = match args.config {
        Some(ref path) => AnalysisConfig::load_from_file_with_provenance(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AnalysisConfig::load_with_provenance(),
    };
    if let Some(rows) = args.rows {
        config.synthetic.rows = rows;
    }
    if let Some(seed) = args.seed {
        config.synthetic.seed = seed;
    }
    Ok((config, provenance))
}

fn print_summary(result: &AnalysisResult) {
    println!("Samples analyzed:  {}", result.total_samples());
    println!(
        "Failure predicted: {} ({:.1}%)",
        result.failure_predictions(),
        result.failure_rate() * 100.0
    );
    println!("Normal:            {}", result.normal_predictions());
    println!(
        "Processing time:   {} ms",
        result.processing_time().as_millis()
    );

    let failures: Vec<_> = result.predictions().iter().filter(|p| p.is_failure()).collect();
    if failures.is_empty() {
        return;
    }
    println!();
    println!("{:<16} {:>10}  {}", "record", "confidence", "contributing factors");
    for p in failures {
        println!(
            "{:<16} {:>9.0}%  {}",
            p.id().to_string(),
            p.confidence() * 100.0,
            p.contributing_factors().join(", ")
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let (config, provenance) = load_config(&args)?;
    if args.print_config {
        print!("{}", provenance.header());
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    let raw = match args.csv {
        Some(ref path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        None if args.synthetic => None,
        None => bail!("No input: pass --csv <FILE> or --synthetic"),
    };
    let input = raw
        .as_deref()
        .map_or(AnalysisInput::Synthetic(config.synthetic), AnalysisInput::Table);

    let coordinator = PipelineCoordinator::from_config(&config)
        .context("Failed to build analysis pipeline")?;

    let cancel = CancellationToken::new();
    let shutdown_token = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, cancelling analysis");
        shutdown_token.cancel();
    });

    let result = match coordinator.analyze(input, &mut LogProgress, &cancel).await {
        Ok(result) => result,
        Err(e) => {
            error!(kind = %e.kind(), "Analysis failed: {e}");
            return Err(e.into());
        }
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialize report")?
        );
    } else {
        print_summary(&result);
    }
    Ok(())
}
