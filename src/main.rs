//! CLI entry point for rust_mda
//!
//! # Usage
//!
//! Print the expanded step list:
//! ```bash
//! rust_mda plan --config config/mda.example.toml
//! ```
//!
//! Run the acquisition against simulated hardware:
//! ```bash
//! rust_mda run --config config/mda.example.toml --realistic
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_mda::config::{AppConfig, DEFAULT_CONFIG_PATH};
use rust_mda::daq_experiment::RunOutcome;
use rust_mda::{app, logging};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rust_mda")]
#[command(about = "Multi-dimensional image acquisition on simulated hardware", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the steps the configured acquisition would execute
    Plan {
        /// Print at most this many steps
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Run the configured acquisition against simulated hardware
    Run {
        /// Simulate exposure, motion and settling times
        #[arg(long)]
        realistic: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("Loading configuration from {}", cli.config.display()))?;
    logging::init_from_config(&config)?;

    match cli.command {
        Commands::Plan { limit } => print_plan(&config, limit),
        Commands::Run { realistic } => {
            if realistic {
                config.hardware.mode = daq_driver_mock::MockMode::Realistic;
            }
            run(&config)
        }
    }
}

fn print_plan(config: &AppConfig, limit: Option<usize>) -> Result<()> {
    let steps = app::plan(config)?;
    let shown = limit.unwrap_or(steps.len()).min(steps.len());

    for (i, step) in steps.iter().take(shown).enumerate() {
        println!("{i:>6}  {step}");
    }
    if shown < steps.len() {
        println!("   ...  {} more", steps.len() - shown);
    }
    println!("{} steps", steps.len());
    Ok(())
}

fn run(config: &AppConfig) -> Result<()> {
    let summary = app::run_acquisition(config, |done, total| {
        tracing::info!(done, total, "Progress");
    })?;
    println!("{summary}");

    match summary.report.outcome {
        RunOutcome::Finished | RunOutcome::Stopped { .. } => Ok(()),
        RunOutcome::Overflow { produced, total } => {
            anyhow::bail!("Frame buffer overflow after {produced} of {total} frames")
        }
        RunOutcome::Failed(err) => Err(err.into()),
    }
}
