//! GRID Monitor — Pipeline Entrypoint
//! Runs the ingestion-and-merge pipeline once, or converts a folder of
//! equity spreadsheet exports on its own.
//!
//! Exit codes for the scheduler: 0 = full success, 2 = partial (snapshot
//! written, some sources failed), 1 = hard failure (nothing written).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use grid_monitor::config::PipelineConfig;
use grid_monitor::pipeline::{run_once, RunOutcome, RunOverrides};

#[derive(Parser)]
#[command(
    name = "grid-monitor",
    about = "GRID Monitor — energy dashboard ingestion pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline once and write the merged snapshot.
    Run {
        /// Pipeline config path. Defaults to $GRID_MONITOR_CONFIG, then
        /// config/pipeline.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Snapshot destination override.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Normalize this folder of spreadsheet exports before merging.
        #[arg(long)]
        equities_folder: Option<PathBuf>,
    },
    /// Convert a folder of spreadsheet exports into the equity export JSON.
    Normalize {
        /// Folder containing the per-subsector CSV exports.
        #[arg(long)]
        folder: PathBuf,

        /// Destination for the export document.
        #[arg(long, default_value = "data/equities.json")]
        out: PathBuf,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("grid_monitor=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            output,
            equities_folder,
        } => {
            let cfg = match PipelineConfig::load(config.as_deref()) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::error!(error = ?e, "config load failed");
                    return ExitCode::from(1);
                }
            };
            let overrides = RunOverrides {
                output,
                equities_folder,
            };
            match run_once(&cfg, &overrides).await {
                Ok(RunOutcome::Full) => ExitCode::SUCCESS,
                Ok(RunOutcome::Partial { failed }) => {
                    tracing::warn!(failed = ?failed, "run completed with degraded sources");
                    ExitCode::from(2)
                }
                Err(e) => {
                    tracing::error!(error = ?e, "run failed, previous snapshot left in place");
                    ExitCode::from(1)
                }
            }
        }
        Commands::Normalize { folder, out } => {
            match grid_monitor::equities::run_normalizer(&folder, &out, chrono::Utc::now()) {
                Ok(diagnostics) if diagnostics.is_empty() => ExitCode::SUCCESS,
                Ok(diagnostics) => {
                    for d in &diagnostics {
                        tracing::warn!(code = d.code(), "normalizer diagnostic: {d}");
                    }
                    ExitCode::from(2)
                }
                Err(e) => {
                    tracing::error!(error = ?e, "normalize failed");
                    ExitCode::from(1)
                }
            }
        }
    }
}
