//! disp-sas - displacement stack controller
//!
//! Subcommands:
//! - `run`: prepare a full workflow from a run configuration
//! - `resolve-reference`: print the phase reference choice for a file list
//! - `combine-stats`: fuse amplitude statistics across ministacks

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, info_span};

use disp_common::catalog::load_reference_dates;
use disp_common::config::{resolve_scratch_path, RunConfig};
use disp_common::reference::{resolve, CompressedSlcPlan};
use disp_common::stats::{StatisticsFuser, StatisticsPair, WeightScheme};
use disp_common::EpochStack;
use disp_sas::logging::init_logging;
use disp_sas::prepare_workflow;

/// Command-line arguments for disp-sas
#[derive(Parser, Debug)]
#[command(name = "disp-sas")]
#[command(about = "Displacement stack controller")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prepare a workflow from a run configuration
    Run {
        /// Run configuration (TOML)
        config: PathBuf,

        /// Scratch directory (overrides DISP_SCRATCH_PATH and the run configuration)
        #[arg(long)]
        scratch_path: Option<PathBuf>,

        /// Default to debug logging when RUST_LOG is unset
        #[arg(long)]
        debug: bool,
    },

    /// Print the output reference index and extra reference date as JSON
    ResolveReference {
        #[arg(long)]
        frame_id: String,

        /// Reference date database (JSON)
        #[arg(long)]
        reference_dates: Option<PathBuf>,

        #[arg(long, default_value = "always_first")]
        plan: CompressedSlcPlan,

        /// Input files, in any order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Combine amplitude mean/dispersion of the current ministack with
    /// those of prior compressed epochs
    CombineStats {
        #[arg(long)]
        mean: PathBuf,

        #[arg(long)]
        dispersion: PathBuf,

        /// Compressed epoch means, oldest first
        #[arg(long = "compressed-mean")]
        compressed_means: Vec<PathBuf>,

        /// Compressed epoch dispersions, oldest first
        #[arg(long = "compressed-dispersion")]
        compressed_dispersions: Vec<PathBuf>,

        /// Number of real acquisitions behind the current statistics
        #[arg(long)]
        num_slc: usize,

        #[arg(long, default_value = "exponential")]
        weight_scheme: WeightScheme,

        #[arg(long, default_value = "1")]
        workers: usize,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Run {
            config,
            scratch_path,
            debug,
        } => {
            let run_config = RunConfig::from_file(&config)
                .with_context(|| format!("Failed to load run configuration {}", config.display()))?;
            init_logging(run_config.log_file.as_deref(), debug)?;
            info!(
                "Starting disp-sas v{} for frame {}",
                env!("CARGO_PKG_VERSION"),
                run_config.input_file_group.frame_id
            );

            let scratch = resolve_scratch_path(scratch_path.as_deref(), Some(&run_config));
            info!("Scratch path: {}", scratch.display());
            prepare_workflow(&run_config, &scratch)?;
        }

        Command::ResolveReference {
            frame_id,
            reference_dates,
            plan,
            files,
        } => {
            init_logging(None, false)?;
            let stack = EpochStack::from_identifiers(files).context("Invalid input file list")?;
            let dates = load_reference_dates(reference_dates.as_deref(), &frame_id)?;
            let resolution = resolve(&stack, &dates, plan);
            println!("{}", serde_json::to_string_pretty(&resolution)?);
        }

        Command::CombineStats {
            mean,
            dispersion,
            compressed_means,
            compressed_dispersions,
            num_slc,
            weight_scheme,
            workers,
        } => {
            init_logging(None, false)?;
            if compressed_means.len() != compressed_dispersions.len() {
                anyhow::bail!(
                    "{} compressed means but {} compressed dispersions",
                    compressed_means.len(),
                    compressed_dispersions.len()
                );
            }
            let compressed: Vec<StatisticsPair> = compressed_means
                .into_iter()
                .zip(compressed_dispersions)
                .map(|(m, d)| StatisticsPair::new(m, d))
                .collect();

            let fuser = StatisticsFuser::new(info_span!("combine_stats"), weight_scheme)
                .with_workers(workers);
            let outcome = fuser.fuse(&StatisticsPair::new(mean, dispersion), &compressed, num_slc)?;
            let report = json!({
                "skipped": outcome.was_skipped(),
                "outputs": outcome.statistics(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
