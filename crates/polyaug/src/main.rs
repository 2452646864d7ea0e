//! polyaug: augment polygon-labeled image datasets from the command line.
//!
//! Reads a dataset JSON document, generates augmented replicas of every
//! segmented image (recovering and validating their polygons), and writes
//! the expanded dataset. Also prints quick dataset summaries.
//!
//! # Usage
//!
//! ```text
//! polyaug augment dataset.json --output augmented.json --replicas 3
//! polyaug stats dataset.json
//! ```
//!
//! Logging is controlled with `RUST_LOG`; the default shows batch
//! progress at `info`.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use polyaug_io::{AugmentConfig, DEFAULT_REPLICAS};
use polyaug_pipeline::RecoveryConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default log filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "polyaug=info,polyaug_io=info";

/// Augment polygon-labeled image datasets.
#[derive(Parser)]
#[command(name = "polyaug", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate augmented replicas and write the expanded dataset.
    Augment(AugmentArgs),
    /// Print image, annotation and category counts of a dataset.
    Stats {
        /// Path to the dataset JSON.
        dataset: PathBuf,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct AugmentArgs {
    /// Path to the input dataset JSON.
    dataset: PathBuf,

    /// Where to write the expanded dataset JSON.
    #[arg(long, short)]
    output: PathBuf,

    /// Replicas generated per image.
    #[arg(long, default_value_t = DEFAULT_REPLICAS)]
    replicas: usize,

    /// Worker pool size (default: available parallelism).
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    workers: Option<usize>,

    /// Base seed for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,

    /// Parent directory of the per-run image directories.
    #[arg(long)]
    output_root: Option<PathBuf>,

    /// Minimum IoU between a recovered polygon and its source.
    #[arg(long, default_value_t = RecoveryConfig::DEFAULT_MIN_IOU)]
    min_iou: f64,

    /// Full augmentation config as a JSON string.
    ///
    /// When provided, the other configuration flags are ignored. The JSON
    /// must be a valid `AugmentConfig` serialization; missing fields take
    /// their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// Build an [`AugmentConfig`] from CLI arguments.
///
/// If `--config-json` is provided it wins over the individual flags.
fn config_from_args(args: &AugmentArgs) -> Result<AugmentConfig, String> {
    if let Some(ref json) = args.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let defaults = AugmentConfig::default();
    Ok(AugmentConfig {
        recovery: RecoveryConfig {
            min_iou: args.min_iou,
            ..defaults.recovery.clone()
        },
        output_root: args
            .output_root
            .clone()
            .unwrap_or_else(|| defaults.output_root.clone()),
        workers: args.workers,
        seed: args.seed,
        ..defaults
    })
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_augment(args: &AugmentArgs) -> Result<(), String> {
    let config = config_from_args(args)?;
    let dataset = polyaug_io::load_dataset(&args.dataset).map_err(|e| e.to_string())?;
    tracing::info!(
        images = dataset.images.len(),
        replicas = args.replicas,
        workers = config.worker_count(),
        "starting augmentation"
    );

    let (augmented, report) = polyaug_io::generic_with_report(&dataset, args.replicas, &config)
        .map_err(|e| e.to_string())?;
    polyaug_io::save_dataset(&args.output, &augmented).map_err(|e| e.to_string())?;

    eprintln!(
        "{} of {} replicas accepted; {} images in {}",
        report.accepted,
        report.attempted,
        augmented.images.len(),
        args.output.display(),
    );
    for (kind, count) in &report.rejected {
        eprintln!("  rejected ({kind}): {count}");
    }
    if report.skipped_images > 0 {
        eprintln!("  images without segmentations: {}", report.skipped_images);
    }
    Ok(())
}

fn run_stats(dataset: &Path, json: bool) -> Result<(), String> {
    let summary = polyaug_io::load_dataset(dataset)
        .map_err(|e| e.to_string())?
        .summary();

    if json {
        let text = serde_json::to_string_pretty(&summary)
            .map_err(|e| format!("Error serializing summary: {e}"))?;
        println!("{text}");
        return Ok(());
    }

    println!("images:       {}", summary.image_count);
    println!("  augmented:  {}", summary.derived_image_count);
    println!("annotations:  {}", summary.annotation_count);
    println!("categories:   {}", summary.category_count);
    for name in &summary.category_names {
        println!("  - {name}");
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let result = match &cli.command {
        Command::Augment(args) => run_augment(args),
        Command::Stats { dataset, json } => run_stats(dataset, *json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}
