//! # PNG Size Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione (file JSON + override da CLI)
//! - Ottimizzazione sequenziale di ogni PNG richiesto
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (input, output, target, margine, ...)
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose)
//! 3. Espande le directory in input nei file PNG che contengono
//! 4. Ottimizza un file alla volta e raccoglie le statistiche
//!
//! ## Esempio di utilizzo:
//! ```bash
//! png-size-optimizer banner.png hero.png -o optimized_images --target-kb 700 --verbose
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use png_size_optimizer::file_manager::{FileManager, OutputPlan};
use png_size_optimizer::json_output::JsonMessage;
use png_size_optimizer::progress::{OptimizationStats, ProgressManager};
use png_size_optimizer::{OptimizationTarget, SizeTargetingOptimizer, ToolLocator, ToolPathResolver};

#[derive(Parser)]
#[command(name = "png-size-optimizer")]
#[command(about = "Compress PNG images with pngquant until they fit a target file size")]
struct Args {
    /// PNG files or directories containing PNG files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory for optimized files
    #[arg(short, long, default_value = "optimized_images")]
    output: PathBuf,

    /// JSON file with optimization parameters
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target size in KB (1 KB = 1024 bytes)
    #[arg(short, long)]
    target_kb: Option<u64>,

    /// Acceptable overshoot as a fraction of the target (e.g. 0.05)
    #[arg(short, long)]
    margin: Option<f64>,

    /// Maximum number of pngquant attempts per image
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Timeout for each pngquant invocation, in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Path to pngquant, relative to the current directory (falls back to TOOLS_DIR and PATH)
    #[arg(long)]
    tool: Option<PathBuf>,

    /// Output progress and results as JSON lines for programmatic use
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    async fn load_target(&self) -> Result<OptimizationTarget> {
        let mut target = match self.config {
            Some(ref path) => OptimizationTarget::from_file(path).await?,
            None => OptimizationTarget::default(),
        };

        if let Some(kb) = self.target_kb {
            target.target_size_bytes = kb.saturating_mul(1024);
        }
        if let Some(margin) = self.margin {
            target.margin_fraction = margin;
        }
        if let Some(max_iterations) = self.max_iterations {
            target.max_iterations = max_iterations;
        }
        if let Some(timeout) = self.timeout {
            target.timeout_secs = timeout;
        }

        target.validate()?;
        Ok(target)
    }

    /// Expand inputs and split them by whether their final path is free
    fn collect_inputs(&self) -> Result<OutputPlan> {
        // Missing until the first run creates it
        let output = std::fs::canonicalize(&self.output).ok();

        let mut files = Vec::new();
        for input in &self.inputs {
            if input.is_dir() {
                let found = FileManager::find_png_files(input, output.as_deref());
                info!("Found {} PNG files in {}", found.len(), input.display());
                files.extend(found);
            } else if input.is_file() {
                files.push(input.clone());
            } else {
                return Err(anyhow::anyhow!("Input does not exist: {}", input.display()));
            }
        }
        Ok(FileManager::plan_outputs(files, &self.output))
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging; in JSON mode stdout is reserved for messages
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let target = args.load_target().await?;
    let OutputPlan { accepted: files, conflicts } = args.collect_inputs()?;

    if files.is_empty() && conflicts.is_empty() {
        info!("No PNG files found to process");
        return Ok(ExitCode::SUCCESS);
    }

    let mut resolver = ToolPathResolver::new();
    if let Some(ref tool) = args.tool {
        resolver = resolver.with_relative_path(tool);
    }
    // Fail fast before any file is touched
    resolver.locate()?;

    let optimizer = SizeTargetingOptimizer::with_pngquant(target.clone())?;

    info!(
        "🎯 Target: {} (+{:.0}% margin), quality {}-{} down to {}, {} attempts max",
        FileManager::format_size(target.target_size_bytes),
        target.margin_fraction * 100.0,
        target.initial_quality_min,
        target.initial_quality_max,
        target.quality_floor,
        target.max_iterations
    );
    info!("📁 Output directory: {}", args.output.display());

    if args.json {
        JsonMessage::start(args.output.clone(), files.len() + conflicts.len(), &target).emit();
    }

    let mut stats = OptimizationStats::new();
    for conflict in &conflicts {
        stats.add_error();
        error!("Skipping {}", conflict);
        if args.json {
            JsonMessage::file_error(conflict.input.clone(), conflict.to_string()).emit();
        }
    }

    let progress = if args.json {
        ProgressManager::hidden()
    } else {
        ProgressManager::new(files.len() as u64)
    };
    let started = Instant::now();

    for file in &files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        progress.set_message(&format!("⏳ {}", name));

        match optimizer.optimize(file, &args.output, &resolver).await {
            Ok(report) => {
                stats.add_report(&report);
                let dimensions = match report.dimensions() {
                    Ok(dimensions) => Some(dimensions),
                    Err(e) => {
                        warn!("Could not read dimensions of {}: {}", report.final_path.display(), e);
                        None
                    }
                };
                if args.json {
                    JsonMessage::file_complete(file.clone(), &report, dimensions).emit();
                }
                progress.update(&format!(
                    "✅ {}: {} -> {} ({})",
                    name,
                    FileManager::format_size(report.original_size),
                    FileManager::format_size(report.final_size),
                    report.resolution.describe()
                ));
            }
            Err(e) if e.is_fatal_for_batch() => {
                error!("Aborting: {}", e);
                if args.json {
                    JsonMessage::file_error(file.clone(), e.to_string()).emit();
                }
                progress.finish(&format!("❌ {}", e));
                return Err(e.into());
            }
            Err(e) => {
                stats.add_error();
                error!("Failed to optimize {}: {}", file.display(), e);
                if args.json {
                    JsonMessage::file_error(file.clone(), e.to_string()).emit();
                }
                progress.update(&format!("❌ {}: {}", name, e));
            }
        }
    }

    progress.finish(&stats.format_summary());
    info!("{}", stats.format_summary());

    if args.json {
        JsonMessage::complete(&stats, started.elapsed().as_secs_f64()).emit();
    }

    Ok(if stats.errors > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
