//! Command line entry point: frame correction and threshold estimation

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use unwcorr::core::batch::BatchParams;
use unwcorr::core::relaxation::RelaxationParams;
use unwcorr::io::par_file::TargetSelection;
use unwcorr::{
    CorrectionPipeline, FrameLayout, ImageGeometry, LayoutParams, PipelineConfig,
    ThresholdEstimator,
};

#[derive(Parser, Debug)]
#[command(name = "unwcorr")]
#[command(about = "Correct 2π unwrapping errors of interferograms from time-series residuals")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Correct every interferogram with a residual, relaxing thresholds until
    /// the retained network has no gap
    Correct(CorrectArgs),
    /// Compute residual RMS statistics and write the threshold file
    EstimateThreshold(FrameArgs),
}

#[derive(Args, Debug, Clone)]
struct FrameArgs {
    /// Frame directory
    #[arg(short = 'f', long = "frame_dir", default_value = "./")]
    frame_dir: PathBuf,

    /// Directory with connected components and slc.mli.par
    #[arg(short = 'c', long = "comp_cc_dir", default_value = "GEOCml10GACOS")]
    comp_cc_dir: PathBuf,

    /// Directory with the unwrapped interferograms
    #[arg(short = 'd', long = "unw_dir", default_value = "GEOCml10GACOS")]
    unw_dir: PathBuf,

    /// Time series directory
    #[arg(short = 't', long = "ts_dir", default_value = "TS_GEOCml10GACOS")]
    ts_dir: PathBuf,

    /// Suffix of the residual directory and output files
    #[arg(long, default_value = "")]
    suffix: String,
}

#[derive(Args, Debug, Clone)]
struct CorrectArgs {
    #[command(flatten)]
    frame: FrameArgs,

    /// Output directory of corrected interferograms
    #[arg(short = 'r', long = "correct_dir", default_value = "GEOCml10GACOS_corrected")]
    correct_dir: PathBuf,

    /// RMS residual (in cycles) for correction and acceptance, overrides the threshold file
    #[arg(short = 's', long = "correction_thresh")]
    correction_thresh: Option<f64>,

    /// Statistic of the threshold file used as target threshold
    #[arg(
        short = 'g',
        long = "target_thresh",
        default_value = "thresh",
        value_parser = ["mode", "median", "mean", "thresh"]
    )]
    target_thresh: String,

    /// Number of parallel workers (default: all cores)
    #[arg(short = 'n', long = "n_para")]
    n_para: Option<usize>,

    /// Give up after this many threshold relaxation steps
    #[arg(long = "max_iter")]
    max_iter: Option<usize>,

    /// Do not write PNG diagnostics
    #[arg(long)]
    no_plot: bool,
}

impl FrameArgs {
    fn layout_params(&self) -> LayoutParams {
        LayoutParams {
            frame_dir: self.frame_dir.clone(),
            comp_cc_dir: self.comp_cc_dir.clone(),
            unw_dir: self.unw_dir.clone(),
            ts_dir: self.ts_dir.clone(),
            suffix: self.suffix.clone(),
            ..LayoutParams::default()
        }
    }
}

fn correct(args: CorrectArgs) -> Result<()> {
    let target: TargetSelection = args.target_thresh.parse()?;
    let mut batch = BatchParams::default();
    if let Some(n) = args.n_para {
        batch.worker_count = n.max(1);
    }

    let config = PipelineConfig {
        layout: LayoutParams {
            correct_dir: args.correct_dir.clone(),
            ..args.frame.layout_params()
        },
        correction_thresh: args.correction_thresh,
        target,
        batch,
        relaxation: RelaxationParams {
            max_iterations: args.max_iter,
            ..RelaxationParams::default()
        },
        no_plot: args.no_plot,
    };

    let outcome = CorrectionPipeline::new(config)
        .run()
        .context("Unwrapping correction failed")?;

    log::info!(
        "Final thresholds {:.2}/{:.2}: {} good, {} mode-corrected, {} integer-corrected, {} bad, {} strong links",
        outcome.thresholds.correction,
        outcome.thresholds.target,
        outcome.categories.good.len(),
        outcome.categories.mode_corrected.len(),
        outcome.categories.integer_corrected.len(),
        outcome.categories.bad.len(),
        outcome.strong_links.len()
    );
    Ok(())
}

fn estimate_threshold(args: FrameArgs) -> Result<()> {
    let layout = FrameLayout::new(&args.layout_params());
    let geometry = ImageGeometry::from_par_file(layout.geometry_file())
        .with_context(|| format!("Cannot read {}", layout.geometry_file().display()))?;
    let stats = ThresholdEstimator::from_geometry(&geometry)
        .run(&layout)
        .context("Residual threshold estimation failed")?;
    log::info!(
        "RMS_thresh = {:.2}, written to {}",
        stats.thresh,
        layout.threshold_file().display()
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let start = Instant::now();
    log::info!("{} ver{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Correct(args) => correct(args)?,
        Command::EstimateThreshold(args) => estimate_threshold(args)?,
    }

    log::info!("Elapsed time: {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}
