use anyhow::{Context, Result};
use burn::backend::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use warpkit_train::{BackendKind, ConsoleProgressCallback, RunDirs, Trainer, TrainingConfig};

#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Train a learned image registration network")]
struct Cli {
    /// JSON configuration; the bundled default is used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log directory
    #[arg(long)]
    log_dir: Option<String>,

    /// Override the configured number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Checkpoint to restore weights from
    #[arg(long)]
    restore: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => TrainingConfig::from_file(path)?,
        None => TrainingConfig::load_default()?,
    };
    if let Some(log_dir) = cli.log_dir {
        config.log_dir = log_dir;
    }
    if let Some(epochs) = cli.epochs {
        config.epochs = epochs;
    }
    config.validate().context("Invalid training configuration")?;

    let run_dirs = RunDirs::new(&config.log_dir, chrono::Local::now());
    let backend = config.device.backend;
    let allow_growth = config.device.gpu_memory_growth().unwrap_or(true);
    let trainer = Trainer::new(config, run_dirs)
        .with_restore(cli.restore)
        .with_callback(Arc::new(ConsoleProgressCallback::default()));

    let report = match backend {
        BackendKind::Ndarray => trainer.run::<Autodiff<NdArray<f32>>>(&NdArrayDevice::Cpu)?,
        BackendKind::Wgpu => run_wgpu(&trainer, allow_growth)?,
    };

    tracing::info!(
        "Finished {} epochs ({} iterations); output in {}",
        report.epochs_run,
        report.iterations,
        report.run_dir.display()
    );
    Ok(())
}

/// Growing sub-slice pools when `allow_growth`, one exclusive page per allocation otherwise.
#[cfg(feature = "wgpu")]
fn run_wgpu(trainer: &Trainer, allow_growth: bool) -> Result<warpkit_train::TrainingReport> {
    use burn::backend::wgpu::{
        init_setup, AutoGraphicsApi, MemoryConfiguration, RuntimeOptions, Wgpu, WgpuDevice,
    };

    let device = WgpuDevice::default();
    let memory_config = if allow_growth {
        MemoryConfiguration::SubSlices
    } else {
        MemoryConfiguration::ExclusivePages
    };
    init_setup::<AutoGraphicsApi>(
        &device,
        RuntimeOptions {
            memory_config,
            ..Default::default()
        },
    );
    Ok(trainer.run::<Autodiff<Wgpu>>(&device)?)
}

#[cfg(not(feature = "wgpu"))]
fn run_wgpu(_trainer: &Trainer, _allow_growth: bool) -> Result<warpkit_train::TrainingReport> {
    anyhow::bail!("The wgpu backend needs the `wgpu` feature; rebuild with `--features wgpu`")
}
