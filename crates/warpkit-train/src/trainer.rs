//! The epoch loop.

use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use std::path::PathBuf;
use std::sync::Arc;
use warpkit_core::reference_grid;
use warpkit_io::get_train_test_dataset;
use warpkit_model::{build_model, RegistrationModel};

use crate::checkpoint::{checkpoint_epoch, CheckpointManager};
use crate::config::TrainingConfig;
use crate::error::{Result, TrainError};
use crate::metrics::{test_summary_names, train_summary_names, Metrics};
use crate::optimizer::build_optimizer_at;
use crate::progress::{EpochSummary, ProgressCallback, ProgressTracker};
use crate::run_dir::RunDirs;
use crate::steps::{eval_step, train_step};
use crate::summary::SummaryWriter;

/// What a finished run left behind.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub run_dir: PathBuf,
    pub epochs_run: usize,
    pub iterations: usize,
    pub checkpoints: Vec<PathBuf>,
    pub last_epoch: Option<EpochSummary>,
}

pub struct Trainer {
    config: TrainingConfig,
    run_dirs: RunDirs,
    restore: Option<PathBuf>,
    progress: ProgressTracker,
}

impl Trainer {
    pub fn new(config: TrainingConfig, run_dirs: RunDirs) -> Self {
        Self {
            config,
            run_dirs,
            restore: None,
            progress: ProgressTracker::new(),
        }
    }

    /// Start from the weights in a checkpoint file.
    pub fn with_restore(mut self, path: Option<PathBuf>) -> Self {
        self.restore = path;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress.add_callback(callback);
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn run_dirs(&self) -> &RunDirs {
        &self.run_dirs
    }

    /// Train on backend `B`, evaluating on its inner backend.
    pub fn run<B: AutodiffBackend>(&self, device: &B::Device) -> Result<TrainingReport> {
        let result = self.run_epochs::<B>(device);
        if let Err(err) = &result {
            self.progress.error(&err.to_string());
        }
        result
    }

    fn run_epochs<B: AutodiffBackend>(&self, device: &B::Device) -> Result<TrainingReport> {
        let config = &self.config;
        config.validate()?;
        tracing::info!("Backend: {:?}", config.device.backend);
        self.run_dirs.create(config)?;

        let (dataset_train, dataset_test) =
            get_train_test_dataset::<B, B::InnerBackend>(&config.data, device)
                .map_err(TrainError::data)?;
        let moving_image_size = dataset_train.moving_image_shape();
        let fixed_image_size = dataset_train.fixed_image_shape();
        tracing::info!(
            "Loaded {} training and {} test pairs",
            dataset_train.len(),
            dataset_test.len()
        );

        let mut model = build_model::<B>(
            moving_image_size,
            fixed_image_size,
            config.data_loader.batch_size,
            &config.model,
            &config.loss,
            device,
        )?;

        let mut start_epoch = 0;
        if let Some(path) = &self.restore {
            model = CheckpointManager::restore(model, path, device)?;
            if let Some(epoch) = checkpoint_epoch(path) {
                start_epoch = epoch + 1;
            }
            tracing::info!("Restored weights from {}", path.display());
        }

        let resumed_iterations = start_epoch * dataset_train.num_batches(true, &config.data_loader);
        let mut optimizer =
            build_optimizer_at::<B, RegistrationModel<B>>(&config.optimizer, resumed_iterations);
        let checkpoints = CheckpointManager::new(self.run_dirs.checkpoint_dir(), config.save_period);

        let grid_train = reference_grid::<B>(fixed_image_size, device);
        let grid_test = reference_grid::<B::InnerBackend>(fixed_image_size, device);

        let mut writer_train = SummaryWriter::create(self.run_dirs.summary_train())?;
        let mut writer_test = SummaryWriter::create(self.run_dirs.summary_test())?;
        let mut metrics_train = Metrics::new(train_summary_names());
        let mut metrics_test = Metrics::new(test_summary_names());

        let mut saved = Vec::new();
        let mut last_epoch = None;
        let mut epochs_run = 0;
        self.progress.start(config.epochs);

        for epoch in start_epoch..config.epochs {
            tracing::info!("Start of epoch {}", epoch);

            for batch in dataset_train.batches(true, &config.data_loader, epoch, device) {
                let batch = batch.map_err(TrainError::data)?;
                let (updated, values) = train_step(
                    model,
                    optimizer.as_mut(),
                    batch,
                    grid_train.clone(),
                    &config.loss,
                )?;
                model = updated;
                metrics_train.update(&values);
                metrics_train.update_summary(&mut writer_train, optimizer.iterations())?;
            }
            tracing::info!("Training loss at epoch {}: {}", epoch, metrics_train);

            let model_valid = model.valid();
            let mut last_step = None;
            for (step, batch) in dataset_test
                .batches(false, &config.data_loader, epoch, device)
                .enumerate()
            {
                let batch = batch.map_err(TrainError::data)?;
                let values = eval_step(&model_valid, batch, grid_test.clone(), &config.loss)?;
                metrics_test.update(&values);
                last_step = Some(step);
            }
            metrics_test.update_summary(&mut writer_test, optimizer.iterations())?;
            if let Some(step) = last_step {
                tracing::info!("Test loss at step {}: {}", step, metrics_test);
            }

            if checkpoints.should_save(epoch) {
                tracing::info!("Save checkpoint at epoch {}", epoch);
                saved.push(checkpoints.save(&model, epoch)?);
            }

            epochs_run += 1;
            let mut summary = EpochSummary::new(
                epoch,
                config.epochs,
                optimizer.iterations(),
                metrics_train.values(),
                metrics_test.values(),
                self.progress.elapsed(),
            );
            summary.calculate_remaining(epochs_run);
            self.progress.epoch(&summary);
            last_epoch = Some(summary);

            metrics_train.reset();
            metrics_test.reset();

            if self.progress.should_stop() {
                tracing::info!("Stopping after epoch {}", epoch);
                break;
            }
        }

        self.progress.complete(last_epoch.as_ref());

        Ok(TrainingReport {
            run_dir: self.run_dirs.root().to_path_buf(),
            epochs_run,
            iterations: optimizer.iterations(),
            checkpoints: saved,
            last_epoch,
        })
    }
}
