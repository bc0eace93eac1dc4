//! Training configuration.
//!
//! Every section derives `burn::config::Config`, so a run is fully described
//! by one JSON file. `configs/default.json` ships with the crate.

use burn::config::Config;
use serde::{Deserialize, Serialize};
use std::path::Path;
use warpkit_io::{DataConfig, DataLoaderConfig};
use warpkit_model::{LossConfig, ModelConfig};

use crate::error::{self, TrainError};
use crate::optimizer::OptimizerConfig;

const DEFAULT_CONFIG: &str = include_str!("../configs/default.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Ndarray,
    Wgpu,
}

#[derive(Config, Debug)]
pub struct DeviceConfig {
    #[config(default = "BackendKind::Ndarray")]
    pub backend: BackendKind,
    /// Let the GPU allocator grow on demand instead of reserving memory up front.
    #[config(default = true)]
    pub allow_growth: bool,
}

impl DeviceConfig {
    /// Growth flag for the GPU runtime, `None` when the backend has no GPU allocator.
    pub fn gpu_memory_growth(&self) -> Option<bool> {
        (self.backend == BackendKind::Wgpu).then_some(self.allow_growth)
    }
}

#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub data: DataConfig,
    #[config(default = "DataLoaderConfig::new()")]
    pub data_loader: DataLoaderConfig,
    #[config(default = "OptimizerConfig::new()")]
    pub optimizer: OptimizerConfig,
    #[config(default = "ModelConfig::new()")]
    pub model: ModelConfig,
    #[config(default = "LossConfig::new()")]
    pub loss: LossConfig,
    #[config(default = 10)]
    pub epochs: usize,
    /// Save a checkpoint every this many epochs.
    #[config(default = 1)]
    pub save_period: usize,
    #[config(default = "String::from(\"logs\")")]
    pub log_dir: String,
    #[config(default = "DeviceConfig::new()")]
    pub device: DeviceConfig,
}

impl TrainingConfig {
    /// The configuration bundled with the crate.
    pub fn load_default() -> error::Result<Self> {
        Self::load_binary(DEFAULT_CONFIG.as_bytes()).map_err(|e| {
            TrainError::invalid_configuration(format!("bundled default config: {e}"))
        })
    }

    /// Read a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> error::Result<Self> {
        let path = path.as_ref();
        Self::load(path).map_err(|e| {
            TrainError::invalid_configuration(format!("{}: {e}", path.display()))
        })
    }

    /// Check every section for values the driver cannot run with.
    pub fn validate(&self) -> error::Result<()> {
        if self.epochs == 0 {
            return Err(TrainError::invalid_configuration("epochs must be positive"));
        }
        if self.save_period == 0 {
            return Err(TrainError::invalid_configuration("save_period must be positive"));
        }
        if self.data_loader.batch_size == 0 {
            return Err(TrainError::invalid_configuration("batch_size must be positive"));
        }
        if self.data.dir.trim().is_empty() {
            return Err(TrainError::invalid_configuration("data.dir must not be empty"));
        }
        if self.log_dir.trim_end_matches('/').is_empty() {
            return Err(TrainError::invalid_configuration("log_dir must not be empty"));
        }

        let lr = self.optimizer.learning_rate;
        if !lr.is_finite() || lr <= 0.0 {
            return Err(TrainError::invalid_configuration(format!(
                "learning_rate must be positive and finite, got {lr}"
            )));
        }
        if self.optimizer.momentum < 0.0 {
            return Err(TrainError::invalid_configuration("momentum must be non-negative"));
        }
        self.optimizer
            .schedule
            .validate()
            .map_err(TrainError::invalid_configuration)?;

        self.model.validate()?;
        self.loss.validate()?;
        Ok(())
    }
}
