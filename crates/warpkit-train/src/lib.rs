//! Training driver for learned image registration.
//!
//! Wires the paired dataset, the registration network, an optimizer and the
//! metric / summary / checkpoint bookkeeping into an epoch loop.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod metrics;
pub mod optimizer;
pub mod progress;
pub mod run_dir;
pub mod steps;
pub mod summary;
pub mod trainer;
pub mod validation;

pub use checkpoint::{checkpoint_path, CheckpointManager};
pub use config::{BackendKind, DeviceConfig, TrainingConfig};
pub use error::{Result, TrainError};
pub use metrics::{MetricValues, Metrics};
pub use optimizer::{build_optimizer, build_optimizer_at, LearningRateSchedule, Optimizer, OptimizerConfig, OptimizerKind};
pub use progress::{
    ConsoleProgressCallback, EarlyStoppingCallback, EpochSummary, HistoryCallback, ProgressCallback,
    ProgressTracker,
};
pub use run_dir::RunDirs;
pub use steps::{eval_step, train_step};
pub use summary::SummaryWriter;
pub use trainer::{Trainer, TrainingReport};
