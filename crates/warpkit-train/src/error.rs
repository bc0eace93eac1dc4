//! Error types for the training driver.

use thiserror::Error;
use warpkit_model::ModelError;

/// Main error type for training runs.
#[derive(Error, Debug)]
pub enum TrainError {
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Failure reading or batching the dataset.
    #[error("Data error: {0}")]
    Data(String),

    /// Failure building or running the network.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Loss or metric became NaN or infinite.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    /// Failure saving or restoring a checkpoint.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Failure writing summaries or run files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for training operations.
pub type Result<T> = std::result::Result<T, TrainError>;

impl TrainError {
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Wrap a data-layer error, keeping its context chain.
    pub fn data(err: impl std::fmt::Display) -> Self {
        Self::Data(format!("{err:#}"))
    }

    pub fn numerical_instability(msg: impl Into<String>) -> Self {
        Self::NumericalInstability(msg.into())
    }

    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }
}
