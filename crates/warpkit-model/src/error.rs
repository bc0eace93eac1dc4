//! Error types for model construction.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    /// Invalid model or loss configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Image or grid shape unusable by the network.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// The method needs a backbone the model was not built with.
    #[error("Method {method} requires the {backbone} backbone")]
    MissingBackbone {
        method: &'static str,
        backbone: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, ModelError>;

impl ModelError {
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn invalid_shape(msg: impl Into<String>) -> Self {
        Self::InvalidShape(msg.into())
    }
}
