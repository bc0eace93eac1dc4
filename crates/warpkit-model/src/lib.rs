//! Registration networks, warping layers, losses and label metrics.

pub mod error;
pub mod losses;
pub mod metric;
pub mod network;
pub mod warp;

pub use error::{ModelError, Result};
pub use losses::{registration_loss, LossConfig, LossTerms};
pub use metric::{binary_dice, centroid_distance};
pub use network::{
    build_model, BackboneKind, ModelConfig, RegistrationMethod, RegistrationModel,
    RegistrationOutput,
};
