//! Registration losses and their configuration.

pub mod image;
pub mod label;
pub mod regularization;

use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{self, ModelError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageLoss {
    Lncc,
    Ssd,
    Gncc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelLoss {
    Dice,
    CrossEntropy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Regularization {
    GradientL2,
    GradientL1,
    Bending,
}

#[derive(Config, Debug)]
pub struct ImageLossConfig {
    #[config(default = "ImageLoss::Lncc")]
    pub name: ImageLoss,
    #[config(default = 1.0)]
    pub weight: f64,
    /// Window edge length for `lncc`, odd.
    #[config(default = 9)]
    pub window: usize,
}

#[derive(Config, Debug)]
pub struct LabelLossConfig {
    #[config(default = "LabelLoss::Dice")]
    pub name: LabelLoss,
    #[config(default = 1.0)]
    pub weight: f64,
}

#[derive(Config, Debug)]
pub struct SimilarityConfig {
    #[config(default = "ImageLossConfig::new()")]
    pub image: ImageLossConfig,
    #[config(default = "LabelLossConfig::new()")]
    pub label: LabelLossConfig,
}

#[derive(Config, Debug)]
pub struct RegularizationConfig {
    #[config(default = "Regularization::GradientL2")]
    pub energy_type: Regularization,
    #[config(default = 0.5)]
    pub weight: f64,
}

#[derive(Config, Debug)]
pub struct LossConfig {
    #[config(default = "SimilarityConfig::new()")]
    pub similarity: SimilarityConfig,
    #[config(default = "RegularizationConfig::new()")]
    pub regularization: RegularizationConfig,
}

impl LossConfig {
    pub fn validate(&self) -> error::Result<()> {
        let weights = [
            ("image similarity", self.similarity.image.weight),
            ("label similarity", self.similarity.label.weight),
            ("regularization", self.regularization.weight),
        ];
        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ModelError::invalid_configuration(format!(
                    "{name} weight must be finite and non-negative, got {weight}"
                )));
            }
        }
        let window = self.similarity.image.window;
        if self.similarity.image.name == ImageLoss::Lncc && window % 2 == 0 {
            return Err(ModelError::invalid_configuration(format!(
                "lncc window must be odd, got {window}"
            )));
        }
        Ok(())
    }
}

/// Weighted loss terms of one forward pass, each of shape `[1]`.
#[derive(Debug, Clone)]
pub struct LossTerms<B: Backend> {
    pub similarity: Tensor<B, 1>,
    pub regularization: Tensor<B, 1>,
    /// Present when both labels were available.
    pub label: Option<Tensor<B, 1>>,
    pub total: Tensor<B, 1>,
}

pub fn image_loss<B: Backend>(
    config: &ImageLossConfig,
    y_true: Tensor<B, 5>,
    y_pred: Tensor<B, 5>,
) -> Tensor<B, 1> {
    match config.name {
        ImageLoss::Lncc => image::local_ncc(y_true, y_pred, config.window),
        ImageLoss::Ssd => image::ssd(y_true, y_pred),
        ImageLoss::Gncc => image::global_ncc(y_true, y_pred),
    }
}

pub fn label_loss<B: Backend>(
    config: &LabelLossConfig,
    y_true: Tensor<B, 5>,
    y_pred: Tensor<B, 5>,
) -> Tensor<B, 1> {
    match config.name {
        LabelLoss::Dice => label::dice_loss(y_true, y_pred),
        LabelLoss::CrossEntropy => label::cross_entropy(y_true, y_pred),
    }
}

pub fn regularization_loss<B: Backend>(config: &RegularizationConfig, ddf: Tensor<B, 5>) -> Tensor<B, 1> {
    match config.energy_type {
        Regularization::GradientL2 => regularization::gradient_l2(ddf),
        Regularization::GradientL1 => regularization::gradient_l1(ddf),
        Regularization::Bending => regularization::bending_energy(ddf),
    }
}

/// Combine the configured terms. A zero weight skips computing its term.
pub fn registration_loss<B: Backend>(
    config: &LossConfig,
    fixed_image: Tensor<B, 5>,
    pred_fixed_image: Tensor<B, 5>,
    fixed_label: Option<Tensor<B, 5>>,
    pred_fixed_label: Option<Tensor<B, 5>>,
    ddf: Tensor<B, 5>,
) -> LossTerms<B> {
    let device = fixed_image.device();
    let zero = || Tensor::<B, 1>::zeros([1], &device);

    let image_cfg = &config.similarity.image;
    let similarity = if image_cfg.weight > 0.0 {
        image_loss(image_cfg, fixed_image, pred_fixed_image).mul_scalar(image_cfg.weight)
    } else {
        zero()
    };

    let reg_cfg = &config.regularization;
    let regularization = if reg_cfg.weight > 0.0 {
        regularization_loss(reg_cfg, ddf).mul_scalar(reg_cfg.weight)
    } else {
        zero()
    };

    let label_cfg = &config.similarity.label;
    let label = match (fixed_label, pred_fixed_label) {
        (Some(y_true), Some(y_pred)) if label_cfg.weight > 0.0 => {
            Some(label_loss(label_cfg, y_true, y_pred).mul_scalar(label_cfg.weight))
        }
        (Some(_), Some(_)) => Some(zero()),
        _ => None,
    };

    let mut total = similarity.clone() + regularization.clone();
    if let Some(label) = &label {
        total = total + label.clone();
    }

    LossTerms {
        similarity,
        regularization,
        label,
        total,
    }
}
