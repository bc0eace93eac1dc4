//! Registration networks and the model wrapper the training steps drive.

pub mod global;
pub mod local;

use burn::config::Config;
use burn::module::{Ignored, Module};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{self, ModelError};
use crate::losses::LossConfig;
use crate::warp::{affine_grid, resample, scale_grid, VecInt};
use global::{GlobalNet, GlobalNetConfig};
use local::{LocalNet, LocalNetConfig};

/// What the backbone output means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistrationMethod {
    /// Dense displacement field.
    Ddf,
    /// Stationary velocity field, integrated to a displacement.
    Dvf,
    /// Affine parameters.
    Affine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackboneKind {
    Local,
    Global,
}

impl RegistrationMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ddf => "ddf",
            Self::Dvf => "dvf",
            Self::Affine => "affine",
        }
    }

    /// The backbone this method is built on.
    pub fn backbone(&self) -> BackboneKind {
        match self {
            Self::Ddf | Self::Dvf => BackboneKind::Local,
            Self::Affine => BackboneKind::Global,
        }
    }
}

impl BackboneKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for RegistrationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for BackboneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Config, Debug)]
pub struct ModelConfig {
    #[config(default = "RegistrationMethod::Ddf")]
    pub method: RegistrationMethod,
    #[config(default = "BackboneKind::Local")]
    pub backbone: BackboneKind,
    #[config(default = 8)]
    pub num_channel_initial: usize,
    #[config(default = 3)]
    pub extract_levels: usize,
    /// Scaling-and-squaring steps for `dvf`.
    #[config(default = 7)]
    pub integration_steps: usize,
}

impl ModelConfig {
    pub fn validate(&self) -> error::Result<()> {
        let required = self.method.backbone();
        if self.backbone != required {
            return Err(ModelError::MissingBackbone {
                method: self.method.name(),
                backbone: required.name(),
            });
        }
        if self.num_channel_initial == 0 {
            return Err(ModelError::invalid_configuration(
                "num_channel_initial must be positive",
            ));
        }
        Ok(())
    }
}

/// Everything one forward pass produces.
#[derive(Debug, Clone)]
pub struct RegistrationOutput<B: Backend> {
    /// Displacement in fixed voxel units, `[B, 3, Df, Hf, Wf]`.
    pub ddf: Tensor<B, 5>,
    pub dvf: Option<Tensor<B, 5>>,
    /// Affine parameters `[B, 12]`.
    pub theta: Option<Tensor<B, 2>>,
    /// Moving image warped onto the fixed grid.
    pub pred_fixed_image: Tensor<B, 5>,
    pub pred_fixed_label: Option<Tensor<B, 5>>,
}

#[derive(Module, Debug)]
pub struct RegistrationModel<B: Backend> {
    local: Option<LocalNet<B>>,
    global: Option<GlobalNet<B>>,
    method: Ignored<RegistrationMethod>,
    integration_steps: usize,
    moving_image_size: Ignored<[usize; 3]>,
    fixed_image_size: Ignored<[usize; 3]>,
}

/// Build the network for the given volume shapes.
pub fn build_model<B: Backend>(
    moving_image_size: [usize; 3],
    fixed_image_size: [usize; 3],
    batch_size: usize,
    model_config: &ModelConfig,
    loss_config: &LossConfig,
    device: &B::Device,
) -> error::Result<RegistrationModel<B>> {
    if moving_image_size.contains(&0) || fixed_image_size.contains(&0) {
        return Err(ModelError::invalid_shape(format!(
            "image sizes must be non-empty, got moving {moving_image_size:?} and fixed {fixed_image_size:?}"
        )));
    }
    if batch_size == 0 {
        return Err(ModelError::invalid_configuration("batch_size must be positive"));
    }
    model_config.validate()?;
    loss_config.validate()?;

    let (local, global) = match model_config.backbone {
        BackboneKind::Local => (
            Some(
                LocalNetConfig::new()
                    .with_num_channel_initial(model_config.num_channel_initial)
                    .with_extract_levels(model_config.extract_levels)
                    .init(device),
            ),
            None,
        ),
        BackboneKind::Global => (
            None,
            Some(
                GlobalNetConfig::new()
                    .with_num_channel_initial(model_config.num_channel_initial)
                    .with_extract_levels(model_config.extract_levels)
                    .init(device),
            ),
        ),
    };

    let model = RegistrationModel {
        local,
        global,
        method: Ignored(model_config.method),
        integration_steps: model_config.integration_steps,
        moving_image_size: Ignored(moving_image_size),
        fixed_image_size: Ignored(fixed_image_size),
    };

    tracing::info!(
        "Built {} model on {} backbone: moving {:?}, fixed {:?}, {} parameters",
        model_config.method,
        model_config.backbone,
        moving_image_size,
        fixed_image_size,
        model.num_params()
    );

    Ok(model)
}

impl<B: Backend> RegistrationModel<B> {
    pub fn method(&self) -> RegistrationMethod {
        *self.method
    }

    pub fn moving_image_size(&self) -> [usize; 3] {
        *self.moving_image_size
    }

    pub fn fixed_image_size(&self) -> [usize; 3] {
        *self.fixed_image_size
    }

    /// Register a batch of moving images to fixed images.
    ///
    /// `fixed_grid_ref` is the `[1, 3, Df, Hf, Wf]` identity grid of the fixed volume.
    pub fn forward(
        &self,
        moving_image: Tensor<B, 5>,
        fixed_image: Tensor<B, 5>,
        moving_label: Option<Tensor<B, 5>>,
        fixed_grid_ref: Tensor<B, 5>,
    ) -> error::Result<RegistrationOutput<B>> {
        let [_, _, md, mh, mw] = moving_image.dims();
        let [_, _, fd, fh, fw] = fixed_image.dims();
        if [md, mh, mw] != *self.moving_image_size || [fd, fh, fw] != *self.fixed_image_size {
            return Err(ModelError::invalid_shape(format!(
                "model built for moving {:?} / fixed {:?}, got {:?} / {:?}",
                *self.moving_image_size,
                *self.fixed_image_size,
                [md, mh, mw],
                [fd, fh, fw]
            )));
        }

        let fixed_size = *self.fixed_image_size;
        let moving_size = *self.moving_image_size;

        // Bring the moving image onto the fixed grid so both inputs share a shape.
        let moving_grid = scale_grid(fixed_grid_ref.clone(), fixed_size, moving_size);
        let moving_on_fixed = resample(moving_image.clone(), moving_grid);
        let inputs = Tensor::cat(vec![moving_on_fixed, fixed_image], 1);

        let (ddf, dvf, theta) = match *self.method {
            RegistrationMethod::Ddf => (self.local_net()?.forward(inputs), None, None),
            RegistrationMethod::Dvf => {
                let dvf = self.local_net()?.forward(inputs);
                let ddf = VecInt::new(self.integration_steps).forward(dvf.clone(), fixed_grid_ref.clone());
                (ddf, Some(dvf), None)
            }
            RegistrationMethod::Affine => {
                let theta = self.global_net()?.forward(inputs);
                let ddf = affine_grid(theta.clone(), fixed_grid_ref.clone());
                (ddf, None, Some(theta))
            }
        };

        let warped_grid = scale_grid(fixed_grid_ref + ddf.clone(), fixed_size, moving_size);
        let pred_fixed_image = resample(moving_image, warped_grid.clone());
        let pred_fixed_label = moving_label.map(|label| resample(label, warped_grid));

        Ok(RegistrationOutput {
            ddf,
            dvf,
            theta,
            pred_fixed_image,
            pred_fixed_label,
        })
    }

    fn local_net(&self) -> error::Result<&LocalNet<B>> {
        self.local.as_ref().ok_or(ModelError::MissingBackbone {
            method: self.method.name(),
            backbone: BackboneKind::Local.name(),
        })
    }

    fn global_net(&self) -> error::Result<&GlobalNet<B>> {
        self.global.as_ref().ok_or(ModelError::MissingBackbone {
            method: self.method.name(),
            backbone: BackboneKind::Global.name(),
        })
    }
}
