//! One optimisation step and one evaluation step on a batch.

use burn::optim::GradientsParams;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use warpkit_io::PairedBatch;
use warpkit_model::{
    binary_dice, centroid_distance, registration_loss, LossConfig, LossTerms, RegistrationModel,
    RegistrationOutput,
};

use crate::error::Result;
use crate::metrics::{
    MetricValues, LOSS_LABEL, LOSS_REG, LOSS_SIM, LOSS_TOTAL, METRIC_DICE, METRIC_DIST, OPT_LR,
};
use crate::optimizer::Optimizer;
use crate::validation::{check_step_values, validate_batch};

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}

/// Loss terms and label metrics of one forward pass.
fn step_values<B: Backend>(
    terms: &LossTerms<B>,
    fixed_label: Option<Tensor<B, 5>>,
    output: &RegistrationOutput<B>,
) -> MetricValues {
    let mut values = vec![
        (LOSS_SIM, scalar(terms.similarity.clone())),
        (LOSS_REG, scalar(terms.regularization.clone())),
    ];
    if let Some(label) = &terms.label {
        values.push((LOSS_LABEL, scalar(label.clone())));
    }
    values.push((LOSS_TOTAL, scalar(terms.total.clone())));

    if let (Some(y_true), Some(y_pred)) = (fixed_label, output.pred_fixed_label.clone()) {
        values.push((METRIC_DICE, binary_dice(y_true.clone(), y_pred.clone())));
        values.push((METRIC_DIST, centroid_distance(y_true, y_pred)));
    }
    values
}

fn forward_loss<B: Backend>(
    model: &RegistrationModel<B>,
    batch: PairedBatch<B>,
    fixed_grid_ref: Tensor<B, 5>,
    loss_config: &LossConfig,
) -> Result<(LossTerms<B>, MetricValues)> {
    validate_batch(&batch, model.moving_image_size(), model.fixed_image_size())?;
    let PairedBatch {
        inputs, fixed_label, ..
    } = batch;

    let output = model.forward(
        inputs.moving_image,
        inputs.fixed_image.clone(),
        inputs.moving_label,
        fixed_grid_ref,
    )?;
    let terms = registration_loss(
        loss_config,
        inputs.fixed_image,
        output.pred_fixed_image.clone(),
        fixed_label.clone(),
        output.pred_fixed_label.clone(),
        output.ddf.clone(),
    );
    let values = step_values(&terms, fixed_label, &output);
    Ok((terms, values))
}

/// Forward, backward and one optimizer update.
///
/// Returns the updated model and the step's values, including the learning
/// rate the update used.
pub fn train_step<B: AutodiffBackend>(
    model: RegistrationModel<B>,
    optimizer: &mut dyn Optimizer<RegistrationModel<B>, B>,
    batch: PairedBatch<B>,
    fixed_grid_ref: Tensor<B, 5>,
    loss_config: &LossConfig,
) -> Result<(RegistrationModel<B>, MetricValues)> {
    let (terms, mut values) = forward_loss(&model, batch, fixed_grid_ref, loss_config)?;
    check_step_values(&values, "training")?;

    values.push((OPT_LR, optimizer.learning_rate()));
    let grads = GradientsParams::from_grads(terms.total.backward(), &model);
    let model = optimizer.step(model, grads);
    Ok((model, values))
}

/// Forward pass without gradients.
pub fn eval_step<B: Backend>(
    model: &RegistrationModel<B>,
    batch: PairedBatch<B>,
    fixed_grid_ref: Tensor<B, 5>,
    loss_config: &LossConfig,
) -> Result<MetricValues> {
    let (_, values) = forward_loss(model, batch, fixed_grid_ref, loss_config)?;
    check_step_values(&values, "evaluation")?;
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrainError;
    use crate::optimizer::{build_optimizer, OptimizerConfig};
    use burn::backend::Autodiff;
    use burn::module::AutodiffModule;
    use burn_ndarray::NdArray;
    use warpkit_core::reference_grid;
    use warpkit_io::BatchInputs;
    use warpkit_model::{build_model, ModelConfig, RegistrationMethod};

    type Inner = NdArray<f32>;
    type B = Autodiff<Inner>;

    const SIZE: [usize; 3] = [4, 4, 4];

    fn model_config() -> ModelConfig {
        ModelConfig::new()
            .with_method(RegistrationMethod::Ddf)
            .with_num_channel_initial(2)
            .with_extract_levels(1)
    }

    fn labeled_batch<BB: Backend>(device: &BB::Device) -> PairedBatch<BB> {
        let [d, h, w] = SIZE;
        let label = Tensor::<BB, 5>::zeros([1, 1, d, h, w], device).slice_assign(
            [0..1, 0..1, 1..3, 1..3, 1..3],
            Tensor::ones([1, 1, 2, 2, 2], device),
        );
        PairedBatch {
            inputs: BatchInputs {
                moving_image: label.clone().mul_scalar(0.8),
                fixed_image: label.clone().mul_scalar(0.9),
                moving_label: Some(label.clone()),
            },
            fixed_label: Some(label),
            indices: vec![0],
        }
    }

    #[test]
    fn test_train_step_updates_and_reports() {
        let device = Default::default();
        let loss_config = LossConfig::new();
        let model =
            build_model::<B>(SIZE, SIZE, 1, &model_config(), &loss_config, &device).unwrap();
        let mut optimizer =
            build_optimizer::<B, RegistrationModel<B>>(&OptimizerConfig::new().with_learning_rate(0.01));

        let grid = reference_grid::<B>(SIZE, &device);
        let (model, values) = train_step(
            model,
            optimizer.as_mut(),
            labeled_batch(&device),
            grid,
            &loss_config,
        )
        .unwrap();

        assert_eq!(optimizer.iterations(), 1);
        let keys: Vec<_> = values.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec![LOSS_SIM, LOSS_REG, LOSS_LABEL, LOSS_TOTAL, METRIC_DICE, METRIC_DIST, OPT_LR]
        );
        assert!(values.iter().all(|(_, v)| v.is_finite()));
        assert_eq!(values.last(), Some(&(OPT_LR, 0.01)));

        // the updated model still evaluates on the inner backend
        let grid = reference_grid::<Inner>(SIZE, &device);
        let values = eval_step(&model.valid(), labeled_batch(&device), grid, &loss_config).unwrap();
        assert!(!values.iter().any(|(k, _)| *k == OPT_LR));
    }

    #[test]
    fn test_eval_step_without_labels() {
        let device = Default::default();
        let loss_config = LossConfig::new();
        let model =
            build_model::<Inner>(SIZE, SIZE, 1, &model_config(), &loss_config, &device).unwrap();

        let mut batch = labeled_batch::<Inner>(&device);
        batch.inputs.moving_label = None;
        batch.fixed_label = None;

        let values = eval_step(&model, batch, reference_grid::<Inner>(SIZE, &device), &loss_config).unwrap();
        let keys: Vec<_> = values.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![LOSS_SIM, LOSS_REG, LOSS_TOTAL]);
    }

    #[test]
    fn test_eval_step_rejects_wrong_batch_shape() {
        let device = Default::default();
        let loss_config = LossConfig::new();
        let model =
            build_model::<Inner>([5, 4, 4], SIZE, 1, &model_config(), &loss_config, &device).unwrap();

        let err = eval_step(
            &model,
            labeled_batch::<Inner>(&device),
            reference_grid::<Inner>(SIZE, &device),
            &loss_config,
        )
        .unwrap_err();
        assert!(matches!(err, TrainError::Data(_)));
    }
}
