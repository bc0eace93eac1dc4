//! Label overlap losses on soft masks in `[0, 1]`.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

const EPSILON: f32 = 1e-6;

/// `1 - soft Dice`, averaged over the batch.
pub fn dice_loss<B: Backend>(y_true: Tensor<B, 5>, y_pred: Tensor<B, 5>) -> Tensor<B, 1> {
    let batch = y_true.dims()[0] as i32;
    let t = y_true.reshape([batch, -1]);
    let p = y_pred.reshape([batch, -1]);

    let intersection = (t.clone() * p.clone()).sum_dim(1).mul_scalar(2.0);
    let union = t.sum_dim(1) + p.sum_dim(1);
    let dice = intersection.add_scalar(EPSILON) / union.add_scalar(EPSILON);

    dice.mean().neg().add_scalar(1.0)
}

/// Binary cross-entropy with the prediction clamped away from 0 and 1.
pub fn cross_entropy<B: Backend>(y_true: Tensor<B, 5>, y_pred: Tensor<B, 5>) -> Tensor<B, 1> {
    let p = y_pred.clamp(EPSILON, 1.0 - EPSILON);
    let positive = y_true.clone() * p.clone().log();
    let negative = y_true.neg().add_scalar(1.0) * p.neg().add_scalar(1.0).log();
    (positive + negative).mean().neg()
}
