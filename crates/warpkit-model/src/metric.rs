//! Label agreement metrics, evaluated without gradients.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use warpkit_core::reference_grid;

const THRESHOLD: f32 = 0.5;

fn host_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f64> {
    tensor
        .into_data()
        .iter::<f64>()
        .collect()
}

/// Dice overlap of masks thresholded at 0.5, averaged over the batch.
///
/// Two empty masks count as a perfect match.
pub fn binary_dice<B: Backend>(y_true: Tensor<B, 5>, y_pred: Tensor<B, 5>) -> f64 {
    let batch = y_true.dims()[0];
    let t = y_true.greater_equal_elem(THRESHOLD).float().reshape([batch as i32, -1]);
    let p = y_pred.greater_equal_elem(THRESHOLD).float().reshape([batch as i32, -1]);

    let intersection = host_values((t.clone() * p.clone()).sum_dim(1));
    let true_sum = host_values(t.sum_dim(1));
    let pred_sum = host_values(p.sum_dim(1));

    let total: f64 = (0..batch)
        .map(|i| {
            let union = true_sum[i] + pred_sum[i];
            if union == 0.0 {
                1.0
            } else {
                2.0 * intersection[i] / union
            }
        })
        .sum();
    total / batch.max(1) as f64
}

/// Euclidean voxel distance between mask centroids, averaged over the batch.
///
/// A batch element where either mask is empty contributes 0.
pub fn centroid_distance<B: Backend>(y_true: Tensor<B, 5>, y_pred: Tensor<B, 5>) -> f64 {
    let [batch, _, d, h, w] = y_true.dims();
    let grid = reference_grid::<B>([d, h, w], &y_true.device()).reshape([1, 3, d * h * w]);

    let centroids = |mask: Tensor<B, 5>| {
        let mask = mask.greater_equal_elem(THRESHOLD).float().reshape([batch, 1, d * h * w]);
        let mass = host_values(mask.clone().sum_dim(2));
        let moments = host_values((mask * grid.clone()).sum_dim(2));
        (mass, moments)
    };
    let (true_mass, true_moments) = centroids(y_true);
    let (pred_mass, pred_moments) = centroids(y_pred);

    let total: f64 = (0..batch)
        .map(|i| {
            if true_mass[i] == 0.0 || pred_mass[i] == 0.0 {
                return 0.0;
            }
            (0..3)
                .map(|k| {
                    let a = true_moments[3 * i + k] / true_mass[i];
                    let b = pred_moments[3 * i + k] / pred_mass[i];
                    (a - b).powi(2)
                })
                .sum::<f64>()
                .sqrt()
        })
        .sum();
    total / batch.max(1) as f64
}
