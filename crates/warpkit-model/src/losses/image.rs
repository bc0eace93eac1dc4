//! Image similarity losses. Each returns a quantity to minimise.

use burn::tensor::backend::Backend;
use burn::tensor::module::conv3d;
use burn::tensor::ops::ConvOptions;
use burn::tensor::Tensor;

const EPSILON: f32 = 1e-5;

/// Local normalised cross-correlation over a cubic window, negated.
///
/// Window means are computed by convolving with a `1/N` kernel, zero-padded
/// by `window / 2`. An odd window keeps the input's spatial size.
pub fn local_ncc<B: Backend>(y_true: Tensor<B, 5>, y_pred: Tensor<B, 5>, window: usize) -> Tensor<B, 1> {
    let window = window.max(1);
    let padding = window / 2;
    let device = y_true.device();

    let n = (window * window * window) as f32;
    let kernel = Tensor::<B, 5>::ones([1, 1, window, window, window], &device).div_scalar(n);
    let options = ConvOptions::new([1, 1, 1], [padding, padding, padding], [1, 1, 1], 1);
    let window_mean = |x: Tensor<B, 5>| conv3d(x, kernel.clone(), None, options.clone());

    let ii = y_true.clone() * y_true.clone();
    let jj = y_pred.clone() * y_pred.clone();
    let ij = y_true.clone() * y_pred.clone();

    let i_mean = window_mean(y_true);
    let j_mean = window_mean(y_pred);
    let i2_mean = window_mean(ii);
    let j2_mean = window_mean(jj);
    let ij_mean = window_mean(ij);

    let cross = ij_mean - i_mean.clone() * j_mean.clone();
    let i_var = i2_mean - i_mean.powf_scalar(2.0);
    let j_var = j2_mean - j_mean.powf_scalar(2.0);

    let cc = cross.clone() * cross / (i_var * j_var + EPSILON);
    cc.mean().neg()
}

/// Mean squared difference.
pub fn ssd<B: Backend>(y_true: Tensor<B, 5>, y_pred: Tensor<B, 5>) -> Tensor<B, 1> {
    (y_true - y_pred).powf_scalar(2.0).mean()
}

/// Normalised cross-correlation over each whole volume, averaged over the batch, negated.
pub fn global_ncc<B: Backend>(y_true: Tensor<B, 5>, y_pred: Tensor<B, 5>) -> Tensor<B, 1> {
    let batch = y_true.dims()[0];
    let i = y_true.reshape([batch as i32, -1]);
    let j = y_pred.reshape([batch as i32, -1]);

    let i_hat = i.clone() - i.mean_dim(1);
    let j_hat = j.clone() - j.mean_dim(1);

    let num = (i_hat.clone() * j_hat.clone()).mean_dim(1);
    let den = (i_hat.powf_scalar(2.0).mean_dim(1) * j_hat.powf_scalar(2.0).mean_dim(1))
        .add_scalar(EPSILON)
        .sqrt();

    num.div(den).mean().neg()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn random(shape: [usize; 5]) -> Tensor<B, 5> {
        Tensor::random(shape, Distribution::Default, &Default::default())
    }

    #[test]
    fn test_ssd_zero_for_identical_images() {
        let image = random([2, 1, 4, 4, 4]);
        assert_eq!(ssd(image.clone(), image).into_scalar(), 0.0);
    }

    #[test]
    fn test_ssd_value() {
        let device = Default::default();
        let a = Tensor::<B, 5>::zeros([1, 1, 2, 2, 2], &device);
        let b = Tensor::<B, 5>::ones([1, 1, 2, 2, 2], &device).mul_scalar(2.0);
        assert_eq!(ssd(a, b).into_scalar(), 4.0);
    }

    #[test]
    fn test_global_ncc_perfect_and_inverted() {
        let image = random([2, 1, 4, 4, 4]);
        let same = global_ncc(image.clone(), image.clone()).into_scalar();
        assert!((same + 1.0).abs() < 1e-3);

        let inverted = global_ncc(image.clone(), image.neg()).into_scalar();
        assert!((inverted - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_local_ncc_prefers_match() {
        let fixed = random([1, 1, 8, 8, 8]);
        let matched = local_ncc(fixed.clone(), fixed.clone(), 3).into_scalar();
        let unrelated = local_ncc(fixed, random([1, 1, 8, 8, 8]), 3).into_scalar();
        assert!(matched < unrelated);
        assert!(matched < -0.5);
    }
}
