use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Dense displacement for a batch of affine matrices.
///
/// `theta` is `[B, 12]`, a row-major 3x4 matrix acting on `(z, y, x, 1)`
/// coordinates normalised to `[-1, 1]` over the reference grid. The identity
/// matrix gives a zero displacement. Returns `[B, 3, D, H, W]` in voxel units.
pub fn affine_grid<B: Backend>(theta: Tensor<B, 2>, reference_grid: Tensor<B, 5>) -> Tensor<B, 5> {
    let [batch, _] = theta.dims();
    let [_, _, d, h, w] = reference_grid.dims();
    let n = d * h * w;
    let device = reference_grid.device();

    let half_extent = |size: usize| if size > 1 { (size - 1) as f32 / 2.0 } else { 1.0 };
    let halves = [half_extent(d), half_extent(h), half_extent(w)];

    let axis = |k: usize| reference_grid.clone().slice([0..1, k..k + 1, 0..d, 0..h, 0..w]);
    let normalised: Vec<Tensor<B, 5>> = (0..3)
        .map(|k| axis(k).div_scalar(halves[k]).sub_scalar(1.0))
        .collect();

    // [B, 4, N]
    let ones = Tensor::<B, 5>::ones([1, 1, d, h, w], &device);
    let homogeneous = Tensor::cat(
        vec![
            normalised[0].clone(),
            normalised[1].clone(),
            normalised[2].clone(),
            ones,
        ],
        1,
    )
    .reshape([1, 4, n])
    .repeat(&[batch, 1, 1]);

    // [B, 3, 4] x [B, 4, N] -> [B, 3, N]
    let mapped = theta.reshape([batch, 3, 4]).matmul(homogeneous);
    let mapped = mapped.reshape([batch, 3, d, h, w]);

    let displaced: Vec<Tensor<B, 5>> = (0..3)
        .map(|k| {
            let moved = mapped.clone().slice([0..batch, k..k + 1, 0..d, 0..h, 0..w]);
            moved.sub(normalised[k].clone()).mul_scalar(halves[k])
        })
        .collect();

    Tensor::cat(displaced, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use warpkit_core::reference_grid;

    type B = NdArray<f32>;

    const IDENTITY: [f32; 12] = [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0];

    #[test]
    fn test_identity_gives_zero_displacement() {
        let device = Default::default();
        let grid = reference_grid::<B>([3, 4, 5], &device);
        let theta = Tensor::<B, 1>::from_floats(IDENTITY, &device)
            .reshape([1, 12])
            .repeat(&[2, 1]);

        let ddf = affine_grid(theta, grid);
        assert_eq!(ddf.dims(), [2, 3, 3, 4, 5]);
        let max = ddf.abs().max().into_scalar();
        assert!(max < 1e-5);
    }

    #[test]
    fn test_translation_is_uniform() {
        let device = Default::default();
        let grid = reference_grid::<B>([5, 5, 5], &device);
        let mut params = IDENTITY;
        // shift x by half the normalised range: two voxels on a 5-wide axis
        params[11] = 1.0;
        let theta = Tensor::<B, 1>::from_floats(params, &device).reshape([1, 12]);

        let ddf = affine_grid(theta, grid);
        let x = ddf.clone().slice([0..1, 2..3, 0..5, 0..5, 0..5]);
        let min = x.clone().min().into_scalar();
        let max = x.max().into_scalar();
        assert!((min - 2.0).abs() < 1e-5 && (max - 2.0).abs() < 1e-5);

        let z = ddf.slice([0..1, 0..1, 0..5, 0..5, 0..5]).abs().max().into_scalar();
        assert!(z < 1e-5);
    }
}
