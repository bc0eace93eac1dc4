use burn::tensor::{backend::Backend, Int, Tensor, TensorData};

/// Trilinear interpolation for 3D tensors.
///
/// # Arguments
/// * `image` - Input image [B, C, D, H, W]
/// * `grid` - Sampling grid [B, 3, D', H', W'] in voxel coordinates (z, y, x)
///
/// # Returns
/// * Interpolated image [B, C, D', H', W']
///
/// Coordinates outside the volume take the value of the nearest border voxel.
pub fn trilinear_interpolation<B: Backend>(image: Tensor<B, 5>, grid: Tensor<B, 5>) -> Tensor<B, 5> {
    let [b, c, d, h, w] = image.dims();
    let [_, _, gd, gh, gw] = grid.dims();
    let n = gd * gh * gw;

    let z = grid.clone().slice([0..b, 0..1, 0..gd, 0..gh, 0..gw]);
    let y = grid.clone().slice([0..b, 1..2, 0..gd, 0..gh, 0..gw]);
    let x = grid.slice([0..b, 2..3, 0..gd, 0..gh, 0..gw]);

    let z0 = z.clone().floor();
    let z1 = z0.clone().add_scalar(1.0);
    let y0 = y.clone().floor();
    let y1 = y0.clone().add_scalar(1.0);
    let x0 = x.clone().floor();
    let x1 = x0.clone().add_scalar(1.0);

    let wz1 = z.sub(z0.clone());
    let wz0 = wz1.clone().neg().add_scalar(1.0);
    let wy1 = y.sub(y0.clone());
    let wy0 = wy1.clone().neg().add_scalar(1.0);
    let wx1 = x.sub(x0.clone());
    let wx0 = wx1.clone().neg().add_scalar(1.0);

    let z0_idx = z0.clamp(0.0, (d - 1) as f32).int();
    let z1_idx = z1.clamp(0.0, (d - 1) as f32).int();
    let y0_idx = y0.clamp(0.0, (h - 1) as f32).int();
    let y1_idx = y1.clamp(0.0, (h - 1) as f32).int();
    let x0_idx = x0.clamp(0.0, (w - 1) as f32).int();
    let x1_idx = x1.clamp(0.0, (w - 1) as f32).int();

    // [B, C, D*H*W]
    let flat_img = image.reshape([b, c, d * h * w]);

    let stride_d = (h * w) as i32;
    let stride_h = w as i32;

    let z0_off = z0_idx.mul_scalar(stride_d);
    let z1_off = z1_idx.mul_scalar(stride_d);
    let y0_off = y0_idx.mul_scalar(stride_h);
    let y1_off = y1_idx.mul_scalar(stride_h);

    let gather_val = |idx: Tensor<B, 5, Int>| -> Tensor<B, 5> {
        let flat_idx = idx.reshape([b, 1, n]).repeat(&[1, c, 1]);
        flat_img.clone().gather(2, flat_idx).reshape([b, c, gd, gh, gw])
    };

    let idx_00 = z0_off.clone() + y0_off.clone();
    let idx_01 = z0_off + y1_off.clone();
    let idx_10 = z1_off.clone() + y0_off;
    let idx_11 = z1_off + y1_off;

    let v000 = gather_val(idx_00.clone() + x0_idx.clone());
    let v001 = gather_val(idx_00 + x1_idx.clone());
    let v010 = gather_val(idx_01.clone() + x0_idx.clone());
    let v011 = gather_val(idx_01 + x1_idx.clone());
    let v100 = gather_val(idx_10.clone() + x0_idx.clone());
    let v101 = gather_val(idx_10 + x1_idx.clone());
    let v110 = gather_val(idx_11.clone() + x0_idx);
    let v111 = gather_val(idx_11 + x1_idx);

    // x, then y, then z
    let w00 = v000 * wx0.clone() + v001 * wx1.clone();
    let w01 = v010 * wx0.clone() + v011 * wx1.clone();
    let w10 = v100 * wx0.clone() + v101 * wx1.clone();
    let w11 = v110 * wx0 + v111 * wx1;

    let w0 = w00 * wy0.clone() + w01 * wy1.clone();
    let w1 = w10 * wy0 + w11 * wy1;

    w0 * wz0 + w1 * wz1
}

/// Sample `image` at `grid`, broadcasting a single grid over the batch.
///
/// The output takes the grid's spatial size, which may differ from the image's.
pub fn resample<B: Backend>(image: Tensor<B, 5>, grid: Tensor<B, 5>) -> Tensor<B, 5> {
    let batch = image.dims()[0];
    let grid = if grid.dims()[0] == 1 && batch > 1 {
        grid.repeat(&[batch, 1, 1, 1, 1])
    } else {
        grid
    };
    trilinear_interpolation(image, grid)
}

/// Warp `image` by a dense displacement field given in the reference grid's voxel units.
pub fn warp<B: Backend>(
    image: Tensor<B, 5>,
    ddf: Tensor<B, 5>,
    reference_grid: Tensor<B, 5>,
) -> Tensor<B, 5> {
    resample(image, reference_grid + ddf)
}

/// Rescale voxel coordinates of a `from`-shaped volume to a `to`-shaped one.
///
/// Corner voxels map onto corner voxels; an axis of extent 1 maps to 0.
pub fn scale_grid<B: Backend>(grid: Tensor<B, 5>, from: [usize; 3], to: [usize; 3]) -> Tensor<B, 5> {
    if from == to {
        return grid;
    }

    let factors: Vec<f32> = from
        .iter()
        .zip(to.iter())
        .map(|(&f, &t)| {
            if f <= 1 {
                0.0
            } else {
                (t.max(1) - 1) as f32 / (f - 1) as f32
            }
        })
        .collect();
    let scale = Tensor::<B, 1>::from_data(TensorData::new(factors, [3]), &grid.device())
        .reshape([1, 3, 1, 1, 1]);
    grid * scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use warpkit_core::reference_grid;

    type B = NdArray<f32>;

    fn ramp(shape: [usize; 3]) -> Tensor<B, 5> {
        let device = Default::default();
        let n = shape.iter().product::<usize>() as i64;
        Tensor::<B, 1, Int>::arange(0..n, &device)
            .float()
            .reshape([1, 1, shape[0], shape[1], shape[2]])
    }

    fn assert_close(a: Tensor<B, 5>, b: Tensor<B, 5>) {
        let a = a.to_data().to_vec::<f32>().unwrap();
        let b = b.to_data().to_vec::<f32>().unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-4, "{x} != {y}");
        }
    }

    #[test]
    fn test_identity_grid_reproduces_image() {
        let device = Default::default();
        let image = ramp([3, 4, 5]);
        let grid = reference_grid::<B>([3, 4, 5], &device);
        assert_close(trilinear_interpolation(image.clone(), grid), image);
    }

    #[test]
    fn test_half_voxel_shift_interpolates() {
        let device = Default::default();
        let image = ramp([1, 1, 4]);
        let grid = reference_grid::<B>([1, 1, 4], &device);
        let shift = Tensor::<B, 1>::from_floats([0.0, 0.0, 0.5], &device).reshape([1, 3, 1, 1, 1]);

        let warped = warp(image, shift, grid);
        let values = warped.to_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![0.5, 1.5, 2.5, 3.0]);
    }

    #[test]
    fn test_out_of_range_clamps_to_border() {
        let device = Default::default();
        let image = ramp([1, 1, 3]);
        let grid = reference_grid::<B>([1, 1, 3], &device);
        let shift = Tensor::<B, 1>::from_floats([0.0, 0.0, -10.0], &device).reshape([1, 3, 1, 1, 1]);
        let values = warp(image, shift, grid).to_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_resample_to_other_size_and_batch() {
        let device = Default::default();
        let image = Tensor::cat(vec![ramp([2, 2, 2]), ramp([2, 2, 2])], 0);
        let grid = scale_grid(reference_grid::<B>([3, 3, 3], &device), [3, 3, 3], [2, 2, 2]);

        let out = resample(image, grid);
        assert_eq!(out.dims(), [2, 1, 3, 3, 3]);
        // centre of a 2x2x2 ramp is the mean of its values
        let centre = out.slice([0..1, 0..1, 1..2, 1..2, 1..2]).into_scalar();
        assert!((centre - 3.5).abs() < 1e-5);
    }

    #[test]
    fn test_scale_grid_factors() {
        let device = Default::default();
        let grid = reference_grid::<B>([5, 1, 3], &device);
        let scaled = scale_grid(grid, [5, 1, 3], [9, 4, 2]);

        let max_z = scaled.clone().slice([0..1, 0..1, 0..5, 0..1, 0..3]).max().into_scalar();
        let max_y = scaled.clone().slice([0..1, 1..2, 0..5, 0..1, 0..3]).max().into_scalar();
        let max_x = scaled.slice([0..1, 2..3, 0..5, 0..1, 0..3]).max().into_scalar();
        assert!((max_z - 8.0).abs() < 1e-6);
        assert_eq!(max_y, 0.0);
        assert!((max_x - 1.0).abs() < 1e-6);
    }
}
