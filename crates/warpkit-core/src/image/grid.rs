use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

/// Identity sampling grid for a volume of shape `[D, H, W]`.
///
/// Returns a `[1, 3, D, H, W]` tensor whose channel `k` holds the voxel index
/// along axis `k` (z, y, x order, matching the tensor axes). Adding a dense
/// displacement field to it yields the positions a warp samples from.
pub fn reference_grid<B: Backend>(grid_size: [usize; 3], device: &B::Device) -> Tensor<B, 5> {
    let [d, h, w] = grid_size;

    let axis = |n: usize, shape: [usize; 5], repeats: [usize; 5]| -> Tensor<B, 5> {
        Tensor::<B, 1, Int>::arange(0..n as i64, device)
            .float()
            .reshape(shape)
            .repeat(&repeats)
    };

    let z = axis(d, [1, 1, d, 1, 1], [1, 1, 1, h, w]);
    let y = axis(h, [1, 1, 1, h, 1], [1, 1, d, 1, w]);
    let x = axis(w, [1, 1, 1, 1, w], [1, 1, d, h, 1]);

    Tensor::cat(vec![z, y, x], 1)
}
