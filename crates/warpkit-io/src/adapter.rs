use anyhow::{ensure, Result};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use warpkit_core::image::Image;

/// Stack volumes into a `[N, 1, D, H, W]` tensor.
///
/// All images must share one shape.
pub fn images_to_batch<B: Backend>(images: &[&Image<B, 3>]) -> Result<Tensor<B, 5>> {
    ensure!(!images.is_empty(), "Cannot batch empty list of images");

    let ref_shape = images[0].shape();
    for (i, img) in images.iter().enumerate().skip(1) {
        ensure!(
            img.shape() == ref_shape,
            "Image {} shape mismatch: {:?} vs {:?}",
            i,
            img.shape(),
            ref_shape
        );
    }

    let tensors: Vec<Tensor<B, 5>> = images.iter().map(|img| image_to_tensor(img)).collect();
    Ok(Tensor::cat(tensors, 0))
}

/// A single volume as a `[1, 1, D, H, W]` model input.
pub fn image_to_tensor<B: Backend>(image: &Image<B, 3>) -> Tensor<B, 5> {
    let [d, h, w] = image.shape();
    image.data().clone().reshape([1, 1, d, h, w])
}
