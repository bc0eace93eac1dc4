//! Smoothness penalties on a displacement field `[B, 3, D, H, W]`.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Forward difference along spatial `axis` (2, 3 or 4); `None` if the axis has one voxel.
fn diff<B: Backend>(field: Tensor<B, 5>, axis: usize) -> Option<Tensor<B, 5>> {
    let dims = field.dims();
    if dims[axis] < 2 {
        return None;
    }
    let mut head = dims.map(|d| 0..d);
    let mut tail = head.clone();
    head[axis] = 1..dims[axis];
    tail[axis] = 0..dims[axis] - 1;
    Some(field.clone().slice(head) - field.slice(tail))
}

fn zero<B: Backend>(field: &Tensor<B, 5>) -> Tensor<B, 1> {
    Tensor::zeros([1], &field.device())
}

fn mean_of<B: Backend>(
    field: &Tensor<B, 5>,
    terms: impl Iterator<Item = Tensor<B, 1>>,
    count: usize,
) -> Tensor<B, 1> {
    terms.fold(zero(field), |acc, t| acc + t).div_scalar(count as f32)
}

/// Mean squared first-order differences.
pub fn gradient_l2<B: Backend>(ddf: Tensor<B, 5>) -> Tensor<B, 1> {
    let terms = (2..5).filter_map(|axis| diff(ddf.clone(), axis).map(|d| d.powf_scalar(2.0).mean()));
    mean_of(&ddf, terms, 3)
}

/// Mean absolute first-order differences.
pub fn gradient_l1<B: Backend>(ddf: Tensor<B, 5>) -> Tensor<B, 1> {
    let terms = (2..5).filter_map(|axis| diff(ddf.clone(), axis).map(|d| d.abs().mean()));
    mean_of(&ddf, terms, 3)
}

/// Bending energy from second-order differences, mixed terms counted twice.
pub fn bending_energy<B: Backend>(ddf: Tensor<B, 5>) -> Tensor<B, 1> {
    let mut total = zero(&ddf);
    for a in 2..5 {
        let Some(first) = diff(ddf.clone(), a) else {
            continue;
        };
        for b in a..5 {
            if let Some(second) = diff(first.clone(), b) {
                let weight = if a == b { 1.0 } else { 2.0 };
                total = total + second.powf_scalar(2.0).mean().mul_scalar(weight);
            }
        }
    }
    total
}
