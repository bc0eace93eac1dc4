//! Numerical and shape checks applied around each step.

use burn::tensor::backend::Backend;
use warpkit_io::PairedBatch;

use crate::error::{Result, TrainError};
use crate::metrics::LOSS_TOTAL;

/// Fail when the total loss is NaN or infinite.
///
/// Other non-finite values are reported but do not stop training.
pub fn check_step_values(values: &[(&'static str, f64)], context: &str) -> Result<()> {
    for &(key, value) in values {
        if value.is_finite() {
            continue;
        }
        if key == LOSS_TOTAL {
            return Err(TrainError::numerical_instability(format!(
                "{key} is {value} during {context}"
            )));
        }
        tracing::warn!("{} is {} during {}", key, value, context);
    }
    Ok(())
}

/// Check a batch against the volume sizes the model was built for.
pub fn validate_batch<B: Backend>(
    batch: &PairedBatch<B>,
    moving_image_size: [usize; 3],
    fixed_image_size: [usize; 3],
) -> Result<()> {
    let [_, _, md, mh, mw] = batch.inputs.moving_image.dims();
    let [_, _, fd, fh, fw] = batch.inputs.fixed_image.dims();
    if [md, mh, mw] != moving_image_size || [fd, fh, fw] != fixed_image_size {
        return Err(TrainError::data(format!(
            "batch {:?} has moving {:?} / fixed {:?}, expected {:?} / {:?}",
            batch.indices,
            [md, mh, mw],
            [fd, fh, fw],
            moving_image_size,
            fixed_image_size
        )));
    }
    if batch.inputs.moving_label.is_some() != batch.fixed_label.is_some() {
        return Err(TrainError::data(format!(
            "batch {:?} has only one of moving and fixed labels",
            batch.indices
        )));
    }
    Ok(())
}
