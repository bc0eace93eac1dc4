//! Optimizer trait used by the training steps.

use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;

/// Optimizer trait for training registration networks.
///
/// # Type Parameters
/// * `M` - The module to optimize
/// * `B` - The backend for tensor operations (must support autodiff)
pub trait Optimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    /// Perform a single optimization step and advance the iteration counter.
    ///
    /// # Returns
    /// The updated module with new parameter values
    fn step(&mut self, module: M, gradients: GradientsParams) -> M;

    /// Learning rate the next step will use.
    fn learning_rate(&self) -> f64;

    /// Set the base learning rate the schedule scales.
    fn set_learning_rate(&mut self, lr: f64);

    /// Number of steps taken so far.
    fn iterations(&self) -> usize;
}
