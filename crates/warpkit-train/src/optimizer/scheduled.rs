use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer as BurnOptimizer};
use burn::tensor::backend::AutodiffBackend;

use super::learning_rate::LearningRateSchedule;
use super::trait_::Optimizer;

/// A burn optimizer driven by a learning rate schedule.
///
/// Wraps any `burn::optim::Optimizer` (Adam, SGD, RMSProp adaptors) and
/// counts the steps it has taken.
pub struct ScheduledOptimizer<O> {
    optimizer: O,
    base_lr: f64,
    schedule: LearningRateSchedule,
    iterations: usize,
}

impl<O> ScheduledOptimizer<O> {
    pub fn new(optimizer: O, base_lr: f64, schedule: LearningRateSchedule) -> Self {
        Self {
            optimizer,
            base_lr,
            schedule,
            iterations: 0,
        }
    }

    /// Continue counting from `iterations`, e.g. after restoring a checkpoint.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }
}

impl<M, B, O> Optimizer<M, B> for ScheduledOptimizer<O>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
    O: BurnOptimizer<M, B>,
{
    fn step(&mut self, module: M, gradients: GradientsParams) -> M {
        let lr = self.schedule.learning_rate(self.base_lr, self.iterations);
        let module = self.optimizer.step(lr, module, gradients);
        self.iterations += 1;
        module
    }

    fn learning_rate(&self) -> f64 {
        self.schedule.learning_rate(self.base_lr, self.iterations)
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.base_lr = lr;
    }

    fn iterations(&self) -> usize {
        self.iterations
    }
}
