//! Optimizers for training the registration network.
//!
//! burn's Adam, SGD and RMSProp are wrapped in a [`ScheduledOptimizer`] that
//! evaluates a [`LearningRateSchedule`] at its own iteration counter.

pub mod learning_rate;
pub mod scheduled;
pub mod trait_;

use burn::config::Config;
use burn::module::AutodiffModule;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{AdamConfig, RmsPropConfig, SgdConfig};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

pub use learning_rate::LearningRateSchedule;
pub use scheduled::ScheduledOptimizer;
pub use trait_::Optimizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Adam,
    Sgd,
    Rmsprop,
}

#[derive(Config, Debug)]
pub struct OptimizerConfig {
    #[config(default = "OptimizerKind::Adam")]
    pub name: OptimizerKind,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    /// Momentum for `sgd`.
    #[config(default = 0.9)]
    pub momentum: f64,
    #[config(default = "LearningRateSchedule::Constant")]
    pub schedule: LearningRateSchedule,
}

/// Build the configured optimizer for module type `M`.
pub fn build_optimizer<B, M>(config: &OptimizerConfig) -> Box<dyn Optimizer<M, B>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + 'static,
{
    build_optimizer_at(config, 0)
}

/// Build the configured optimizer with its step counter at `iterations`.
///
/// Used when resuming from a checkpoint so the schedule and summary steps
/// continue where the restored run stopped. Moment estimates start fresh.
pub fn build_optimizer_at<B, M>(config: &OptimizerConfig, iterations: usize) -> Box<dyn Optimizer<M, B>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + 'static,
{
    let lr = config.learning_rate;
    let schedule = config.schedule;

    tracing::info!(
        "Using {:?} optimizer with learning rate {} ({:?} schedule)",
        config.name,
        lr,
        schedule
    );

    match config.name {
        OptimizerKind::Adam => Box::new(
            ScheduledOptimizer::new(AdamConfig::new().init::<B, M>(), lr, schedule)
                .with_iterations(iterations),
        ),
        OptimizerKind::Sgd => {
            let momentum = (config.momentum > 0.0)
                .then(|| MomentumConfig::new().with_momentum(config.momentum));
            Box::new(
                ScheduledOptimizer::new(
                    SgdConfig::new().with_momentum(momentum).init::<B, M>(),
                    lr,
                    schedule,
                )
                .with_iterations(iterations),
            )
        }
        OptimizerKind::Rmsprop => Box::new(
            ScheduledOptimizer::new(RmsPropConfig::new().init::<B, M>(), lr, schedule)
                .with_iterations(iterations),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::nn::{Linear, LinearConfig};
    use burn::optim::GradientsParams;
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;

    type B = Autodiff<NdArray<f32>>;

    fn one_step(optimizer: &mut dyn Optimizer<Linear<B>, B>, model: Linear<B>) -> Linear<B> {
        let device = Default::default();
        let x = Tensor::<B, 2>::ones([4, 3], &device);
        let loss = model.forward(x).powf_scalar(2.0).mean();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        optimizer.step(model, grads)
    }

    #[test]
    fn test_every_optimizer_counts_iterations() {
        let device = Default::default();
        for name in [OptimizerKind::Adam, OptimizerKind::Sgd, OptimizerKind::Rmsprop] {
            let config = OptimizerConfig::new().with_name(name);
            let mut optimizer = build_optimizer::<B, Linear<B>>(&config);
            let mut model = LinearConfig::new(3, 2).init::<B>(&device);

            assert_eq!(optimizer.iterations(), 0);
            model = one_step(optimizer.as_mut(), model);
            let _ = one_step(optimizer.as_mut(), model);
            assert_eq!(optimizer.iterations(), 2);
        }
    }

    #[test]
    fn test_schedule_follows_iterations() {
        let device = Default::default();
        let config = OptimizerConfig::new()
            .with_learning_rate(0.1)
            .with_schedule(LearningRateSchedule::step_decay(0.5, 1));
        let mut optimizer = build_optimizer::<B, Linear<B>>(&config);
        let model = LinearConfig::new(3, 2).init::<B>(&device);

        assert_eq!(optimizer.learning_rate(), 0.1);
        let _ = one_step(optimizer.as_mut(), model);
        assert_eq!(optimizer.learning_rate(), 0.05);

        optimizer.set_learning_rate(1.0);
        assert_eq!(optimizer.learning_rate(), 0.5);
    }

    #[test]
    fn test_resumed_optimizer_continues_counting() {
        let device = Default::default();
        let config = OptimizerConfig::new()
            .with_learning_rate(0.1)
            .with_schedule(LearningRateSchedule::step_decay(0.5, 4));
        let mut optimizer = build_optimizer_at::<B, Linear<B>>(&config, 4);
        let model = LinearConfig::new(3, 2).init::<B>(&device);

        assert_eq!(optimizer.iterations(), 4);
        assert_eq!(optimizer.learning_rate(), 0.05);
        let _ = one_step(optimizer.as_mut(), model);
        assert_eq!(optimizer.iterations(), 5);
    }

    #[test]
    fn test_config_json_names() {
        let config: OptimizerConfig =
            serde_json::from_str(r#"{"name": "sgd", "learning_rate": 0.01, "momentum": 0.5, "schedule": {"type": "constant"}}"#)
                .unwrap();
        assert_eq!(config.name, OptimizerKind::Sgd);
        assert_eq!(config.learning_rate, 0.01);
    }
}
