//! Learning rate scheduling strategies.
//!
//! A schedule scales the optimizer's base learning rate as a function of the
//! number of optimizer steps taken so far.

use serde::{Deserialize, Serialize};

/// Learning rate scheduling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LearningRateSchedule {
    /// Base learning rate throughout.
    #[default]
    Constant,
    /// Multiply by gamma every step_size iterations
    StepDecay { gamma: f64, step_size: usize },
    /// Multiply by gamma every iteration
    ExponentialDecay { gamma: f64 },
    /// lr = base_lr / (1 + decay_rate * iteration)
    InverseTimeDecay { decay_rate: f64 },
    /// lr = min_lr + 0.5 * (base_lr - min_lr) * (1 + cos(pi * iteration / max_iterations))
    CosineAnnealing { min_lr: f64, max_iterations: usize },
    /// lr = end_lr + (base_lr - end_lr) * (1 - iteration / max_iterations)^power
    PolynomialDecay {
        end_lr: f64,
        max_iterations: usize,
        power: f64,
    },
}

impl LearningRateSchedule {
    pub fn step_decay(gamma: f64, step_size: usize) -> Self {
        Self::StepDecay { gamma, step_size }
    }

    pub fn exponential_decay(gamma: f64) -> Self {
        Self::ExponentialDecay { gamma }
    }

    pub fn inverse_time_decay(decay_rate: f64) -> Self {
        Self::InverseTimeDecay { decay_rate }
    }

    pub fn cosine_annealing(min_lr: f64, max_iterations: usize) -> Self {
        Self::CosineAnnealing {
            min_lr,
            max_iterations,
        }
    }

    pub fn polynomial_decay(end_lr: f64, max_iterations: usize, power: f64) -> Self {
        Self::PolynomialDecay {
            end_lr,
            max_iterations,
            power,
        }
    }

    /// Get the learning rate for a given iteration.
    ///
    /// Annealing schedules hold their final value past `max_iterations`.
    pub fn learning_rate(&self, base_lr: f64, iteration: usize) -> f64 {
        let progress = |max_iterations: usize| {
            if max_iterations == 0 {
                1.0
            } else {
                (iteration as f64 / max_iterations as f64).min(1.0)
            }
        };

        match *self {
            Self::Constant => base_lr,
            Self::StepDecay { gamma, step_size } => {
                let decay_steps = iteration / step_size.max(1);
                base_lr * gamma.powi(decay_steps as i32)
            }
            Self::ExponentialDecay { gamma } => base_lr * gamma.powi(iteration as i32),
            Self::InverseTimeDecay { decay_rate } => base_lr / (1.0 + decay_rate * iteration as f64),
            Self::CosineAnnealing {
                min_lr,
                max_iterations,
            } => {
                let cosine = (1.0 + (std::f64::consts::PI * progress(max_iterations)).cos()) / 2.0;
                min_lr + (base_lr - min_lr) * cosine
            }
            Self::PolynomialDecay {
                end_lr,
                max_iterations,
                power,
            } => {
                let decay = (1.0 - progress(max_iterations)).powf(power);
                end_lr + (base_lr - end_lr) * decay
            }
        }
    }

    /// Reject parameters that would produce a non-positive or growing rate.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match *self {
            Self::Constant => Ok(()),
            Self::StepDecay { gamma, step_size } => {
                if step_size == 0 {
                    Err("step_decay step_size must be positive".into())
                } else if !(gamma > 0.0 && gamma <= 1.0) {
                    Err(format!("step_decay gamma must be in (0, 1], got {gamma}"))
                } else {
                    Ok(())
                }
            }
            Self::ExponentialDecay { gamma } if !(gamma > 0.0 && gamma <= 1.0) => {
                Err(format!("exponential_decay gamma must be in (0, 1], got {gamma}"))
            }
            Self::InverseTimeDecay { decay_rate } if !(decay_rate >= 0.0) => {
                Err(format!("inverse_time_decay decay_rate must be non-negative, got {decay_rate}"))
            }
            Self::CosineAnnealing { min_lr, .. } if !(min_lr >= 0.0) => {
                Err(format!("cosine_annealing min_lr must be non-negative, got {min_lr}"))
            }
            Self::PolynomialDecay { end_lr, power, .. } if !(end_lr >= 0.0 && power > 0.0) => Err(
                format!("polynomial_decay needs end_lr >= 0 and power > 0, got {end_lr} and {power}"),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_schedule() {
        let schedule = LearningRateSchedule::Constant;
        assert_eq!(schedule.learning_rate(0.01, 0), 0.01);
        assert_eq!(schedule.learning_rate(0.01, 100), 0.01);
    }

    #[test]
    fn test_step_decay() {
        let schedule = LearningRateSchedule::step_decay(0.5, 10);
        assert_eq!(schedule.learning_rate(0.1, 0), 0.1);
        assert_eq!(schedule.learning_rate(0.1, 5), 0.1);
        assert_eq!(schedule.learning_rate(0.1, 10), 0.05);
        assert_eq!(schedule.learning_rate(0.1, 20), 0.025);
    }

    #[test]
    fn test_exponential_decay() {
        let schedule = LearningRateSchedule::exponential_decay(0.99);
        assert_eq!(schedule.learning_rate(0.1, 0), 0.1);
        assert!((schedule.learning_rate(0.1, 100) - 0.0366).abs() < 0.001);
    }

    #[test]
    fn test_inverse_time_decay() {
        let schedule = LearningRateSchedule::inverse_time_decay(0.01);
        assert_eq!(schedule.learning_rate(0.1, 0), 0.1);
        assert!((schedule.learning_rate(0.1, 100) - 0.05).abs() < 0.001);
    }

    #[test]
    fn test_cosine_annealing_holds_minimum() {
        let schedule = LearningRateSchedule::cosine_annealing(0.001, 100);
        assert_eq!(schedule.learning_rate(0.1, 0), 0.1);
        assert!((schedule.learning_rate(0.1, 50) - 0.0505).abs() < 0.001);
        assert!((schedule.learning_rate(0.1, 100) - 0.001).abs() < 1e-9);
        assert!((schedule.learning_rate(0.1, 500) - 0.001).abs() < 1e-9);
    }

    #[test]
    fn test_polynomial_decay() {
        let schedule = LearningRateSchedule::polynomial_decay(0.001, 100, 1.0);
        assert_eq!(schedule.learning_rate(0.1, 0), 0.1);
        assert!((schedule.learning_rate(0.1, 50) - 0.0505).abs() < 0.001);
        assert!((schedule.learning_rate(0.1, 100) - 0.001).abs() < 0.001);
    }

    #[test]
    fn test_json_form() {
        let schedule: LearningRateSchedule =
            serde_json::from_str(r#"{"type": "step_decay", "gamma": 0.5, "step_size": 3}"#).unwrap();
        assert_eq!(schedule, LearningRateSchedule::step_decay(0.5, 3));

        let json = serde_json::to_string(&LearningRateSchedule::Constant).unwrap();
        assert_eq!(json, r#"{"type":"constant"}"#);
    }

    #[test]
    fn test_validate() {
        assert!(LearningRateSchedule::step_decay(0.5, 0).validate().is_err());
        assert!(LearningRateSchedule::exponential_decay(1.5).validate().is_err());
        assert!(LearningRateSchedule::cosine_annealing(0.0, 10).validate().is_ok());
    }
}
