//! Running means of the values each step reports.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;
use crate::summary::SummaryWriter;

pub const LOSS_SIM: &str = "loss_sim";
pub const LOSS_REG: &str = "loss_reg";
pub const LOSS_LABEL: &str = "loss_label";
pub const LOSS_TOTAL: &str = "loss_total";
pub const METRIC_DICE: &str = "metric_dice";
pub const METRIC_DIST: &str = "metric_dist";
pub const OPT_LR: &str = "opt_lr";

/// Named scalars produced by one train or eval step.
pub type MetricValues = Vec<(&'static str, f64)>;

/// Summary tags for evaluation.
pub fn test_summary_names() -> Vec<(&'static str, &'static str)> {
    vec![
        (LOSS_SIM, "loss/similarity"),
        (LOSS_REG, "loss/regularization"),
        (LOSS_LABEL, "loss/label"),
        (LOSS_TOTAL, "loss/total"),
        (METRIC_DICE, "metric/dice"),
        (METRIC_DIST, "metric/centroid_distance"),
    ]
}

/// Summary tags for training: the evaluation tags plus the learning rate.
pub fn train_summary_names() -> Vec<(&'static str, &'static str)> {
    let mut names = test_summary_names();
    names.push((OPT_LR, "opt/learning_rate"));
    names
}

#[derive(Debug, Clone, Copy, Default)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn value(&self) -> f64 {
        self.sum / self.count as f64
    }
}

#[derive(Debug, Clone)]
pub struct Metrics {
    summary_names: BTreeMap<&'static str, &'static str>,
    means: BTreeMap<&'static str, Mean>,
}

impl Metrics {
    pub fn new(summary_names: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            summary_names: summary_names.into_iter().collect(),
            means: BTreeMap::new(),
        }
    }

    /// Fold one step's values in; keys without a summary name are ignored.
    pub fn update(&mut self, values: &[(&'static str, f64)]) {
        for &(key, value) in values {
            if self.summary_names.contains_key(key) {
                let mean = self.means.entry(key).or_default();
                mean.sum += value;
                mean.count += 1;
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.means.get(key).map(Mean::value)
    }

    /// Current means in key order.
    pub fn values(&self) -> MetricValues {
        self.means.iter().map(|(&key, mean)| (key, mean.value())).collect()
    }

    /// Write the current mean of every key that has values.
    pub fn update_summary(&self, writer: &mut SummaryWriter, step: usize) -> Result<()> {
        for (key, mean) in &self.means {
            if let Some(tag) = self.summary_names.get(key) {
                writer.add_scalar(tag, mean.value(), step)?;
            }
        }
        writer.flush()
    }

    pub fn reset(&mut self) {
        self.means.clear();
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .means
            .iter()
            .map(|(key, mean)| format!("{key} = {:.6}", mean.value()))
            .collect();
        f.write_str(&parts.join(", "))
    }
}
