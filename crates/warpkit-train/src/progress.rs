//! Progress tracking and callbacks for training runs.
//!
//! The trainer hands an [`EpochSummary`] to every registered callback after
//! each epoch. Callbacks can ask the loop to stop early.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::metrics::{MetricValues, LOSS_TOTAL};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What one epoch produced.
#[derive(Debug, Clone)]
pub struct EpochSummary {
    pub epoch: usize,
    /// Total number of epochs the run was configured for.
    pub epochs: usize,
    /// Optimizer iterations after this epoch.
    pub iterations: usize,
    pub train: MetricValues,
    pub test: MetricValues,
    pub elapsed: Duration,
    pub estimated_remaining: Option<Duration>,
}

impl EpochSummary {
    pub fn new(
        epoch: usize,
        epochs: usize,
        iterations: usize,
        train: MetricValues,
        test: MetricValues,
        elapsed: Duration,
    ) -> Self {
        Self {
            epoch,
            epochs,
            iterations,
            train,
            test,
            elapsed,
            estimated_remaining: None,
        }
    }

    fn lookup(values: &MetricValues, key: &str) -> Option<f64> {
        values.iter().find(|(k, _)| *k == key).map(|&(_, v)| v)
    }

    pub fn train_loss(&self) -> Option<f64> {
        Self::lookup(&self.train, LOSS_TOTAL)
    }

    pub fn test_loss(&self) -> Option<f64> {
        Self::lookup(&self.test, LOSS_TOTAL)
    }

    /// Percentage of configured epochs completed.
    pub fn progress_percent(&self) -> f64 {
        (self.epoch + 1) as f64 / self.epochs.max(1) as f64 * 100.0
    }

    /// Estimate the remaining time from the average epoch duration so far.
    pub fn calculate_remaining(&mut self, epochs_done: usize) {
        if epochs_done > 0 {
            let per_epoch = self.elapsed.as_secs_f64() / epochs_done as f64;
            let remaining = self.epochs.saturating_sub(self.epoch + 1);
            self.estimated_remaining = Some(Duration::from_secs_f64(per_epoch * remaining as f64));
        }
    }
}

/// Progress callback trait for monitoring training.
pub trait ProgressCallback: Send + Sync {
    /// Called after every epoch.
    fn on_epoch(&self, summary: &EpochSummary);

    fn on_start(&self, _epochs: usize) {}

    /// Called when the loop ends without error, with the last epoch run.
    fn on_complete(&self, _last: Option<&EpochSummary>) {}

    fn on_error(&self, _error: &str) {}

    /// Ask the trainer to stop after the current epoch.
    fn should_stop(&self) -> bool {
        false
    }
}

/// Logs each epoch through `tracing`.
#[derive(Debug, Clone)]
pub struct ConsoleProgressCallback {
    /// Log every this many epochs.
    pub log_interval: usize,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self { log_interval: 1 }
    }
}

impl ConsoleProgressCallback {
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_epoch(&self, summary: &EpochSummary) {
        let last = summary.epoch + 1 == summary.epochs;
        if summary.epoch % self.log_interval != 0 && !last {
            return;
        }
        let fmt_loss = |loss: Option<f64>| loss.map_or_else(|| "N/A".to_string(), |l| format!("{l:.6}"));
        let remaining = summary
            .estimated_remaining
            .map_or_else(|| "N/A".to_string(), |d| format!("{:.1}s", d.as_secs_f64()));

        tracing::info!(
            "Epoch {}/{} ({:.1}%) | iterations: {} | train loss: {} | test loss: {} | elapsed: {:.1}s | ETA: {}",
            summary.epoch + 1,
            summary.epochs,
            summary.progress_percent(),
            summary.iterations,
            fmt_loss(summary.train_loss()),
            fmt_loss(summary.test_loss()),
            summary.elapsed.as_secs_f64(),
            remaining
        );
    }

    fn on_start(&self, epochs: usize) {
        tracing::info!("Training started for {} epochs", epochs);
    }

    fn on_complete(&self, last: Option<&EpochSummary>) {
        match last {
            Some(summary) => tracing::info!(
                "Training completed after epoch {} in {:.2}s",
                summary.epoch,
                summary.elapsed.as_secs_f64()
            ),
            None => tracing::info!("Training completed with no epochs to run"),
        }
    }

    fn on_error(&self, error: &str) {
        tracing::error!("Training failed: {}", error);
    }
}

/// Records every epoch summary.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<EpochSummary>>>,
}

impl HistoryCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_history(&self) -> Vec<EpochSummary> {
        lock(&self.history).clone()
    }

    pub fn clear(&self) {
        lock(&self.history).clear();
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_epoch(&self, summary: &EpochSummary) {
        lock(&self.history).push(summary.clone());
    }
}

#[derive(Debug)]
struct EarlyStoppingState {
    best_loss: f64,
    counter: usize,
    should_stop: bool,
}

impl Default for EarlyStoppingState {
    fn default() -> Self {
        Self {
            best_loss: f64::INFINITY,
            counter: 0,
            should_stop: false,
        }
    }
}

/// Stops training when the test total loss stops improving.
#[derive(Debug, Clone)]
pub struct EarlyStoppingCallback {
    /// Minimum decrease that counts as an improvement.
    pub min_improvement: f64,
    /// Epochs to wait for an improvement.
    pub patience: usize,
    state: Arc<Mutex<EarlyStoppingState>>,
}

impl EarlyStoppingCallback {
    pub fn new(min_improvement: f64, patience: usize) -> Self {
        Self {
            min_improvement,
            patience: patience.max(1),
            state: Arc::default(),
        }
    }

    pub fn best_loss(&self) -> f64 {
        lock(&self.state).best_loss
    }

    pub fn reset(&self) {
        *lock(&self.state) = EarlyStoppingState::default();
    }
}

impl ProgressCallback for EarlyStoppingCallback {
    fn on_epoch(&self, summary: &EpochSummary) {
        // no test batches ran
        let Some(loss) = summary.test_loss() else {
            return;
        };
        let mut state = lock(&self.state);
        if state.best_loss - loss > self.min_improvement {
            state.best_loss = loss;
            state.counter = 0;
        } else {
            state.counter += 1;
        }

        if state.counter >= self.patience && !state.should_stop {
            state.should_stop = true;
            tracing::info!(
                "Early stopping: no improvement for {} epochs (best test loss: {:.6}, current: {:.6})",
                self.patience,
                state.best_loss,
                loss
            );
        }
    }

    fn should_stop(&self) -> bool {
        lock(&self.state).should_stop
    }
}

/// Fans events out to registered callbacks.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    callbacks: Vec<Arc<dyn ProgressCallback>>,
    start_time: Arc<Mutex<Option<Instant>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.callbacks.push(callback);
    }

    pub fn start(&self, epochs: usize) {
        *lock(&self.start_time) = Some(Instant::now());
        for callback in &self.callbacks {
            callback.on_start(epochs);
        }
    }

    /// Time since [`ProgressTracker::start`].
    pub fn elapsed(&self) -> Duration {
        lock(&self.start_time).map_or(Duration::ZERO, |t| t.elapsed())
    }

    pub fn epoch(&self, summary: &EpochSummary) {
        for callback in &self.callbacks {
            callback.on_epoch(summary);
        }
    }

    pub fn complete(&self, last: Option<&EpochSummary>) {
        for callback in &self.callbacks {
            callback.on_complete(last);
        }
    }

    pub fn error(&self, error: &str) {
        for callback in &self.callbacks {
            callback.on_error(error);
        }
    }

    pub fn should_stop(&self) -> bool {
        self.callbacks.iter().any(|c| c.should_stop())
    }
}
