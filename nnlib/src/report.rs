//! Training progress reporting.

use log::info;

/// Validation result at the end of one training epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    /// 1-based epoch number.
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
}

/// Result of evaluating a network on a test set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationReport {
    pub loss: f64,
    pub accuracy: f64,
}

/// Sink for training progress events.
pub trait TrainingReporter: Send {
    fn epoch_end(&mut self, report: &EpochReport);

    fn evaluation(&mut self, report: &EvaluationReport);
}

/// Reporter that writes every event to the `log` facade at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl TrainingReporter for LogReporter {
    fn epoch_end(&mut self, report: &EpochReport) {
        info!(
            "epoch {:4}: validation loss = {:.6}, accuracy = {:.2}%",
            report.epoch,
            report.loss,
            report.accuracy * 100.0
        );
    }

    fn evaluation(&mut self, report: &EvaluationReport) {
        info!(
            "evaluation: test loss = {:.6}, accuracy = {:.2}%",
            report.loss,
            report.accuracy * 100.0
        );
    }
}
