//! Progress callbacks for a running batch.

use crate::aggregator::BatchReport;

/// Receives batch progress. Called from the aggregator only, never from workers.
pub trait ProgressObserver: Send + Sync {
    /// At most once per reporting bucket, and once when the last row lands.
    /// `latest` is the most recent successful cell value, if any.
    fn progress(&self, processed: usize, total: usize, latest: Option<&str>);

    /// Exactly once, after the run reaches a terminal state.
    fn finished(&self, report: &BatchReport);
}

/// No-op observer for headless/test usage.
pub struct SilentProgress;

impl ProgressObserver for SilentProgress {
    fn progress(&self, _processed: usize, _total: usize, _latest: Option<&str>) {}
    fn finished(&self, _report: &BatchReport) {}
}
