//! Run bookkeeping: the event loop over worker channels, the run state
//! machine, and the single merge into the dataset.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

use colgen_shared::{Dataset, FailurePolicy, Result, RunId};

use crate::observer::ProgressObserver;

/// One row's outcome, published by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultEvent {
    Success(usize, String),
    Failure(usize, String),
}

/// Lifecycle of a run. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Idle | Self::Running)
    }

    fn can_advance_to(self, next: Self) -> bool {
        match self {
            Self::Idle => next == Self::Running,
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed with errors",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Terminal summary of one run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: RunId,
    pub state: RunState,
    pub total: usize,
    pub workers: usize,
    /// Rows whose progress signal arrived.
    pub processed: usize,
    /// Cells written into the target column.
    pub rows_written: usize,
    /// Per-row failures kept under the mark-row policy.
    pub failed_rows: BTreeMap<usize, String>,
    /// Why the run as a whole did not complete.
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl BatchReport {
    /// Completed, with or without row errors.
    pub fn is_success(&self) -> bool {
        matches!(self.state, RunState::Completed | RunState::CompletedWithErrors)
    }
}

/// Mutable state of one run. Fresh per run, owned by the aggregator.
#[derive(Debug)]
pub(crate) struct BatchState {
    pub(crate) run_id: RunId,
    pub(crate) total: usize,
    pub(crate) workers: usize,
    pub(crate) report_every: usize,
    pub(crate) policy: FailurePolicy,
    pub(crate) state: RunState,
    pub(crate) processed: usize,
    pub(crate) results: BTreeMap<usize, String>,
    pub(crate) errors: BTreeMap<usize, String>,
    pub(crate) failure: Option<String>,
    latest: Option<String>,
    started_at: DateTime<Utc>,
}

impl BatchState {
    pub(crate) fn new(
        total: usize,
        workers: usize,
        report_every: usize,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            run_id: RunId::new(),
            total,
            workers,
            report_every: report_every.max(1),
            policy,
            state: RunState::Idle,
            processed: 0,
            results: BTreeMap::new(),
            errors: BTreeMap::new(),
            failure: None,
            latest: None,
            started_at: Utc::now(),
        }
    }

    /// Move to `next`; illegal transitions are ignored.
    pub(crate) fn advance(&mut self, next: RunState) {
        if self.state.can_advance_to(next) {
            debug!(run_id = %self.run_id, from = %self.state, to = %next, "run state");
            self.state = next;
        } else {
            warn!(run_id = %self.run_id, from = %self.state, to = %next, "ignored run state change");
        }
    }

    /// Count one finished row and notify at bucket boundaries.
    fn record_progress(&mut self, observer: &dyn ProgressObserver) {
        self.processed += 1;
        if self.processed % self.report_every == 0 || self.processed == self.total {
            observer.progress(self.processed, self.total, self.latest.as_deref());
        }
    }

    /// Store a result. Returns the abort reason under fail-fast.
    fn record_result(&mut self, event: ResultEvent) -> Option<String> {
        match event {
            ResultEvent::Success(row, text) => {
                self.latest = Some(text.clone());
                self.results.insert(row, text);
                None
            }
            ResultEvent::Failure(row, reason) => {
                warn!(run_id = %self.run_id, row, %reason, "row failed");
                match self.policy {
                    FailurePolicy::FailFast => Some(format!("row {row}: {reason}")),
                    FailurePolicy::MarkRow => {
                        self.errors.insert(row, reason);
                        None
                    }
                }
            }
        }
    }

    /// Receive until both channels close or a fail-fast abort arrives.
    ///
    /// Results are drained before progress so the reported `latest` text is
    /// the one that belongs to the row just counted.
    pub(crate) async fn collect(
        &mut self,
        progress_rx: &mut UnboundedReceiver<()>,
        result_rx: &mut UnboundedReceiver<ResultEvent>,
        observer: &dyn ProgressObserver,
    ) -> Option<String> {
        let mut progress_open = true;
        let mut results_open = true;

        while progress_open || results_open {
            tokio::select! {
                biased;
                event = result_rx.recv(), if results_open => match event {
                    Some(event) => {
                        if let Some(reason) = self.record_result(event) {
                            return Some(reason);
                        }
                    }
                    None => results_open = false,
                },
                signal = progress_rx.recv(), if progress_open => match signal {
                    Some(()) => self.record_progress(observer),
                    None => progress_open = false,
                },
            }
        }
        None
    }

    /// Write every accumulated success into `column` in one pass.
    pub(crate) fn merge_into(&self, dataset: &mut Dataset, column: &str) -> Result<usize> {
        let col = dataset.ensure_column(column);
        for (&row, text) in &self.results {
            dataset.set_cell(row, col, text.clone())?;
        }
        Ok(self.results.len())
    }

    pub(crate) fn report(&self, rows_written: usize) -> BatchReport {
        BatchReport {
            run_id: self.run_id.clone(),
            state: self.state,
            total: self.total,
            workers: self.workers,
            processed: self.processed,
            rows_written,
            failed_rows: self.errors.clone(),
            failure: self.failure.clone(),
            started_at: self.started_at,
            elapsed: (Utc::now() - self.started_at).to_std().unwrap_or_default(),
        }
    }
}
