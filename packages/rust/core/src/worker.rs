//! A pool worker: walks its range in order and publishes one result plus one
//! progress signal per row.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use colgen_shared::{BackendKind, Dataset, FailurePolicy, RunConfig};

use crate::aggregator::ResultEvent;
use crate::partition::WorkRange;
use crate::task::RowTask;

pub(crate) struct Worker {
    pub(crate) id: usize,
    pub(crate) range: WorkRange,
    pub(crate) task: Arc<RowTask>,
    pub(crate) dataset: Arc<Dataset>,
    pub(crate) delay: Option<Duration>,
    pub(crate) policy: FailurePolicy,
    pub(crate) progress: UnboundedSender<()>,
    pub(crate) results: UnboundedSender<ResultEvent>,
    pub(crate) cancel: CancellationToken,
}

/// The sleep between successive calls, if this run gets one.
pub(crate) fn inter_call_delay(run: &RunConfig, backend: BackendKind) -> Option<Duration> {
    (run.inter_call_delay && backend.is_remote() && !run.delay.is_zero()).then_some(run.delay)
}

impl Worker {
    pub(crate) async fn run(self) {
        debug!(worker = self.id, range = %self.range, "worker started");

        for (i, row) in self.range.rows().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            if let (true, Some(delay)) = (i > 0, self.delay) {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let event = match self.dataset.row_view(row, &self.task.columns) {
                Some(view) => {
                    let outcome = tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        outcome = self.task.run(&view) => outcome,
                    };
                    match outcome {
                        Ok(output) => ResultEvent::Success(row, output.text),
                        Err(e) => ResultEvent::Failure(row, e.to_string()),
                    }
                }
                None => ResultEvent::Failure(row, format!("row {row} is out of range")),
            };

            let failed = matches!(event, ResultEvent::Failure(..));
            trace!(worker = self.id, row, failed, "row finished");

            // A closed channel means the aggregator is gone; nothing left to do.
            if self.results.send(event).is_err() || self.progress.send(()).is_err() {
                break;
            }
            if failed && self.policy == FailurePolicy::FailFast {
                break;
            }
        }

        debug!(worker = self.id, "worker stopped");
    }
}
