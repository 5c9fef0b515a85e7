//! Batch generation and single-row preview.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use colgen_provider::ProviderAdapter;
use colgen_sanitize::Sanitizer;
use colgen_shared::{ColgenError, Dataset, Result, RunConfig};
use colgen_template::{TemplateEngine, TemplateSource, substitute};

use crate::aggregator::{BatchReport, BatchState, RunState};
use crate::observer::ProgressObserver;
use crate::partition::partition;
use crate::task::{RowTask, row_variables};
use crate::worker::{Worker, inter_call_delay};

/// What to generate: template, inputs, and destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationJob {
    pub template: TemplateSource,
    /// Columns joined into the reference block, in this order.
    pub reference_columns: Vec<String>,
    /// Column that receives the output; created if missing.
    pub target_column: String,
}

/// Result of previewing one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub row: usize,
    pub reference: String,
    pub prompt: String,
    /// Sanitized output, or `generation error: <cause>`.
    pub output: String,
}

/// Runs generation jobs against one provider.
#[derive(Debug, Clone)]
pub struct Engine {
    templates: TemplateEngine,
    provider: ProviderAdapter,
    sanitizer: Arc<Sanitizer>,
}

impl Engine {
    pub fn new(templates: TemplateEngine, provider: ProviderAdapter) -> Self {
        Self {
            templates,
            provider,
            sanitizer: Arc::new(Sanitizer::standard()),
        }
    }

    /// Replace the output cleanup pipeline.
    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = Arc::new(sanitizer);
        self
    }

    pub fn provider(&self) -> &ProviderAdapter {
        &self.provider
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    fn row_task(&self, dataset: &Dataset, job: &GenerationJob) -> Result<RowTask> {
        if job.target_column.trim().is_empty() {
            return Err(ColgenError::validation("target column name must not be empty"));
        }
        if job.reference_columns.is_empty() {
            return Err(ColgenError::validation("select at least one reference column"));
        }
        Ok(RowTask {
            template: self.templates.resolve(&job.template)?,
            columns: dataset.resolve_columns(&job.reference_columns)?,
            provider: self.provider.clone(),
            sanitizer: Arc::clone(&self.sanitizer),
        })
    }

    /// Fill `job.target_column` for every row of `dataset`.
    ///
    /// Workers read an immutable snapshot; `dataset` is only written once, after
    /// every worker has been joined. Under fail-fast, or when the run is
    /// cancelled, `dataset` is left untouched. `observer.finished` is called
    /// exactly once for every run that gets past validation.
    #[instrument(skip_all, fields(rows = dataset.len(), target = %job.target_column, workers = run.workers))]
    pub async fn generate(
        &self,
        dataset: &mut Dataset,
        job: &GenerationJob,
        run: &RunConfig,
        observer: &dyn ProgressObserver,
        cancel: CancellationToken,
    ) -> Result<BatchReport> {
        run.validate()?;
        let task = Arc::new(self.row_task(dataset, job)?);

        let total = dataset.len();
        let mut state = BatchState::new(total, run.workers, run.report_every, run.failure_policy);
        info!(
            run_id = %state.run_id,
            backend = %self.provider.kind(),
            model = self.provider.model(),
            "starting generation run"
        );
        state.advance(RunState::Running);

        let snapshot = Arc::new(dataset.clone());
        let delay = inter_call_delay(run, self.provider.kind());
        let run_token = cancel.child_token();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();

        let mut workers = JoinSet::new();
        for (id, range) in partition(total, run.workers).into_iter().enumerate() {
            let worker = Worker {
                id,
                range,
                task: Arc::clone(&task),
                dataset: Arc::clone(&snapshot),
                delay,
                policy: run.failure_policy,
                progress: progress_tx.clone(),
                results: result_tx.clone(),
                cancel: run_token.clone(),
            };
            workers.spawn(worker.run());
        }
        drop(progress_tx);
        drop(result_tx);

        let abort = state
            .collect(&mut progress_rx, &mut result_rx, observer)
            .await;
        if abort.is_some() {
            run_token.cancel();
        }
        drop(progress_rx);
        drop(result_rx);

        let mut crashed = false;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(run_id = %state.run_id, error = %e, "worker task failed");
                crashed |= e.is_panic();
            }
        }

        let received = state.results.len() + state.errors.len();
        let rows_written = if let Some(reason) = abort {
            state.failure = Some(reason);
            state.advance(RunState::Failed);
            0
        } else if crashed {
            state.failure = Some("worker crashed".into());
            state.advance(RunState::Failed);
            0
        } else if received < total && cancel.is_cancelled() {
            state.failure = Some("run cancelled".into());
            state.advance(RunState::Cancelled);
            0
        } else if received < total {
            state.failure = Some(format!("incomplete result set: {received} of {total} rows"));
            state.advance(RunState::Failed);
            0
        } else {
            let written = state.merge_into(dataset, &job.target_column)?;
            state.advance(if state.errors.is_empty() {
                RunState::Completed
            } else {
                RunState::CompletedWithErrors
            });
            written
        };

        let report = state.report(rows_written);
        match report.state {
            RunState::Completed | RunState::CompletedWithErrors => info!(
                run_id = %report.run_id,
                state = %report.state,
                rows_written = report.rows_written,
                failed = report.failed_rows.len(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "generation run finished"
            ),
            _ => warn!(
                run_id = %report.run_id,
                state = %report.state,
                failure = report.failure.as_deref().unwrap_or(""),
                "generation run did not complete; dataset unchanged"
            ),
        }
        observer.finished(&report);
        Ok(report)
    }

    /// Run one row outside the pool.
    ///
    /// Provider failures come back inline as `generation error: <cause>`
    /// rather than as an error.
    #[instrument(skip_all, fields(row = row))]
    pub async fn preview_row(
        &self,
        dataset: &Dataset,
        row: usize,
        job: &GenerationJob,
    ) -> Result<Preview> {
        let task = self.row_task(dataset, job)?;
        let view = dataset.row_view(row, &task.columns).ok_or_else(|| {
            ColgenError::Dataset(format!(
                "row {row} is out of range (dataset has {} rows)",
                dataset.len()
            ))
        })?;

        match task.run(&view).await {
            Ok(out) => Ok(Preview {
                row,
                reference: out.reference,
                prompt: out.prompt,
                output: out.text,
            }),
            Err(e) => {
                warn!(row, error = %e, "preview generation failed");
                let reference = view.reference_text();
                let prompt = substitute(&task.template, &row_variables(&view, &reference));
                Ok(Preview {
                    row,
                    reference,
                    prompt,
                    output: format!("generation error: {e}"),
                })
            }
        }
    }
}
