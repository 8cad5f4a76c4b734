//! Runs every configured pipeline in order.

use std::path::PathBuf;
use tracing::{error, info, warn};

use super::job::PipelineJob;
use super::machine::{PipelineExecutor, RunOutcome};
use crate::config::discover_pipelines;
use crate::errors::WrapperError;

/// Per-pipeline outcomes of a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Outcomes in run order.
    pub outcomes: Vec<RunOutcome>,
    /// True if cancellation stopped the run early.
    pub cancelled: bool,
}

impl RunSummary {
    /// Number of pipelines that did not succeed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }

    /// Total rows reported across all pipelines.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.outcomes
            .iter()
            .fold(0u64, |acc, o| acc.saturating_add(o.rows_synced))
    }

    /// Returns an error if the run was cancelled or any pipeline failed.
    pub fn ensure_success(&self) -> Result<(), WrapperError> {
        if self.cancelled {
            return Err(WrapperError::Cancelled(format!(
                "{} of {} pipelines finished",
                self.outcomes.iter().filter(|o| !o.is_cancelled()).count(),
                self.outcomes.len()
            )));
        }
        match self.failed() {
            0 => Ok(()),
            failed => Err(WrapperError::PipelinesFailed {
                failed,
                total: self.outcomes.len(),
            }),
        }
    }
}

/// Drives pipeline runs one after another.
///
/// A failing pipeline never stops the others. Cancellation does: once the
/// token fires no further pipeline is started.
#[derive(Debug, Clone)]
pub struct RunCoordinator {
    executor: PipelineExecutor,
}

impl RunCoordinator {
    /// Creates a coordinator around an executor.
    #[must_use]
    pub fn new(executor: PipelineExecutor) -> Self {
        Self { executor }
    }

    /// Returns the executor.
    #[must_use]
    pub fn executor(&self) -> &PipelineExecutor {
        &self.executor
    }

    /// Discovers pipelines from the configuration and runs them.
    ///
    /// Discovery errors are returned before any pipeline runs.
    pub async fn run_configured(&self) -> Result<RunSummary, WrapperError> {
        let pipelines = discover_pipelines(self.executor.config())?;
        info!(count = pipelines.len(), mode = %self.executor.config().sync_mode, "discovered pipelines");
        Ok(self.run(pipelines).await)
    }

    /// Runs each pipeline sequentially with a fresh job identifier.
    pub async fn run(&self, pipelines: impl IntoIterator<Item = PathBuf>) -> RunSummary {
        let cancel = self.executor.cancellation();
        let mut summary = RunSummary::default();

        for pipeline in pipelines {
            if cancel.is_cancelled() {
                warn!(
                    reason = %cancel.reason().unwrap_or_default(),
                    "cancelled; not starting remaining pipelines"
                );
                summary.cancelled = true;
                break;
            }

            let job = PipelineJob::new(pipeline);
            let outcome = self.executor.run(&job).await;
            log_completion(&outcome);

            let cancelled = outcome.is_cancelled();
            summary.outcomes.push(outcome);
            if cancelled {
                summary.cancelled = true;
                break;
            }
        }

        summary
    }
}

fn log_completion(outcome: &RunOutcome) {
    let pipeline = outcome.job.pipeline.display();
    let duration_seconds = format!("{:.2}", outcome.duration.as_secs_f64());
    match outcome.error() {
        None => info!(
            pipeline = %pipeline,
            sync_job_id = %outcome.job.job_id,
            duration_seconds = %duration_seconds,
            rows = outcome.rows_synced,
            status = %outcome.status,
            "pipeline completed"
        ),
        Some(err) => error!(
            pipeline = %pipeline,
            sync_job_id = %outcome.job.job_id,
            duration_seconds = %duration_seconds,
            rows = outcome.rows_synced,
            status = %outcome.status,
            error = %err,
            "pipeline failed"
        ),
    }
}
