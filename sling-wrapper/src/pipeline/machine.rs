//! The per-pipeline run state machine.
//!
//! A run is one of three shapes, chosen by [`SyncMode`]:
//!
//! - `noop`: log what would run and stop
//! - `backfill`: clear the state location, never invoke the sync tool
//! - `normal`: attempt the sync tool up to the configured number of times,
//!   backing off between failures
//!
//! Every run opens exactly one span and closes it on every exit path.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::backoff::{BackoffPolicy, Sleeper, TokioSleeper};
use super::job::{PipelineJob, RunStatus};
use crate::cancellation::CancellationToken;
use crate::config::{RunConfig, SyncMode};
use crate::errors::{AttemptError, WrapperError};
use crate::observability::{PipelineSpan, SpanTimer, Tracer, SYNC_RUN_SPAN};
use crate::state::{StateRemover, StateResetter};
use crate::sync::{SyncAttempt, SyncInvocation, SyncRunner};

/// The result of one pipeline run.
#[derive(Debug)]
pub struct RunOutcome {
    /// The job that ran.
    pub job: PipelineJob,
    /// Terminal status.
    pub status: RunStatus,
    /// Rows reported across every attempt, failed ones included.
    pub rows_synced: u64,
    /// Wall-clock time of the run.
    pub duration: Duration,
    /// Why the run did not succeed.
    pub error: Option<WrapperError>,
}

impl RunOutcome {
    /// Returns true if the pipeline ultimately succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Returns the error, if the run failed.
    #[must_use]
    pub fn error(&self) -> Option<&WrapperError> {
        self.error.as_ref()
    }

    /// Returns true if the run stopped because of cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(WrapperError::is_cancelled)
    }
}

/// Runs single pipelines according to the configured mode.
#[derive(Clone)]
pub struct PipelineExecutor {
    config: Arc<RunConfig>,
    tracer: Arc<dyn Tracer>,
    attempt: Arc<dyn SyncAttempt>,
    sleeper: Arc<dyn Sleeper>,
    resetter: StateResetter,
    cancel: Arc<CancellationToken>,
    backoff: BackoffPolicy,
}

impl PipelineExecutor {
    /// Creates an executor that runs the real sync tool.
    #[must_use]
    pub fn new(config: RunConfig, tracer: Arc<dyn Tracer>) -> Self {
        let attempt = Arc::new(SyncRunner::new(config.sling_timeout));
        let backoff = BackoffPolicy::new(config.backoff_base, config.backoff_strategy);
        Self {
            config: Arc::new(config),
            tracer,
            attempt,
            sleeper: Arc::new(TokioSleeper),
            resetter: StateResetter::default(),
            cancel: Arc::new(CancellationToken::new()),
            backoff,
        }
    }

    /// Replaces the sync attempt strategy.
    #[must_use]
    pub fn with_attempt(mut self, attempt: Arc<dyn SyncAttempt>) -> Self {
        self.attempt = attempt;
        self
    }

    /// Replaces the backoff sleeper.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replaces the state remover used by backfills.
    #[must_use]
    pub fn with_remover(mut self, remover: Arc<dyn StateRemover>) -> Self {
        self.resetter = StateResetter::new(remover);
        self
    }

    /// Shares a cancellation token with the executor.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: Arc<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the run configuration.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// Runs one pipeline job to completion.
    pub async fn run(&self, job: &PipelineJob) -> RunOutcome {
        let timer = SpanTimer::start();
        let span = self.tracer.start_span(SYNC_RUN_SPAN);
        span.set_attribute("mission_cluster_id", self.config.mission_cluster_id.as_str());
        span.set_attribute("sync_job_id", job.job_id.to_string());
        span.set_attribute("pipeline", job.pipeline.display().to_string());
        span.set_attribute("state_location", self.config.state_location.as_str());
        span.set_attribute("sync_mode", self.config.sync_mode.as_str());

        let (status, rows_synced, error) = match self.config.sync_mode {
            SyncMode::Noop => self.run_noop(job, &span),
            SyncMode::Backfill => self.run_backfill(&span),
            SyncMode::Normal => self.run_normal(job, &span, &timer).await,
        };
        span.end();

        RunOutcome {
            job: job.clone(),
            status,
            rows_synced,
            duration: timer.elapsed(),
            error,
        }
    }

    fn run_noop(
        &self,
        job: &PipelineJob,
        span: &PipelineSpan,
    ) -> (RunStatus, u64, Option<WrapperError>) {
        info!(
            pipeline = %job.pipeline.display(),
            sync_job_id = %job.job_id,
            "[NOOP] Would run Sling pipeline"
        );
        span.set_attribute("status", RunStatus::Noop.as_str());
        (RunStatus::Noop, 0, None)
    }

    fn run_backfill(&self, span: &PipelineSpan) -> (RunStatus, u64, Option<WrapperError>) {
        match self.resetter.reset(&self.config.state_location) {
            Ok(outcome) => {
                span.set_attribute("state_reset", outcome.as_str());
                span.set_attribute("status", RunStatus::Backfill.as_str());
                (RunStatus::Backfill, 0, None)
            }
            Err(err) => {
                span.record_error(&err);
                span.set_attribute("status", RunStatus::Failed.as_str());
                (RunStatus::Failed, 0, Some(WrapperError::StateReset(err)))
            }
        }
    }

    async fn run_normal(
        &self,
        job: &PipelineJob,
        span: &PipelineSpan,
        timer: &SpanTimer,
    ) -> (RunStatus, u64, Option<WrapperError>) {
        let pipeline = job.pipeline.display().to_string();
        let invocation = SyncInvocation::new(
            self.config.sling_binary.clone(),
            job.pipeline.clone(),
            self.config.state_location.clone(),
            job.job_id.to_string(),
        );
        let attempts = self.config.attempts();
        let mut rows: u64 = 0;
        let mut last_error: Option<AttemptError> = None;

        for attempt in 1..=attempts {
            if self.cancel.is_cancelled() {
                last_error = Some(self.cancelled_error());
                break;
            }

            info!(pipeline = %pipeline, sync_job_id = %job.job_id, attempt, "starting sling attempt");
            let outcome = self.attempt.run_once(&invocation, span, &self.cancel).await;
            rows = rows.saturating_add(outcome.rows_synced);

            let err = match outcome.result {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(err) => err,
            };

            if matches!(err, AttemptError::Cancelled(_)) || attempt == attempts {
                last_error = Some(err);
                break;
            }

            let wait = self.backoff.delay_for_attempt(attempt);
            warn!(
                pipeline = %pipeline,
                attempt,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "sling attempt failed; retrying"
            );
            last_error = Some(err);

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    last_error = Some(self.cancelled_error());
                    break;
                }
                () = self.sleeper.sleep(wait) => {}
            }
        }

        let status = if last_error.is_none() {
            RunStatus::Success
        } else {
            RunStatus::Failed
        };
        span.set_attribute("duration_seconds", timer.elapsed_secs());
        span.set_attribute("rows_synced", rows);
        span.set_attribute("status", status.as_str());
        if let Some(err) = &last_error {
            span.record_error(err);
        }

        let error = last_error.map(|source| WrapperError::SyncFailed { pipeline, source });
        (status, rows, error)
    }

    fn cancelled_error(&self) -> AttemptError {
        AttemptError::Cancelled(
            self.cancel
                .reason()
                .unwrap_or_else(|| "cancelled".to_string()),
        )
    }
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("config", &self.config)
            .field("backoff", &self.backoff)
            .field("resetter", &self.resetter)
            .finish_non_exhaustive()
    }
}
