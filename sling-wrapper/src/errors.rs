//! Error types for the sync wrapper.
//!
//! Each layer owns a small error enum; [`WrapperError`] is what the
//! coordinator and pipeline runs hand back to the binary.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// The main error type for wrapper operations.
#[derive(Debug, Error)]
pub enum WrapperError {
    /// Configuration or pipeline discovery failed.
    #[error("load pipelines: {0}")]
    Config(#[from] ConfigError),

    /// Backfill could not clear the state location.
    #[error("reset state: {0}")]
    StateReset(#[from] StateResetError),

    /// A pipeline kept failing after all retry attempts.
    #[error("sling run failed for {pipeline}: {source}")]
    SyncFailed {
        /// The pipeline that failed.
        pipeline: String,
        /// The error from the last attempt.
        #[source]
        source: AttemptError,
    },

    /// At least one pipeline did not succeed.
    #[error("{failed} of {total} pipelines failed")]
    PipelinesFailed {
        /// Number of failed pipelines.
        failed: usize,
        /// Number of pipelines attempted.
        total: usize,
    },

    /// The run was cancelled before it finished.
    #[error("run cancelled: {0}")]
    Cancelled(String),
}

impl WrapperError {
    /// Returns true if this error came from cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled(_)
                | Self::SyncFailed {
                    source: AttemptError::Cancelled(_),
                    ..
                }
        )
    }
}

/// Errors raised while building the run configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Both a single pipeline file and a pipeline directory were given.
    #[error("cannot set both pipeline dir ({}) and pipeline file ({})", .dir.display(), .file.display())]
    ConflictingSelection {
        /// The configured pipeline file.
        file: PathBuf,
        /// The configured pipeline directory.
        dir: PathBuf,
    },

    /// No pipeline files were found.
    #[error("no pipeline files found (set SLING_CONFIG or PIPELINE_DIR){}", .detail.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
    NoPipelines {
        /// Optional detail, e.g. why the directory could not be read.
        detail: Option<String>,
    },

    /// The sync mode string is not recognized.
    #[error("invalid sync mode '{0}' (expected normal, noop or backfill)")]
    InvalidSyncMode(String),
}

/// Errors from decoding a single line of sync tool output.
#[derive(Debug, Error)]
pub enum LogLineError {
    /// The line is not a JSON log record.
    #[error("invalid JSON log line: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The line was longer than the reader accepts.
    #[error("log line of {len} bytes exceeds the {limit} byte limit")]
    TooLong {
        /// Length of the line in bytes.
        len: usize,
        /// The configured limit.
        limit: usize,
    },
}

/// Errors from a single sync tool attempt.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// The process could not be started.
    #[error("start sling: {0}")]
    Spawn(#[source] std::io::Error),

    /// The child was started without a stdout pipe.
    #[error("sling stdout was not captured")]
    MissingStdout,

    /// Reading the output stream failed.
    #[error("read sling output: {0}")]
    Read(#[source] std::io::Error),

    /// Waiting for the process failed.
    #[error("wait for sling: {0}")]
    Wait(#[source] std::io::Error),

    /// The process exited unsuccessfully.
    #[error("sling exited with {0}")]
    ExitStatus(ExitStatus),

    /// The attempt exceeded its deadline.
    #[error("sling run timed out after {}", humantime::format_duration(*.0))]
    TimedOut(Duration),

    /// The attempt was cancelled by the host.
    #[error("sling run cancelled: {0}")]
    Cancelled(String),

    /// A scripted failure from the test collaborators.
    #[cfg(any(test, feature = "testing"))]
    #[error("{0}")]
    Other(String),
}

/// Errors from clearing the state location.
#[derive(Debug, Error)]
pub enum StateResetError {
    /// The state location could not be parsed.
    #[error("parse state location '{location}': {reason}")]
    InvalidLocation {
        /// The configured location.
        location: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Removing the state path failed.
    #[error("remove state path {}: {source}", .path.display())]
    Remove {
        /// The path that could not be removed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors from setting up or tearing down logging and span export.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The OTLP span exporter could not be built.
    #[error("build span exporter: {0}")]
    Exporter(#[source] opentelemetry::trace::TraceError),

    /// A global subscriber was already installed.
    #[error("install log subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),

    /// Flushing spans on shutdown failed.
    #[error("flush spans: {0}")]
    Shutdown(#[source] opentelemetry::trace::TraceError),
}

/// Result type alias for wrapper operations.
pub type Result<T, E = WrapperError> = std::result::Result<T, E>;
