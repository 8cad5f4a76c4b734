//! # Sling sync wrapper
//!
//! Runs Sling sync pipelines one after another, adding what the bare CLI
//! lacks:
//!
//! - **Retries with backoff**: failed attempts are retried with exponential
//!   (or linear) waits
//! - **Tracing**: one span per pipeline run, fed by Sling's JSON log lines
//! - **Safe backfill**: local sync state is cleared, refusing unsafe paths
//!   and remote stores
//! - **Cancellation**: Ctrl-C or SIGTERM stops the running attempt and any
//!   pipelines not yet started
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sling_wrapper::prelude::*;
//! use std::sync::Arc;
//!
//! let config = RunConfig::new().with_pipeline_dir("/etc/sling/pipelines");
//! let executor = PipelineExecutor::new(config, Arc::new(LoggingTracer));
//! let summary = RunCoordinator::new(executor).run_configured().await?;
//! summary.ensure_success()?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod cli;
pub mod config;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod state;
pub mod sync;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::cli::{Cli, Commands};
    pub use crate::config::{discover_pipelines, RunConfig, SyncMode};
    pub use crate::errors::{
        AttemptError, ConfigError, LogLineError, StateResetError, TelemetryError, WrapperError,
    };
    pub use crate::observability::{
        init_logging, LogFormat, LoggingTracer, NoopTracer, OtlpSettings, PipelineSpan,
        TelemetryGuard, Tracer,
    };
    pub use crate::pipeline::{
        BackoffPolicy, BackoffStrategy, PipelineExecutor, PipelineJob, RunCoordinator,
        RunOutcome, RunStatus, RunSummary,
    };
    pub use crate::state::{StateLocation, StateResetter};
    pub use crate::sync::{process_log_line, SyncAttempt, SyncInvocation, SyncRunner};
}
