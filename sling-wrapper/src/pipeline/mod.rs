//! Pipeline runs.
//!
//! This module provides:
//! - Backoff between sync attempts
//! - The per-pipeline run state machine
//! - The coordinator that runs every discovered pipeline

mod backoff;
mod coordinator;
mod job;
mod machine;

#[cfg(test)]
mod integration_tests;

pub use backoff::{BackoffPolicy, BackoffStrategy, Sleeper, TokioSleeper};
pub use coordinator::{RunCoordinator, RunSummary};
pub use job::{PipelineJob, RunStatus};
pub use machine::{PipelineExecutor, RunOutcome};
