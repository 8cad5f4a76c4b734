//! Testing utilities for wrapper runs.
//!
//! This module provides:
//! - A recording tracer that keeps every ended span
//! - Scripted stand-ins for the sync tool, the backoff clock and the
//!   state remover
//! - Helpers for throwaway shell scripts posing as the Sling CLI

mod mocks;
mod recording;

pub use mocks::{
    write_script, RecordingRemover, RecordingSleeper, ScriptLauncher, ScriptedAttempts,
};
pub use recording::RecordingTracer;
