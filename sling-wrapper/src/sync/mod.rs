//! Running the Sling CLI once and turning its output into span data.
//!
//! - [`process_log_line`] decodes one JSON log line
//! - [`LineReader`] splits subprocess output into bounded lines
//! - [`CommandLauncher`] builds the process for an invocation
//! - [`SyncRunner`] drives one attempt end to end

mod launcher;
mod log_line;
mod reader;
mod runner;

pub use launcher::{
    CommandLauncher, SlingLauncher, SyncInvocation, ENV_SLING_CONFIG, ENV_SLING_STATE,
    ENV_SYNC_JOB_ID,
};
pub use log_line::{
    process_log_line, process_oversized_line, DecodedLine, LogRecord, MAX_LOG_LINE_BYTES,
};
pub use reader::{LineReader, OutputLine};
pub use runner::{AttemptOutcome, SyncAttempt, SyncRunner};
