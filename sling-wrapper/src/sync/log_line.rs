//! Decoding of Sling's JSON log output.

use serde::{Deserialize, Deserializer};

use crate::errors::LogLineError;
use crate::observability::PipelineSpan;

/// Longest log line accepted from the sync tool, in bytes.
pub const MAX_LOG_LINE_BYTES: usize = 1024 * 1024;

/// One structured log entry emitted by the Sling CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LogRecord {
    /// Log level as reported by Sling.
    #[serde(default, deserialize_with = "null_as_default")]
    pub level: String,
    /// Log message; becomes the span event name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    /// Rows reported by this line.
    #[serde(default, deserialize_with = "null_as_default")]
    pub rows: i64,
    /// Error text, if the line reports one. Empty strings decode as `None`.
    #[serde(default, deserialize_with = "non_empty")]
    pub error: Option<String>,
}

impl LogRecord {
    /// Rows this line contributes to the total. Negative counts contribute nothing.
    #[must_use]
    pub fn rows_delta(&self) -> u64 {
        u64::try_from(self.rows).unwrap_or(0)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}

/// Result of decoding one output line.
#[derive(Debug)]
pub enum DecodedLine {
    /// The line is a well-formed log record.
    Record(LogRecord),
    /// The line is not a JSON log record.
    Invalid(serde_json::Error),
}

impl DecodedLine {
    /// Decodes a single line.
    #[must_use]
    pub fn decode(line: &str) -> Self {
        match serde_json::from_str::<LogRecord>(line) {
            Ok(record) => Self::Record(record),
            Err(err) => Self::Invalid(err),
        }
    }
}

/// Processes one line of Sling output against the run span.
///
/// A record becomes an event named after its message, tagged with its level;
/// a record carrying an error also records that error on the span without
/// failing the call. A line that does not decode is recorded on the span as
/// an `invalid JSON log line` event and returned as an error, contributing no
/// rows.
pub fn process_log_line(line: &str, span: &PipelineSpan) -> Result<u64, LogLineError> {
    match DecodedLine::decode(line) {
        DecodedLine::Record(record) => {
            span.add_event(&record.message, [("log.level", record.level.as_str())]);
            if let Some(error) = &record.error {
                span.record_error_message(error);
            }
            Ok(record.rows_delta())
        }
        DecodedLine::Invalid(err) => {
            span.record_error(&err);
            span.add_event("invalid JSON log line", [("line", line)]);
            Err(LogLineError::InvalidJson(err))
        }
    }
}

/// Records a line that exceeded [`MAX_LOG_LINE_BYTES`] and was skipped.
pub fn process_oversized_line(len: usize, span: &PipelineSpan) -> LogLineError {
    let err = LogLineError::TooLong {
        len,
        limit: MAX_LOG_LINE_BYTES,
    };
    span.record_error(&err);
    span.add_event("oversized log line", [("line.bytes", len as u64)]);
    err
}
