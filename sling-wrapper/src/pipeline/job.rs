//! Pipeline jobs and their terminal status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One pipeline file paired with a fresh job identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineJob {
    /// The pipeline configuration file.
    pub pipeline: PathBuf,
    /// Correlates the sync tool's output and spans for this run.
    pub job_id: Uuid,
}

impl PipelineJob {
    /// Creates a job with a new random identifier.
    #[must_use]
    pub fn new(pipeline: impl Into<PathBuf>) -> Self {
        Self::with_job_id(pipeline, Uuid::new_v4())
    }

    /// Creates a job with a known identifier.
    #[must_use]
    pub fn with_job_id(pipeline: impl Into<PathBuf>, job_id: Uuid) -> Self {
        Self {
            pipeline: pipeline.into(),
            job_id,
        }
    }

    /// Returns the pipeline path.
    #[must_use]
    pub fn pipeline(&self) -> &Path {
        &self.pipeline
    }
}

/// How a pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Nothing was run.
    Noop,
    /// State was cleared.
    Backfill,
    /// The sync tool succeeded.
    Success,
    /// The run did not succeed.
    Failed,
}

impl RunStatus {
    /// Returns the status as recorded on spans.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Backfill => "backfill",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Returns true for every status except [`RunStatus::Failed`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_ids_are_unique() {
        let a = PipelineJob::new("a.yaml");
        let b = PipelineJob::new("a.yaml");
        assert_ne!(a.job_id, b.job_id);
        assert_eq!(a.pipeline(), Path::new("a.yaml"));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(RunStatus::Noop.to_string(), "noop");
        assert_eq!(RunStatus::Failed.as_str(), "failed");
        assert!(RunStatus::Backfill.is_success());
        assert!(!RunStatus::Failed.is_success());
        assert_eq!(
            serde_json::to_string(&RunStatus::Success).expect("serialize"),
            "\"success\""
        );
    }
}
