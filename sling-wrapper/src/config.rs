//! Run configuration and pipeline discovery.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::pipeline::BackoffStrategy;

/// Default mission/cluster identifier.
pub const DEFAULT_MISSION_CLUSTER_ID: &str = "unknown-cluster";
/// Default state location.
pub const DEFAULT_STATE_LOCATION: &str = "file://./sling_state.json";
/// Default trace collector endpoint.
pub const DEFAULT_OTEL_ENDPOINT: &str = "localhost:4317";
/// Default Sling binary.
pub const DEFAULT_SLING_BINARY: &str = "sling";

/// What a run does with each pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Run the sync tool with retries.
    #[default]
    Normal,
    /// Log what would run and do nothing.
    Noop,
    /// Clear the state location instead of syncing.
    Backfill,
}

impl SyncMode {
    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Noop => "noop",
            Self::Backfill => "backfill",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "noop" => Ok(Self::Noop),
            "backfill" => Ok(Self::Backfill),
            other => Err(ConfigError::InvalidSyncMode(other.to_string())),
        }
    }
}

/// Settings for one wrapper invocation. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Identifier attached to every span.
    pub mission_cluster_id: String,
    /// A single pipeline file.
    pub pipeline_file: Option<PathBuf>,
    /// A directory of `*.yaml` pipeline files.
    pub pipeline_dir: Option<PathBuf>,
    /// Where Sling keeps its sync state.
    pub state_location: String,
    /// Trace collector endpoint.
    pub otel_endpoint: String,
    /// Selected mode.
    pub sync_mode: SyncMode,
    /// Maximum attempts per pipeline, including the first.
    pub max_retries: u32,
    /// Wait before the first retry.
    pub backoff_base: Duration,
    /// How later waits grow from the base.
    pub backoff_strategy: BackoffStrategy,
    /// Path or name of the Sling binary.
    pub sling_binary: PathBuf,
    /// Deadline for a single attempt.
    pub sling_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mission_cluster_id: DEFAULT_MISSION_CLUSTER_ID.to_string(),
            pipeline_file: None,
            pipeline_dir: None,
            state_location: DEFAULT_STATE_LOCATION.to_string(),
            otel_endpoint: DEFAULT_OTEL_ENDPOINT.to_string(),
            sync_mode: SyncMode::Normal,
            max_retries: 3,
            backoff_base: Duration::from_secs(5),
            backoff_strategy: BackoffStrategy::Exponential,
            sling_binary: PathBuf::from(DEFAULT_SLING_BINARY),
            sling_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl RunConfig {
    /// Creates a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the mission/cluster identifier.
    #[must_use]
    pub fn with_mission_cluster_id(mut self, id: impl Into<String>) -> Self {
        self.mission_cluster_id = id.into();
        self
    }

    /// Selects a single pipeline file.
    #[must_use]
    pub fn with_pipeline_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pipeline_file = Some(path.into());
        self
    }

    /// Selects a directory of pipeline files.
    #[must_use]
    pub fn with_pipeline_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.pipeline_dir = Some(path.into());
        self
    }

    /// Sets the state location.
    #[must_use]
    pub fn with_state_location(mut self, location: impl Into<String>) -> Self {
        self.state_location = location.into();
        self
    }

    /// Sets the trace collector endpoint.
    #[must_use]
    pub fn with_otel_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otel_endpoint = endpoint.into();
        self
    }

    /// Sets the sync mode.
    #[must_use]
    pub fn with_sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Sets the maximum number of attempts.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the backoff base.
    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the Sling binary.
    #[must_use]
    pub fn with_sling_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.sling_binary = binary.into();
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_sling_timeout(mut self, timeout: Duration) -> Self {
        self.sling_timeout = timeout;
        self
    }

    /// Number of attempts a normal run makes. Never less than one.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Returns the pipeline files selected by `config`, in run order.
pub fn discover_pipelines(config: &RunConfig) -> Result<Vec<PathBuf>, ConfigError> {
    match (&config.pipeline_file, &config.pipeline_dir) {
        (Some(file), Some(dir)) => Err(ConfigError::ConflictingSelection {
            file: file.clone(),
            dir: dir.clone(),
        }),
        (Some(file), None) => Ok(vec![file.clone()]),
        (None, Some(dir)) => {
            let entries = std::fs::read_dir(dir).map_err(|err| ConfigError::NoPipelines {
                detail: Some(format!("read {}: {err}", dir.display())),
            })?;
            let mut pipelines: Vec<PathBuf> = entries
                .filter_map(Result::ok)
                .filter(|entry| {
                    entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| name.ends_with(".yaml"))
                })
                .map(|entry| entry.path())
                .collect();
            if pipelines.is_empty() {
                return Err(ConfigError::NoPipelines { detail: None });
            }
            pipelines.sort();
            Ok(pipelines)
        }
        (None, None) => Err(ConfigError::NoPipelines { detail: None }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.mission_cluster_id, "unknown-cluster");
        assert_eq!(config.state_location, "file://./sling_state.json");
        assert_eq!(config.otel_endpoint, "localhost:4317");
        assert_eq!(config.sync_mode, SyncMode::Normal);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_base, Duration::from_secs(5));
        assert_eq!(config.sling_binary, PathBuf::from("sling"));
        assert_eq!(config.sling_timeout, Duration::from_secs(1800));
    }

    #[test]
    fn test_zero_retries_still_attempts_once() {
        assert_eq!(RunConfig::new().with_max_retries(0).attempts(), 1);
        assert_eq!(RunConfig::new().with_max_retries(4).attempts(), 4);
    }

    #[test]
    fn test_sync_mode_parse_and_display() {
        for mode in [SyncMode::Normal, SyncMode::Noop, SyncMode::Backfill] {
            assert_eq!(mode.to_string().parse::<SyncMode>().expect("parse"), mode);
        }
        assert_eq!(
            "Backfill".parse::<SyncMode>(),
            Err(ConfigError::InvalidSyncMode("Backfill".to_string()))
        );
    }

    #[test]
    fn test_discover_single_file() {
        let config = RunConfig::new().with_pipeline_file("pipes/orders.yaml");
        assert_eq!(
            discover_pipelines(&config).expect("discover"),
            vec![PathBuf::from("pipes/orders.yaml")]
        );
    }

    #[test]
    fn test_discover_directory_sorted_yaml_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b.yaml", "a.yaml", "notes.txt", "c.yml"] {
            std::fs::write(dir.path().join(name), "").expect("write");
        }

        let config = RunConfig::new().with_pipeline_dir(dir.path());
        assert_eq!(
            discover_pipelines(&config).expect("discover"),
            vec![dir.path().join("a.yaml"), dir.path().join("b.yaml")]
        );
    }

    #[test]
    fn test_discover_errors() {
        let empty = tempfile::tempdir().expect("tempdir");

        assert_eq!(
            discover_pipelines(&RunConfig::new()),
            Err(ConfigError::NoPipelines { detail: None })
        );
        assert_eq!(
            discover_pipelines(&RunConfig::new().with_pipeline_dir(empty.path())),
            Err(ConfigError::NoPipelines { detail: None })
        );
        assert!(matches!(
            discover_pipelines(&RunConfig::new().with_pipeline_dir(empty.path().join("missing"))),
            Err(ConfigError::NoPipelines { detail: Some(_) })
        ));
        assert!(matches!(
            discover_pipelines(
                &RunConfig::new()
                    .with_pipeline_file("a.yaml")
                    .with_pipeline_dir("pipes")
            ),
            Err(ConfigError::ConflictingSelection { .. })
        ));
    }
}
