//! Command-line interface.
//!
//! Every flag can also be set through the environment variable named in
//! its help text. Durations use humantime syntax such as `5s` or `1h 30m`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{
    RunConfig, SyncMode, DEFAULT_MISSION_CLUSTER_ID, DEFAULT_OTEL_ENDPOINT, DEFAULT_SLING_BINARY,
    DEFAULT_STATE_LOCATION,
};
use crate::observability::LogFormat;
use crate::pipeline::BackoffStrategy;

/// Runs Sling pipelines with retries, backoff, tracing and state reset.
#[derive(Debug, Parser)]
#[command(name = "sling-sync-wrapper")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Mission/cluster identifier attached to every span.
    #[arg(long, env = "MISSION_CLUSTER_ID", default_value = DEFAULT_MISSION_CLUSTER_ID)]
    pub mission_cluster_id: String,

    /// Single pipeline file to run.
    #[arg(long = "config", env = "SLING_CONFIG")]
    pub pipeline_file: Option<PathBuf>,

    /// Directory of `*.yaml` pipeline files to run.
    #[arg(long, env = "PIPELINE_DIR")]
    pub pipeline_dir: Option<PathBuf>,

    /// Sync state location.
    #[arg(long = "state", env = "SLING_STATE", default_value = DEFAULT_STATE_LOCATION)]
    pub state_location: String,

    /// OTLP/gRPC collector endpoint. Empty disables span export.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT", default_value = DEFAULT_OTEL_ENDPOINT)]
    pub otel_endpoint: String,

    /// Maximum attempts per pipeline.
    #[arg(long, env = "SYNC_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Wait before the first retry.
    #[arg(long, env = "SYNC_BACKOFF_BASE", default_value = "5s", value_parser = humantime::parse_duration)]
    pub backoff_base: Duration,

    /// How the wait grows between retries.
    #[arg(long, env = "SYNC_BACKOFF_STRATEGY", value_enum, default_value_t = BackoffStrategy::Exponential)]
    pub backoff_strategy: BackoffStrategy,

    /// Sling binary to run.
    #[arg(long, env = "SLING_BIN", default_value = DEFAULT_SLING_BINARY)]
    pub sling_binary: PathBuf,

    /// Deadline for a single Sling attempt.
    #[arg(long, env = "SLING_TIMEOUT", default_value = "30m", value_parser = humantime::parse_duration)]
    pub sling_timeout: Duration,

    /// Log output format.
    #[arg(long, env = "WRAPPER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Run every pipeline with retries.
    Run,
    /// Clear the sync state so the next run starts from scratch.
    Backfill,
    /// Show which pipelines would run without running them.
    Noop,
}

impl Commands {
    /// The sync mode this subcommand selects.
    #[must_use]
    pub const fn sync_mode(self) -> SyncMode {
        match self {
            Self::Run => SyncMode::Normal,
            Self::Backfill => SyncMode::Backfill,
            Self::Noop => SyncMode::Noop,
        }
    }
}

impl Cli {
    /// Builds the run configuration from parsed flags.
    #[must_use]
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            mission_cluster_id: self.mission_cluster_id.clone(),
            pipeline_file: self.pipeline_file.clone(),
            pipeline_dir: self.pipeline_dir.clone(),
            state_location: self.state_location.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            sync_mode: self.command.sync_mode(),
            max_retries: self.max_retries,
            backoff_base: self.backoff_base,
            backoff_strategy: self.backoff_strategy,
            sling_binary: self.sling_binary.clone(),
            sling_timeout: self.sling_timeout,
        }
    }
}
