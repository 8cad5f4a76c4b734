//! Building the Sling process for one attempt.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Environment variable carrying the state location.
pub const ENV_SLING_STATE: &str = "SLING_STATE";
/// Environment variable carrying the job identifier.
pub const ENV_SYNC_JOB_ID: &str = "SYNC_JOB_ID";
/// Environment variable carrying the pipeline path.
pub const ENV_SLING_CONFIG: &str = "SLING_CONFIG";

/// Everything needed to invoke the sync tool for one pipeline job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncInvocation {
    /// Path to the Sling binary.
    pub binary: PathBuf,
    /// Pipeline configuration file.
    pub pipeline: PathBuf,
    /// State location URI.
    pub state_location: String,
    /// Job identifier for correlation.
    pub job_id: String,
}

impl SyncInvocation {
    /// Creates a new invocation.
    #[must_use]
    pub fn new(
        binary: impl Into<PathBuf>,
        pipeline: impl Into<PathBuf>,
        state_location: impl Into<String>,
        job_id: impl Into<String>,
    ) -> Self {
        Self {
            binary: binary.into(),
            pipeline: pipeline.into(),
            state_location: state_location.into(),
            job_id: job_id.into(),
        }
    }

    /// Command-line arguments: `sync --config <pipeline> --log-format json`.
    #[must_use]
    pub fn args(&self) -> Vec<OsString> {
        vec![
            "sync".into(),
            "--config".into(),
            self.pipeline.clone().into_os_string(),
            "--log-format".into(),
            "json".into(),
        ]
    }

    /// Environment added on top of the inherited one.
    #[must_use]
    pub fn envs(&self) -> Vec<(&'static str, OsString)> {
        vec![
            (ENV_SLING_STATE, self.state_location.clone().into()),
            (ENV_SYNC_JOB_ID, self.job_id.clone().into()),
            (ENV_SLING_CONFIG, self.pipeline.clone().into_os_string()),
        ]
    }
}

/// Builds the process for an invocation.
///
/// The runner sets up stdio, timeouts and cleanup; a launcher only decides
/// what program runs with which arguments and environment.
pub trait CommandLauncher: Send + Sync {
    /// Returns the command to spawn.
    fn command(&self, invocation: &SyncInvocation) -> Command;
}

/// Launches the real Sling CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlingLauncher;

impl CommandLauncher for SlingLauncher {
    fn command(&self, invocation: &SyncInvocation) -> Command {
        let mut command = Command::new(Path::new(&invocation.binary));
        command.args(invocation.args()).envs(invocation.envs());
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::ffi::OsStr;

    fn invocation() -> SyncInvocation {
        SyncInvocation::new("/usr/local/bin/sling", "pipes/orders.yaml", "file:///tmp/state", "job-1")
    }

    #[test]
    fn test_sling_launcher_arguments() {
        let command = SlingLauncher.command(&invocation());
        let inner = command.as_std();

        assert_eq!(inner.get_program(), OsStr::new("/usr/local/bin/sling"));
        let args: Vec<&OsStr> = inner.get_args().collect();
        assert_eq!(
            args,
            vec!["sync", "--config", "pipes/orders.yaml", "--log-format", "json"]
                .into_iter()
                .map(OsStr::new)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_sling_launcher_environment() {
        let command = SlingLauncher.command(&invocation());
        let envs: Vec<(&OsStr, Option<&OsStr>)> = command.as_std().get_envs().collect();

        for (key, value) in [
            ("SLING_STATE", "file:///tmp/state"),
            ("SYNC_JOB_ID", "job-1"),
            ("SLING_CONFIG", "pipes/orders.yaml"),
        ] {
            assert!(
                envs.contains(&(OsStr::new(key), Some(OsStr::new(value)))),
                "missing {key}={value}"
            );
        }
    }
}
