//! Scripted collaborators for pipeline runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

use crate::cancellation::CancellationToken;
use crate::errors::AttemptError;
use crate::observability::PipelineSpan;
use crate::pipeline::Sleeper;
use crate::state::StateRemover;
use crate::sync::{AttemptOutcome, CommandLauncher, SyncAttempt, SyncInvocation};

/// Replays a fixed sequence of attempt outcomes.
///
/// Once the script runs out, every further attempt fails.
#[derive(Debug, Default)]
pub struct ScriptedAttempts {
    outcomes: Mutex<VecDeque<AttemptOutcome>>,
    invocations: Mutex<Vec<SyncInvocation>>,
}

impl ScriptedAttempts {
    /// Creates a script from outcomes, consumed front to back.
    #[must_use]
    pub fn new(outcomes: impl IntoIterator<Item = AttemptOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Fails `failures` times, then succeeds. No attempt reports rows.
    #[must_use]
    pub fn failing_then_success(failures: usize) -> Self {
        Self::new(
            (1..=failures)
                .map(|n| AttemptOutcome::failed(0, AttemptError::Other(format!("fail {n}"))))
                .chain(std::iter::once(AttemptOutcome::succeeded(0))),
        )
    }

    /// Returns the number of attempts made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.invocations.lock().len()
    }

    /// Returns the invocations in the order they were attempted.
    #[must_use]
    pub fn invocations(&self) -> Vec<SyncInvocation> {
        self.invocations.lock().clone()
    }
}

#[async_trait]
impl SyncAttempt for ScriptedAttempts {
    async fn run_once(
        &self,
        invocation: &SyncInvocation,
        _span: &PipelineSpan,
        _cancel: &CancellationToken,
    ) -> AttemptOutcome {
        self.invocations.lock().push(invocation.clone());
        let next = self.outcomes.lock().pop_front();
        next.unwrap_or_else(|| {
            AttemptOutcome::failed(0, AttemptError::Other("no scripted outcome left".into()))
        })
    }
}

/// Records backoff waits instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Creates a new recording sleeper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every requested wait in order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        tokio::task::yield_now().await;
    }
}

/// Records removal requests and optionally fails them.
#[derive(Debug, Default)]
pub struct RecordingRemover {
    removed: Mutex<Vec<PathBuf>>,
    failure: Option<io::ErrorKind>,
}

impl RecordingRemover {
    /// Creates a remover that succeeds without touching the filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a remover that fails every call with `kind`.
    #[must_use]
    pub fn failing(kind: io::ErrorKind) -> Self {
        Self {
            removed: Mutex::new(Vec::new()),
            failure: Some(kind),
        }
    }

    /// Returns every path passed to the remover.
    #[must_use]
    pub fn removed(&self) -> Vec<PathBuf> {
        self.removed.lock().clone()
    }
}

impl StateRemover for RecordingRemover {
    fn remove_all(&self, path: &Path) -> io::Result<()> {
        self.removed.lock().push(path.to_path_buf());
        match self.failure {
            Some(kind) => Err(io::Error::new(kind, "scripted removal failure")),
            None => Ok(()),
        }
    }
}

/// Runs a shell script in place of the Sling binary.
///
/// The script gets the invocation's environment but not its arguments. It
/// is run through `/bin/sh` rather than executed directly.
#[derive(Debug)]
pub struct ScriptLauncher {
    script: PathBuf,
    invocations: Mutex<Vec<SyncInvocation>>,
}

impl ScriptLauncher {
    /// Creates a launcher for a script path.
    #[must_use]
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Returns the invocations seen so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<SyncInvocation> {
        self.invocations.lock().clone()
    }
}

impl CommandLauncher for ScriptLauncher {
    fn command(&self, invocation: &SyncInvocation) -> Command {
        self.invocations.lock().push(invocation.clone());
        let mut command = Command::new("/bin/sh");
        command.arg(&self.script).envs(invocation.envs());
        command
    }
}

/// Writes an executable `#!/bin/sh` script named `name` into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> io::Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}"))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(path)
}
