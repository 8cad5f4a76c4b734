//! One bounded attempt of the Sling CLI.

use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::process::Child;
use tracing::{debug, warn};

use super::launcher::{CommandLauncher, SlingLauncher, SyncInvocation};
use super::log_line::{process_log_line, process_oversized_line, MAX_LOG_LINE_BYTES};
use super::reader::{LineReader, OutputLine};
use crate::cancellation::CancellationToken;
use crate::errors::AttemptError;
use crate::observability::PipelineSpan;

/// Rows synced by one attempt and how it ended.
///
/// Rows are reported even when the attempt fails, so partial progress is
/// never lost.
#[derive(Debug)]
pub struct AttemptOutcome {
    /// Rows reported before the attempt ended.
    pub rows_synced: u64,
    /// Whether the attempt succeeded.
    pub result: Result<(), AttemptError>,
}

impl AttemptOutcome {
    /// A successful attempt.
    #[must_use]
    pub const fn succeeded(rows_synced: u64) -> Self {
        Self {
            rows_synced,
            result: Ok(()),
        }
    }

    /// A failed attempt with partial rows.
    #[must_use]
    pub const fn failed(rows_synced: u64, error: AttemptError) -> Self {
        Self {
            rows_synced,
            result: Err(error),
        }
    }

    /// Returns true if the attempt succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// A single attempt at syncing one pipeline.
#[async_trait]
pub trait SyncAttempt: Send + Sync {
    /// Runs the sync tool once, streaming its output into `span`.
    async fn run_once(
        &self,
        invocation: &SyncInvocation,
        span: &PipelineSpan,
        cancel: &CancellationToken,
    ) -> AttemptOutcome;
}

/// Runs the sync tool as a subprocess with a per-attempt deadline.
#[derive(Clone)]
pub struct SyncRunner {
    launcher: Arc<dyn CommandLauncher>,
    timeout: Duration,
    max_line_bytes: usize,
}

impl SyncRunner {
    /// Creates a runner for the real Sling CLI.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            launcher: Arc::new(SlingLauncher),
            timeout,
            max_line_bytes: MAX_LOG_LINE_BYTES,
        }
    }

    /// Replaces the process launcher.
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn CommandLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Returns the per-attempt timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for SyncRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRunner")
            .field("timeout", &self.timeout)
            .field("max_line_bytes", &self.max_line_bytes)
            .finish_non_exhaustive()
    }
}

/// How the attempt stopped, before exit status is considered.
enum Interrupt {
    TimedOut,
    Cancelled,
}

enum Exit {
    Status(io::Result<ExitStatus>),
    Interrupted(Interrupt),
}

impl SyncRunner {
    fn interrupt_error(&self, interrupt: &Interrupt, cancel: &CancellationToken) -> AttemptError {
        match interrupt {
            Interrupt::TimedOut => AttemptError::TimedOut(self.timeout),
            Interrupt::Cancelled => AttemptError::Cancelled(
                cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
            ),
        }
    }
}

/// An attempt's outcome, and whether the process may still be running.
struct Supervised {
    outcome: AttemptOutcome,
    kill: bool,
}

impl Supervised {
    fn finished(outcome: AttemptOutcome) -> Self {
        Self { outcome, kill: false }
    }

    fn abandoned(outcome: AttemptOutcome) -> Self {
        Self { outcome, kill: true }
    }
}

impl SyncRunner {
    /// Streams `output` into `span`, then waits for `wait` to report the
    /// exit status, all under the attempt deadline.
    async fn supervise<R, W>(
        &self,
        output: R,
        wait: W,
        span: &PipelineSpan,
        cancel: &CancellationToken,
    ) -> Supervised
    where
        R: AsyncRead + Unpin,
        W: Future<Output = io::Result<ExitStatus>>,
    {
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);
        tokio::pin!(wait);

        let mut reader = LineReader::new(output, self.max_line_bytes);
        let mut rows_synced = 0u64;

        // Lines are handled one at a time, in the order Sling wrote them.
        let streamed: Result<(), Result<Interrupt, io::Error>> = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break Err(Ok(Interrupt::Cancelled)),
                () = &mut deadline => break Err(Ok(Interrupt::TimedOut)),
                line = reader.next_line() => match line {
                    Ok(Some(OutputLine::Text(text))) => match process_log_line(&text, span) {
                        Ok(rows) => rows_synced = rows_synced.saturating_add(rows),
                        Err(err) => warn!(error = %err, "failed to parse Sling log line"),
                    },
                    Ok(Some(OutputLine::Oversized(len))) => {
                        let err = process_oversized_line(len, span);
                        warn!(error = %err, "skipped Sling log line");
                    }
                    Ok(None) => break Ok(()),
                    Err(err) => break Err(Err(err)),
                },
            }
        };

        match streamed {
            Ok(()) => {}
            Err(Ok(interrupt)) => {
                let err = self.interrupt_error(&interrupt, cancel);
                return Supervised::abandoned(AttemptOutcome::failed(rows_synced, err));
            }
            Err(Err(read_err)) => {
                // The read error wins, but the process is still reaped.
                let reaped = tokio::select! {
                    biased;
                    () = cancel.cancelled() => false,
                    () = &mut deadline => false,
                    _ = &mut wait => true,
                };
                let outcome = AttemptOutcome::failed(rows_synced, AttemptError::Read(read_err));
                return Supervised { outcome, kill: !reaped };
            }
        }

        let exit = tokio::select! {
            biased;
            () = cancel.cancelled() => Exit::Interrupted(Interrupt::Cancelled),
            () = &mut deadline => Exit::Interrupted(Interrupt::TimedOut),
            status = &mut wait => Exit::Status(status),
        };

        match exit {
            Exit::Status(Ok(status)) if status.success() => {
                Supervised::finished(AttemptOutcome::succeeded(rows_synced))
            }
            Exit::Status(Ok(status)) => Supervised::finished(AttemptOutcome::failed(
                rows_synced,
                AttemptError::ExitStatus(status),
            )),
            Exit::Status(Err(err)) => {
                Supervised::finished(AttemptOutcome::failed(rows_synced, AttemptError::Wait(err)))
            }
            Exit::Interrupted(interrupt) => {
                let err = self.interrupt_error(&interrupt, cancel);
                Supervised::abandoned(AttemptOutcome::failed(rows_synced, err))
            }
        }
    }
}

async fn terminate(child: &mut Child) {
    if let Err(err) = child.kill().await {
        debug!(error = %err, "failed to kill sling process");
    }
}

#[async_trait]
impl SyncAttempt for SyncRunner {
    async fn run_once(
        &self,
        invocation: &SyncInvocation,
        span: &PipelineSpan,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        let mut command = self.launcher.command(invocation);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => return AttemptOutcome::failed(0, AttemptError::Spawn(err)),
        };
        let Some(stdout) = child.stdout.take() else {
            terminate(&mut child).await;
            return AttemptOutcome::failed(0, AttemptError::MissingStdout);
        };

        let Supervised { outcome, kill } =
            self.supervise(stdout, child.wait(), span, cancel).await;
        if kill {
            terminate(&mut child).await;
        }
        outcome
    }
}
