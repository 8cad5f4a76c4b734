//! End-to-end tests for pipeline runs.

#[cfg(test)]
mod tests {
    use crate::config::{RunConfig, SyncMode};
    use crate::errors::{AttemptError, WrapperError};
    use crate::observability::AttributeValue;
    use crate::pipeline::{PipelineExecutor, PipelineJob, RunCoordinator, RunStatus};
    use crate::sync::{AttemptOutcome, SyncAttempt};
    use crate::testing::{RecordingRemover, RecordingSleeper, RecordingTracer, ScriptedAttempts};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        tracer: RecordingTracer,
        sleeper: Arc<RecordingSleeper>,
        remover: Arc<RecordingRemover>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tracer: RecordingTracer::new(),
                sleeper: Arc::new(RecordingSleeper::new()),
                remover: Arc::new(RecordingRemover::new()),
            }
        }

        fn executor(&self, config: RunConfig, attempt: Arc<dyn SyncAttempt>) -> PipelineExecutor {
            PipelineExecutor::new(config, Arc::new(self.tracer.clone()))
                .with_attempt(attempt)
                .with_sleeper(self.sleeper.clone())
                .with_remover(self.remover.clone())
        }

        fn statuses(&self) -> Vec<String> {
            self.tracer
                .ended()
                .iter()
                .filter_map(|s| s.attribute("status").and_then(AttributeValue::as_str).map(str::to_string))
                .collect()
        }
    }

    #[tokio::test]
    async fn test_backoff_doubles_between_attempts() {
        let fx = Fixture::new();
        let attempts = Arc::new(ScriptedAttempts::failing_then_success(3));
        let base = Duration::from_millis(250);
        let executor = fx.executor(
            RunConfig::new().with_max_retries(4).with_backoff_base(base),
            attempts.clone(),
        );

        let outcome = executor.run(&PipelineJob::new("orders.yaml")).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(attempts.calls(), 4);
        assert_eq!(fx.sleeper.sleeps(), vec![base, base * 2, base * 4]);
        assert_eq!(fx.statuses(), vec!["success"]);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_without_trailing_sleep() {
        let fx = Fixture::new();
        let attempts = Arc::new(ScriptedAttempts::failing_then_success(10));
        let executor = fx.executor(
            RunConfig::new()
                .with_max_retries(3)
                .with_backoff_base(Duration::from_secs(1)),
            attempts.clone(),
        );

        let outcome = executor.run(&PipelineJob::new("orders.yaml")).await;

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(attempts.calls(), 3);
        assert_eq!(
            fx.sleeper.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        match outcome.error() {
            Some(WrapperError::SyncFailed { pipeline, source }) => {
                assert_eq!(pipeline, "orders.yaml");
                assert_eq!(source.to_string(), "fail 3");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let span = &fx.tracer.ended()[0];
        assert_eq!(fx.statuses(), vec!["failed"]);
        assert_eq!(span.errors, vec!["fail 3".to_string()]);
    }

    #[tokio::test]
    async fn test_rows_accumulate_across_attempts() {
        let fx = Fixture::new();
        let attempts = Arc::new(ScriptedAttempts::new([
            AttemptOutcome::failed(3, AttemptError::Other("connection reset".into())),
            AttemptOutcome::succeeded(5),
        ]));
        let executor = fx.executor(RunConfig::new(), attempts.clone());

        let outcome = executor.run(&PipelineJob::new("orders.yaml")).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.rows_synced, 8);
        assert_eq!(
            fx.tracer.ended()[0]
                .attribute("rows_synced")
                .and_then(AttributeValue::as_int),
            Some(8)
        );
        assert!(fx.tracer.ended()[0].errors.is_empty());
    }

    #[tokio::test]
    async fn test_noop_and_backfill_never_run_the_sync_tool() {
        for mode in [SyncMode::Noop, SyncMode::Backfill] {
            let fx = Fixture::new();
            let attempts = Arc::new(ScriptedAttempts::failing_then_success(0));
            let executor = fx.executor(
                RunConfig::new()
                    .with_sync_mode(mode)
                    .with_state_location("file:///var/lib/sling/state"),
                attempts.clone(),
            );

            let summary = RunCoordinator::new(executor)
                .run([PathBuf::from("a.yaml"), PathBuf::from("b.yaml")])
                .await;

            assert!(summary.ensure_success().is_ok(), "{mode}");
            assert_eq!(attempts.calls(), 0, "{mode}");
            assert_eq!(fx.statuses(), vec![mode.as_str(); 2]);
        }
    }

    #[tokio::test]
    async fn test_backfill_deletes_only_local_state() {
        let cases = [
            ("file:///var/lib/sling/state", vec![PathBuf::from("/var/lib/sling/state")]),
            ("./state/../state", vec![PathBuf::from("state")]),
            ("s3://bucket/state", vec![]),
            ("gs://bucket/state", vec![]),
            ("file:///", vec![]),
            (".", vec![]),
        ];
        for (location, want) in cases {
            let fx = Fixture::new();
            let executor = fx.executor(
                RunConfig::new()
                    .with_sync_mode(SyncMode::Backfill)
                    .with_state_location(location),
                Arc::new(ScriptedAttempts::default()),
            );

            let outcome = executor.run(&PipelineJob::new("a.yaml")).await;

            assert!(outcome.is_success(), "{location}");
            assert_eq!(outcome.status, RunStatus::Backfill, "{location}");
            assert_eq!(fx.remover.removed(), want, "{location}");
        }
    }

    #[tokio::test]
    async fn test_coordinator_runs_every_pipeline_despite_failures() {
        let fx = Fixture::new();
        let attempts = Arc::new(ScriptedAttempts::new([
            AttemptOutcome::succeeded(1),
            AttemptOutcome::failed(0, AttemptError::Other("bad credentials".into())),
            AttemptOutcome::succeeded(2),
        ]));
        let executor = fx.executor(RunConfig::new().with_max_retries(1), attempts.clone());

        let summary = RunCoordinator::new(executor)
            .run(["a.yaml", "b.yaml", "c.yaml"].map(PathBuf::from))
            .await;

        assert_eq!(attempts.calls(), 3);
        assert_eq!(summary.outcomes.len(), 3);
        assert_eq!(summary.total_rows(), 3);
        assert_eq!(fx.statuses(), vec!["success", "failed", "success"]);
        assert!(matches!(
            summary.ensure_success(),
            Err(WrapperError::PipelinesFailed { failed: 1, total: 3 })
        ));

        let job_ids: Vec<String> = attempts.invocations().into_iter().map(|i| i.job_id).collect();
        assert_ne!(job_ids[0], job_ids[1]);
        assert_ne!(job_ids[1], job_ids[2]);
    }

    #[tokio::test]
    async fn test_run_configured_uses_sorted_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["20-users.yaml", "10-orders.yaml", "README.md"] {
            std::fs::write(dir.path().join(name), "").expect("write");
        }
        let fx = Fixture::new();
        let attempts = Arc::new(ScriptedAttempts::new([
            AttemptOutcome::succeeded(0),
            AttemptOutcome::succeeded(0),
        ]));
        let executor = fx.executor(
            RunConfig::new().with_pipeline_dir(dir.path()),
            attempts.clone(),
        );

        let summary = RunCoordinator::new(executor)
            .run_configured()
            .await
            .expect("discovery");

        assert!(summary.ensure_success().is_ok());
        let pipelines: Vec<PathBuf> = attempts
            .invocations()
            .into_iter()
            .map(|i| i.pipeline)
            .collect();
        assert_eq!(
            pipelines,
            vec![dir.path().join("10-orders.yaml"), dir.path().join("20-users.yaml")]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_real_subprocess_retries_until_success() {
        use crate::sync::SyncRunner;
        use crate::testing::{write_script, ScriptLauncher};

        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("attempted");
        let script = write_script(
            dir.path(),
            "sling",
            &format!(
                r#"if [ -f '{marker}' ]; then
  echo '{{"level":"info","message":"rows","rows":5}}'
  exit 0
fi
touch '{marker}'
echo '{{"level":"info","message":"rows","rows":3}}'
echo 'temporary failure' >&2
exit 1
"#,
                marker = marker.display()
            ),
        )
        .expect("script");

        let fx = Fixture::new();
        let runner = SyncRunner::new(Duration::from_secs(10))
            .with_launcher(Arc::new(ScriptLauncher::new(&script)));
        let executor = fx.executor(
            RunConfig::new()
                .with_max_retries(3)
                .with_backoff_base(Duration::from_millis(10)),
            Arc::new(runner),
        );

        let outcome = executor.run(&PipelineJob::new("orders.yaml")).await;

        assert!(outcome.is_success(), "{:?}", outcome.error());
        assert_eq!(outcome.rows_synced, 8);
        assert_eq!(fx.sleeper.sleeps(), vec![Duration::from_millis(10)]);
        assert_eq!(fx.tracer.ended()[0].event_names(), vec!["rows", "rows"]);
    }
}
