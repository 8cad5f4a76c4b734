//! `sling-sync-wrapper` binary.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, Instrument};

use sling_wrapper::cancellation::CancellationToken;
use sling_wrapper::cli::Cli;
use sling_wrapper::observability::{init_logging, LoggingTracer, OtlpSettings};
use sling_wrapper::pipeline::{PipelineExecutor, RunCoordinator};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = cli.run_config();
    let otlp = OtlpSettings::from_config(&config);
    let telemetry = match init_logging(cli.log_format, otlp.as_ref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("failed to initialise logging: {err}");
            return ExitCode::FAILURE;
        }
    };

    let root = tracing::info_span!(
        "wrapper.run",
        mission_cluster_id = %config.mission_cluster_id,
        otel_endpoint = %config.otel_endpoint,
    );

    let code = match run(cli).instrument(root).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "sync run failed");
            ExitCode::FAILURE
        }
    };

    if let Err(err) = telemetry.shutdown().await {
        eprintln!("failed to flush spans: {err}");
    }
    code
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.run_config();
    info!(mode = %config.sync_mode, "starting sync wrapper");

    let cancel = Arc::new(CancellationToken::new());
    tokio::spawn(watch_signals(cancel.clone()));

    let executor = PipelineExecutor::new(config, Arc::new(LoggingTracer)).with_cancellation(cancel);
    let summary = RunCoordinator::new(executor)
        .run_configured()
        .await
        .context("sync run aborted")?;

    info!(
        pipelines = summary.outcomes.len(),
        failed = summary.failed(),
        rows = summary.total_rows(),
        "sync run finished"
    );
    summary.ensure_success()?;
    Ok(())
}

/// Cancels `cancel` on Ctrl-C or, on unix, SIGTERM.
async fn watch_signals(cancel: Arc<CancellationToken>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let reason = tokio::select! {
        () = ctrl_c => "received Ctrl-C",
        () = terminate => "received SIGTERM",
    };
    info!(reason, "shutting down");
    cancel.cancel(reason);
}
