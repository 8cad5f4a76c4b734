//! Process-wide structured logging and span export setup.

use opentelemetry::trace::{TraceError, TracerProvider as _};
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::RunConfig;
use crate::errors::TelemetryError;

/// Service name reported on exported spans.
pub const SERVICE_NAME: &str = "sling-sync-wrapper";

/// Output format for wrapper logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable text.
    Text,
}

/// Where and as whom spans are exported over OTLP/gRPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtlpSettings {
    /// Collector address, with or without an `http://` scheme.
    pub endpoint: String,
    /// `service.name` resource attribute.
    pub service_name: String,
    /// `mission_cluster_id` resource attribute.
    pub mission_cluster_id: String,
}

impl OtlpSettings {
    /// Export settings for a run, or `None` when the endpoint is empty.
    #[must_use]
    pub fn from_config(config: &RunConfig) -> Option<Self> {
        let endpoint = config.otel_endpoint.trim();
        if endpoint.is_empty() {
            return None;
        }
        Some(Self {
            endpoint: endpoint.to_string(),
            service_name: SERVICE_NAME.to_string(),
            mission_cluster_id: config.mission_cluster_id.clone(),
        })
    }

    /// The collector URL. Bare `host:port` endpoints are plaintext gRPC.
    #[must_use]
    pub fn collector_url(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            format!("http://{}", self.endpoint)
        }
    }

    fn resource(&self) -> Resource {
        Resource::new([
            KeyValue::new("service.name", self.service_name.clone()),
            KeyValue::new("mission_cluster_id", self.mission_cluster_id.clone()),
        ])
    }

    /// Builds a batching tracer provider. Must run inside a Tokio runtime.
    pub fn build_provider(&self) -> Result<TracerProvider, TraceError> {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(self.collector_url())
            .build()?;

        Ok(TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_resource(self.resource())
            .build())
    }
}

/// Keeps the span exporter alive; call [`TelemetryGuard::shutdown`] before
/// exiting so buffered spans are flushed.
#[must_use = "dropping the guard without shutdown can lose buffered spans"]
#[derive(Default)]
pub struct TelemetryGuard {
    provider: Option<TracerProvider>,
}

impl TelemetryGuard {
    /// True if spans are exported to a collector.
    pub fn is_exporting(&self) -> bool {
        self.provider.is_some()
    }

    /// Flushes pending spans and stops the exporter.
    pub async fn shutdown(self) -> Result<(), TelemetryError> {
        let Some(provider) = self.provider else {
            return Ok(());
        };
        // Shutdown blocks until the batch task has drained.
        tokio::task::spawn_blocking(move || provider.shutdown())
            .await
            .map_err(|err| TelemetryError::Shutdown(TraceError::Other(Box::new(err))))?
            .map_err(TelemetryError::Shutdown)
    }
}

impl std::fmt::Debug for TelemetryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryGuard")
            .field("exporting", &self.is_exporting())
            .finish()
    }
}

/// Installs the global subscriber writing to stderr, exporting spans over
/// OTLP when `otlp` is given.
///
/// The filter comes from `RUST_LOG` and falls back to `info`. Calling this
/// twice returns an error rather than replacing the first subscriber.
pub fn init_logging(
    format: LogFormat,
    otlp: Option<&OtlpSettings>,
) -> Result<TelemetryGuard, TelemetryError> {
    let provider = otlp
        .map(OtlpSettings::build_provider)
        .transpose()
        .map_err(TelemetryError::Exporter)?;
    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME))
    });

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter).with(otel_layer);

    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()?,
    }

    Ok(TelemetryGuard { provider })
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::Key;
    use pretty_assertions::assert_eq;

    fn settings(endpoint: &str) -> OtlpSettings {
        OtlpSettings::from_config(
            &RunConfig::new()
                .with_otel_endpoint(endpoint)
                .with_mission_cluster_id("mission-7"),
        )
        .expect("endpoint is set")
    }

    #[test]
    fn test_default_format_is_json() {
        assert_eq!(LogFormat::default(), LogFormat::Json);
    }

    #[test]
    fn test_second_init_fails() {
        // The first call may lose the race with another test's subscriber;
        // either way a repeated init must report an error, not panic.
        let _ = init_logging(LogFormat::Text, None);
        assert!(matches!(
            init_logging(LogFormat::Json, None),
            Err(TelemetryError::Subscriber(_))
        ));
    }

    #[test]
    fn test_empty_endpoint_disables_export() {
        let config = RunConfig::new().with_otel_endpoint("  ");
        assert_eq!(OtlpSettings::from_config(&config), None);
    }

    #[test]
    fn test_collector_url_defaults_to_plaintext_grpc() {
        assert_eq!(settings("collector:4317").collector_url(), "http://collector:4317");
        assert_eq!(
            settings("https://otel.example.com:4317").collector_url(),
            "https://otel.example.com:4317"
        );
    }

    #[test]
    fn test_resource_names_service_and_mission() {
        let resource = settings("localhost:4317").resource();
        assert_eq!(
            resource.get(Key::new("service.name")).map(|v| v.to_string()),
            Some(SERVICE_NAME.to_string())
        );
        assert_eq!(
            resource.get(Key::new("mission_cluster_id")).map(|v| v.to_string()),
            Some("mission-7".to_string())
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_exporting_guard_shuts_down() {
        let provider = settings("localhost:4317").build_provider().expect("exporter");
        let guard = TelemetryGuard {
            provider: Some(provider),
        };
        assert!(guard.is_exporting());

        // No spans were recorded, so nothing needs to reach a collector.
        let _ = tokio::time::timeout(std::time::Duration::from_secs(10), guard.shutdown())
            .await
            .expect("shutdown should not hang");
    }

    #[tokio::test]
    async fn test_disabled_guard_shuts_down_cleanly() {
        let guard = TelemetryGuard::default();
        assert!(!guard.is_exporting());
        assert!(guard.shutdown().await.is_ok());
    }
}
