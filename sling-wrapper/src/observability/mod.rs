//! Observability utilities.

mod logging;
mod tracing;

pub use self::logging::{init_logging, LogFormat, OtlpSettings, TelemetryGuard, SERVICE_NAME};
pub use self::tracing::{
    AttributeValue, LoggingTracer, NoopTracer, PipelineSpan, SpanBackend, SpanData, SpanEvent,
    SpanTimer, Tracer, SYNC_RUN_SPAN,
};
