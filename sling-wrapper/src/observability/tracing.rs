//! Span handles for pipeline runs.
//!
//! A [`Tracer`] hands out [`PipelineSpan`]s. The span handle is backend
//! agnostic: [`LoggingTracer`] bridges onto the `tracing` ecosystem, while
//! the recording tracer in the `testing` module captures spans for assertions.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Name of the span opened for every pipeline run.
pub const SYNC_RUN_SPAN: &str = "sling.sync.run";

/// A typed span attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// A signed integer value.
    Int(i64),
    /// A floating point value.
    Float(f64),
    /// A boolean value.
    Bool(bool),
}

impl AttributeValue {
    /// Returns the value as a string slice, if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an integer, if it is one.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for AttributeValue {
    fn from(v: u64) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// A timestamped event attached to a span.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanEvent {
    /// Event name.
    pub name: String,
    /// Event attributes.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// When the event was added.
    pub timestamp: DateTime<Utc>,
}

impl SpanEvent {
    /// Returns an event attribute by key.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}

/// Everything recorded on a span up to the moment it ended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpanData {
    /// Span name.
    pub name: String,
    /// Span attributes; later writes to a key replace earlier ones.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Events in the order they were added.
    pub events: Vec<SpanEvent>,
    /// Error messages recorded on the span.
    pub errors: Vec<String>,
}

impl SpanData {
    /// Creates empty span data with a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Returns a span attribute by key.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Returns the names of all events in order.
    #[must_use]
    pub fn event_names(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.name.as_str()).collect()
    }
}

/// Backend for a single span.
///
/// Implementations receive each call once the [`PipelineSpan`] handle has
/// converted the arguments; `end` is called at most once.
pub trait SpanBackend: Send + Sync {
    /// Sets or replaces an attribute.
    fn set_attribute(&self, key: &str, value: AttributeValue);

    /// Adds a named event.
    fn add_event(&self, name: &str, attributes: BTreeMap<String, AttributeValue>);

    /// Records an error message.
    fn record_error(&self, message: &str);

    /// Closes the span.
    fn end(&self);
}

/// Starts spans.
pub trait Tracer: Send + Sync {
    /// Starts a new span.
    fn start_span(&self, name: &str) -> PipelineSpan;
}

/// Handle to an open span.
///
/// The span ends when [`PipelineSpan::end`] is called or when the handle is
/// dropped, whichever comes first.
pub struct PipelineSpan {
    name: String,
    backend: Box<dyn SpanBackend>,
    ended: AtomicBool,
}

impl PipelineSpan {
    /// Wraps a backend in a span handle.
    #[must_use]
    pub fn new(name: impl Into<String>, backend: Box<dyn SpanBackend>) -> Self {
        Self {
            name: name.into(),
            backend,
            ended: AtomicBool::new(false),
        }
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets or replaces an attribute.
    pub fn set_attribute(&self, key: &str, value: impl Into<AttributeValue>) {
        self.backend.set_attribute(key, value.into());
    }

    /// Adds a named event with attributes.
    pub fn add_event<K, V, I>(&self, name: &str, attributes: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<AttributeValue>,
    {
        let attributes = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.backend.add_event(name, attributes);
    }

    /// Records an error on the span.
    pub fn record_error(&self, error: &(dyn std::error::Error + '_)) {
        self.backend.record_error(&error.to_string());
    }

    /// Records an error message on the span.
    pub fn record_error_message(&self, message: &str) {
        self.backend.record_error(message);
    }

    /// Ends the span. Subsequent calls are no-ops.
    pub fn end(&self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            self.backend.end();
        }
    }

    /// Returns true once the span has ended.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

impl Drop for PipelineSpan {
    fn drop(&mut self) {
        self.end();
    }
}

impl fmt::Debug for PipelineSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineSpan")
            .field("name", &self.name)
            .field("ended", &self.is_ended())
            .finish_non_exhaustive()
    }
}

/// Tracer that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

struct NoopSpan;

impl SpanBackend for NoopSpan {
    fn set_attribute(&self, _key: &str, _value: AttributeValue) {}
    fn add_event(&self, _name: &str, _attributes: BTreeMap<String, AttributeValue>) {}
    fn record_error(&self, _message: &str) {}
    fn end(&self) {}
}

impl Tracer for NoopTracer {
    fn start_span(&self, name: &str) -> PipelineSpan {
        PipelineSpan::new(name, Box::new(NoopSpan))
    }
}

/// Tracer that bridges spans onto the `tracing` ecosystem.
///
/// Each span becomes a `sling.sync.run` tracing span. Events and errors are
/// emitted as log events inside it, and a summary event carrying every
/// attribute is emitted when the span ends.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingTracer;

struct LoggingSpan {
    span: ::tracing::Span,
    attributes: Mutex<BTreeMap<String, AttributeValue>>,
}

impl SpanBackend for LoggingSpan {
    fn set_attribute(&self, key: &str, value: AttributeValue) {
        match &value {
            AttributeValue::String(v) => self.span.record(key, v.as_str()),
            AttributeValue::Int(v) => self.span.record(key, *v),
            AttributeValue::Float(v) => self.span.record(key, *v),
            AttributeValue::Bool(v) => self.span.record(key, *v),
        };
        self.attributes.lock().insert(key.to_string(), value);
    }

    fn add_event(&self, name: &str, attributes: BTreeMap<String, AttributeValue>) {
        let level = attributes
            .get("log.level")
            .and_then(AttributeValue::as_str)
            .unwrap_or_default();
        let fields = render_attributes(&attributes);
        match level {
            "error" | "fatal" => {
                ::tracing::error!(parent: &self.span, event = name, attributes = %fields, "sling event");
            }
            "warn" | "warning" => {
                ::tracing::warn!(parent: &self.span, event = name, attributes = %fields, "sling event");
            }
            "debug" | "trace" => {
                ::tracing::debug!(parent: &self.span, event = name, attributes = %fields, "sling event");
            }
            _ => {
                ::tracing::info!(parent: &self.span, event = name, attributes = %fields, "sling event");
            }
        }
    }

    fn record_error(&self, message: &str) {
        ::tracing::error!(parent: &self.span, error = message, "span error");
    }

    fn end(&self) {
        let fields = render_attributes(&self.attributes.lock());
        ::tracing::info!(parent: &self.span, attributes = %fields, "span ended");
    }
}

fn render_attributes(attributes: &BTreeMap<String, AttributeValue>) -> String {
    attributes
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

impl Tracer for LoggingTracer {
    fn start_span(&self, name: &str) -> PipelineSpan {
        let span = ::tracing::info_span!(
            "sling.sync.run",
            otel.name = name,
            mission_cluster_id = ::tracing::field::Empty,
            sync_job_id = ::tracing::field::Empty,
            pipeline = ::tracing::field::Empty,
            state_location = ::tracing::field::Empty,
            sync_mode = ::tracing::field::Empty,
            status = ::tracing::field::Empty,
            rows_synced = ::tracing::field::Empty,
            duration_seconds = ::tracing::field::Empty,
        );
        PipelineSpan::new(
            name,
            Box::new(LoggingSpan {
                span,
                attributes: Mutex::new(BTreeMap::new()),
            }),
        )
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
}

impl SpanTimer {
    /// Starts a new timer.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Returns the elapsed time.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns the elapsed time in seconds.
    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }
}
