//! A tracer that captures spans for assertions.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::observability::{AttributeValue, PipelineSpan, SpanBackend, SpanData, SpanEvent, Tracer};

/// Tracer that records spans in memory.
///
/// Spans show up in [`RecordingTracer::ended`] once they end.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    ended: Arc<Mutex<Vec<SpanData>>>,
}

impl RecordingTracer {
    /// Creates a new recording tracer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all ended spans in the order they ended.
    #[must_use]
    pub fn ended(&self) -> Vec<SpanData> {
        self.ended.lock().clone()
    }

    /// Returns the number of ended spans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ended.lock().len()
    }

    /// Returns true if no span has ended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ended.lock().is_empty()
    }
}

struct RecordingSpan {
    data: Mutex<SpanData>,
    sink: Arc<Mutex<Vec<SpanData>>>,
}

impl SpanBackend for RecordingSpan {
    fn set_attribute(&self, key: &str, value: AttributeValue) {
        self.data.lock().attributes.insert(key.to_string(), value);
    }

    fn add_event(&self, name: &str, attributes: BTreeMap<String, AttributeValue>) {
        self.data.lock().events.push(SpanEvent {
            name: name.to_string(),
            attributes,
            timestamp: Utc::now(),
        });
    }

    fn record_error(&self, message: &str) {
        self.data.lock().errors.push(message.to_string());
    }

    fn end(&self) {
        let data = self.data.lock().clone();
        self.sink.lock().push(data);
    }
}

impl Tracer for RecordingTracer {
    fn start_span(&self, name: &str) -> PipelineSpan {
        PipelineSpan::new(
            name,
            Box::new(RecordingSpan {
                data: Mutex::new(SpanData::new(name)),
                sink: self.ended.clone(),
            }),
        )
    }
}
