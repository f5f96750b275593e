//! Span records
//!
//! A span is one timed operation in a trace. Spans are plain data; the
//! [`Tracer`](super::Tracer) creates them and hands finished ones to an exporter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome recorded on a span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error,
}

/// What side of a call a span represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    #[default]
    Internal,
    /// Outgoing call, such as a provider request
    Client,
    Server,
}

/// Timestamped point event inside a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// One timed operation within a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub name: String,
    pub trace_id: String,
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub kind: SpanKind,
    #[serde(default)]
    pub status: SpanStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SpanEvent>,
}

impl Span {
    pub fn new(name: impl Into<String>, trace_id: impl Into<String>, parent: Option<String>) -> Self {
        Self {
            name: name.into(),
            trace_id: trace_id.into(),
            span_id: uuid::Uuid::new_v4().simple().to_string()[..16].to_string(),
            parent_span_id: parent,
            start_time: Utc::now(),
            end_time: None,
            attributes: Map::new(),
            kind: SpanKind::Internal,
            status: SpanStatus::Unset,
            events: Vec::new(),
        }
    }

    /// Wall time between start and end; `None` while the span is open
    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Events with the given name, in the order they were added
    pub fn events_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SpanEvent> + 'a {
        self.events.iter().filter(move |e| e.name == name)
    }

    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }
}

/// Identity of a span, enough to parent children under it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanContext {
    pub trace_id: String,
    pub span_id: String,
}
