//! Tracer and active span handles
//!
//! The tracer is passed explicitly to whatever needs it. An [`ActiveSpan`] is
//! exported when it ends; one dropped without ending (a cancelled future) is
//! still exported, marked as an error with `cancelled = true`.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::error::AgentError;
use crate::observability::exporter::{NoopExporter, SpanExporter};
use crate::observability::span::{Span, SpanContext, SpanEvent, SpanKind, SpanStatus};

/// Creates spans and routes finished ones to an exporter
#[derive(Clone)]
pub struct Tracer {
    exporter: Arc<dyn SpanExporter>,
}

impl Tracer {
    pub fn new(exporter: Arc<dyn SpanExporter>) -> Self {
        Self { exporter }
    }

    /// Tracer that only logs finished spans
    pub fn noop() -> Self {
        Self::new(Arc::new(NoopExporter))
    }

    /// Start a root span in the given trace
    pub fn start_trace(&self, name: &str, trace_id: &str) -> ActiveSpan {
        self.open(Span::new(name, trace_id, None))
    }

    /// Start a span under an existing one
    pub fn start_span(&self, name: &str, parent: &SpanContext) -> ActiveSpan {
        self.open(Span::new(
            name,
            parent.trace_id.clone(),
            Some(parent.span_id.clone()),
        ))
    }

    fn open(&self, span: Span) -> ActiveSpan {
        ActiveSpan {
            tracer: self.clone(),
            span: Some(span),
        }
    }

    fn finish(&self, span: &Span) {
        debug!(
            span = %span.name,
            trace_id = %span.trace_id,
            span_id = %span.span_id,
            status = ?span.status,
            duration_ms = span.duration_ms().unwrap_or_default(),
            "span finished"
        );
        if let Err(e) = self.exporter.export(span) {
            warn!(span = %span.name, error = %e, "failed to export span");
        }
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

/// An open span. End it with [`ActiveSpan::end`].
#[derive(Debug)]
pub struct ActiveSpan {
    tracer: Tracer,
    span: Option<Span>,
}

impl ActiveSpan {
    /// Identity for parenting child spans
    pub fn context(&self) -> SpanContext {
        match &self.span {
            Some(span) => SpanContext {
                trace_id: span.trace_id.clone(),
                span_id: span.span_id.clone(),
            },
            None => SpanContext {
                trace_id: String::new(),
                span_id: String::new(),
            },
        }
    }

    /// Start a child span
    pub fn child(&self, name: &str) -> ActiveSpan {
        self.tracer.start_span(name, &self.context())
    }

    pub fn set_attribute(&mut self, key: &str, value: impl Into<Value>) {
        if let Some(span) = self.span.as_mut() {
            span.attributes.insert(key.to_string(), value.into());
        }
    }

    pub fn set_kind(&mut self, kind: SpanKind) {
        if let Some(span) = self.span.as_mut() {
            span.kind = kind;
        }
    }

    /// Record a timestamped event on the span
    pub fn add_event(&mut self, name: &str, attributes: Map<String, Value>) {
        if let Some(span) = self.span.as_mut() {
            span.events.push(SpanEvent {
                name: name.to_string(),
                timestamp: Utc::now(),
                attributes,
            });
        }
    }

    pub fn set_ok(&mut self) {
        if let Some(span) = self.span.as_mut() {
            span.status = SpanStatus::Ok;
        }
    }

    /// Mark the span failed and record the error kind and message
    pub fn record_error(&mut self, err: &AgentError) {
        self.set_attribute("error.kind", err.kind());
        self.set_attribute("error.message", err.to_string());
        let mut event = Map::new();
        event.insert("error.kind".to_string(), Value::from(err.kind()));
        event.insert("error.message".to_string(), Value::from(err.to_string()));
        self.add_event("error", event);
        if let Some(span) = self.span.as_mut() {
            span.status = SpanStatus::Error;
        }
    }

    /// Close and export the span
    pub fn end(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Some(mut span) = self.span.take() {
            span.end_time = Some(Utc::now());
            self.tracer.finish(&span);
        }
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        if let Some(span) = self.span.as_mut() {
            span.status = SpanStatus::Error;
            span.attributes
                .insert("cancelled".to_string(), Value::Bool(true));
        }
        self.close();
    }
}
