//! Execution tracing
//!
//! Spans for every send, iteration, provider call, retry attempt and tool run,
//! exported as they finish.

pub mod exporter;
pub mod span;
pub mod tracer;

pub use exporter::{JsonlTraceExporter, MemoryExporter, NoopExporter, SpanExporter, SpanTree};
pub use span::{Span, SpanContext, SpanEvent, SpanKind, SpanStatus};
pub use tracer::{ActiveSpan, Tracer};
