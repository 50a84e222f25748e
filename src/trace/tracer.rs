//! Tracer: span creation, propagation, and the active span.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::trace::context::{Carrier, TraceContext, TRACEPARENT};
use crate::trace::span::{FinishedSpan, Span, SpanBuilder};

tokio::task_local! {
    static ACTIVE_SPAN: Span;
}

/// The span active for the current task or callback, if any.
pub fn active_span() -> Option<Span> {
    ACTIVE_SPAN.try_with(Span::clone).ok()
}

/// Run a synchronous callback with `span` as the active span.
pub fn with_active_span<R>(span: &Span, f: impl FnOnce() -> R) -> R {
    ACTIVE_SPAN.sync_scope(span.clone(), f)
}

/// Drive `future` with `span` as the active span across all of its polls.
pub async fn in_span<F: Future>(span: Span, future: F) -> F::Output {
    ACTIVE_SPAN.scope(span, future).await
}

/// Destination for finished spans.
pub trait SpanReporter: Send + Sync {
    fn report(&self, span: FinishedSpan);
}

/// Emits each finished span as a structured log event.
#[derive(Debug, Default)]
pub struct LogReporter;

impl SpanReporter for LogReporter {
    fn report(&self, span: FinishedSpan) {
        let tags = span
            .tags
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");

        tracing::info!(
            span = %span.name,
            trace_id = %format!("{:032x}", span.context.trace_id),
            span_id = %format!("{:016x}", span.context.span_id),
            parent_id = ?span.parent.map(|p| format!("{:016x}", p.span_id)),
            outcome = span.outcome.map(|o| o.as_str()).unwrap_or("unset"),
            duration_us = span.duration.as_micros() as u64,
            tags = %tags,
            "Span finished"
        );
    }
}

/// Collects finished spans in memory.
#[derive(Debug, Default)]
pub struct InMemoryReporter {
    spans: Mutex<Vec<FinishedSpan>>,
}

impl InMemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the spans reported so far.
    pub fn spans(&self) -> Vec<FinishedSpan> {
        self.spans.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.spans.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.lock().is_empty()
    }
}

impl SpanReporter for InMemoryReporter {
    fn report(&self, span: FinishedSpan) {
        self.spans.lock().push(span);
    }
}

/// Distributed tracing API used by the dispatch pipeline.
pub trait Tracer: Send + Sync {
    /// Prepare a span for `operation`, optionally parented.
    fn new_span(&self, operation: &str, parent: Option<&TraceContext>) -> SpanBuilder;

    /// Write `context` into `carrier`.
    fn inject(&self, context: &TraceContext, carrier: &mut dyn Carrier);

    /// Read a context from `carrier`.
    fn extract(&self, carrier: &dyn Carrier) -> Option<TraceContext>;

    /// The span active for the current task or callback.
    fn active_span(&self) -> Option<Span> {
        active_span()
    }
}

/// Tracer propagating W3C `traceparent` headers.
pub struct W3cTracer {
    service_name: String,
    reporter: Arc<dyn SpanReporter>,
}

impl W3cTracer {
    pub fn new(service_name: impl Into<String>, reporter: Arc<dyn SpanReporter>) -> Self {
        Self {
            service_name: service_name.into(),
            reporter,
        }
    }
}

impl Tracer for W3cTracer {
    fn new_span(&self, operation: &str, parent: Option<&TraceContext>) -> SpanBuilder {
        SpanBuilder::new(operation, self.reporter.clone())
            .child_of(parent.copied())
            .with_tag("service.name", self.service_name.as_str())
    }

    fn inject(&self, context: &TraceContext, carrier: &mut dyn Carrier) {
        carrier.set(TRACEPARENT, context.to_traceparent());
    }

    fn extract(&self, carrier: &dyn Carrier) -> Option<TraceContext> {
        carrier.get(TRACEPARENT).and_then(TraceContext::from_traceparent)
    }
}
