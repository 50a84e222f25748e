//! Distributed tracing for outbound calls.
//!
//! # Data Flow
//! ```text
//! Tracer::new_span (parent passed explicitly, or the active span)
//!     → SpanBuilder
//!     → TracingPublisher / TracedStream wraps the call's response stream
//!         first poll:  span starts, on_subscribe injects traceparent
//!         each value:  on_next tags the span
//!         failure:     on_error tags the span, outcome = error
//!         completion:  outcome = ok
//!     → Span::finish hands a FinishedSpan to the SpanReporter
//! ```
//!
//! # Design Decisions
//! - Context is passed explicitly; the task-local active span is a fallback
//! - Hooks are a strategy object, not overridden methods
//! - Instrumentation never changes values, errors, or completion

pub mod context;
pub mod hooks;
pub mod publisher;
pub mod span;
pub mod tracer;

pub use context::{Carrier, TraceContext, TRACEPARENT};
pub use hooks::{CancelHook, HookError, HookFns, HookResult, NoopHooks, SpanHooks};
pub use publisher::{TracedStream, TracingPublisher};
pub use span::{FinishedSpan, Outcome, Span, SpanBuilder, TagValue};
pub use tracer::{
    active_span, in_span, with_active_span, InMemoryReporter, LogReporter, SpanReporter, Tracer,
    W3cTracer,
};
