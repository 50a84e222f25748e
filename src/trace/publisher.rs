//! Span lifecycle management around asynchronous, multi-valued pipelines.
//!
//! # State Machine
//! ```text
//! Idle ──first poll──▶ Active ──Ok(v)──▶ Active      (on_next, forward v)
//!                        │
//!                        ├──Err(e)──▶ Terminated    (on_error, outcome=error, forward e)
//!                        ├──end────▶ Terminated    (outcome=ok, forward end)
//!                        └──drop───▶ Terminated    (on_cancel)
//! ```
//! Terminated is absorbing: the inner pipeline is never polled again and no
//! hook runs, whatever it would have produced next.
//!
//! A hook that fails or panics is recorded on the span as
//! `hook.error.<event>`; the event it observed is still forwarded.
//!
//! The span is finished at the terminal event only when `finish_on_close`
//! is set; otherwise it stays open for whoever holds a handle to it.

use std::any::Any;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;

use crate::trace::hooks::{CancelHook, HookResult, SpanHooks};
use crate::trace::span::{Outcome, Span, SpanBuilder};
use crate::trace::tracer::with_active_span;

/// A cold pipeline wrapped with tracing.
///
/// Each call to [`TracingPublisher::subscribe`] builds a fresh pipeline from
/// the source factory and gives it its own span and lifecycle.
pub struct TracingPublisher<F, H> {
    source: Arc<F>,
    span_builder: SpanBuilder,
    hooks: Arc<H>,
    finish_on_close: bool,
    activate: bool,
}

impl<F, S, H> TracingPublisher<F, H>
where
    F: Fn() -> S + Send + Sync + 'static,
    S: 'static,
    H: CancelHook,
{
    pub fn new(source: F, span_builder: SpanBuilder, hooks: H) -> Self {
        Self {
            source: Arc::new(source),
            span_builder,
            hooks: Arc::new(hooks),
            finish_on_close: true,
            activate: true,
        }
    }

    /// Whether terminal events finish the span. Defaults to true.
    pub fn finish_on_close(mut self, finish_on_close: bool) -> Self {
        self.finish_on_close = finish_on_close;
        self
    }

    /// Whether the span is made active while hooks and the inner pipeline run.
    /// Defaults to true.
    pub fn activate(mut self, activate: bool) -> Self {
        self.activate = activate;
        self
    }

    /// Start a new consumption of the pipeline.
    pub fn subscribe(&self) -> TracedStream<S, H> {
        let source = self.source.clone();
        TracedStream::new(move || source(), self.span_builder.clone(), self.hooks.clone())
            .finish_on_close(self.finish_on_close)
            .activate(self.activate)
    }
}

type Source<S> = Box<dyn FnOnce() -> S + Send>;

enum State<S> {
    Idle {
        source: Source<S>,
        span_builder: SpanBuilder,
    },
    Active {
        span: Span,
        inner: Pin<Box<S>>,
    },
    Terminated,
}

/// One traced consumption of a pipeline.
///
/// The inner stream is built lazily on first poll, after the span has
/// started and `on_subscribe` has run.
pub struct TracedStream<S, H: CancelHook> {
    state: State<S>,
    hooks: Arc<H>,
    finish_on_close: bool,
    activate: bool,
}

impl<S, H: CancelHook> TracedStream<S, H> {
    pub fn new(
        source: impl FnOnce() -> S + Send + 'static,
        span_builder: SpanBuilder,
        hooks: Arc<H>,
    ) -> Self {
        Self {
            state: State::Idle {
                source: Box::new(source),
                span_builder,
            },
            hooks,
            finish_on_close: true,
            activate: true,
        }
    }

    /// Trace an already-built stream.
    pub fn from_stream(stream: S, span_builder: SpanBuilder, hooks: Arc<H>) -> Self
    where
        S: Send + 'static,
    {
        Self::new(move || stream, span_builder, hooks)
    }

    pub fn finish_on_close(mut self, finish_on_close: bool) -> Self {
        self.finish_on_close = finish_on_close;
        self
    }

    pub fn activate(mut self, activate: bool) -> Self {
        self.activate = activate;
        self
    }

    /// The span, once the stream has been polled and until it terminates.
    pub fn span(&self) -> Option<&Span> {
        match &self.state {
            State::Active { span, .. } => Some(span),
            _ => None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.state, State::Terminated)
    }

    fn scoped<R>(activate: bool, span: &Span, f: impl FnOnce() -> R) -> R {
        if activate {
            with_active_span(span, f)
        } else {
            f()
        }
    }

    /// Run a hook, recording any failure on the span instead of propagating it.
    fn run_hook(&self, span: &Span, event: &'static str, hook: impl FnOnce(&H) -> HookResult) {
        let hooks = &self.hooks;
        Self::guarded(self.activate, span, event, || hook(hooks));
    }

    /// Returned errors and panics alike end up as a `hook.error.<event>` tag.
    fn guarded(activate: bool, span: &Span, event: &'static str, f: impl FnOnce() -> HookResult) {
        let message = match panic::catch_unwind(AssertUnwindSafe(|| Self::scoped(activate, span, f))) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        tracing::warn!(span = %span.name(), event, error = %message, "Span hook failed");
        span.set_tag(format!("hook.error.{}", event), message);
    }

    fn close(&mut self, span: &Span, outcome: Outcome) {
        span.set_outcome(outcome);
        if self.finish_on_close {
            span.finish();
        }
        self.state = State::Terminated;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

impl<S, H, T, E> Stream for TracedStream<S, H>
where
    S: Stream<Item = Result<T, E>>,
    H: SpanHooks<T, E>,
{
    type Item = Result<T, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if matches!(this.state, State::Idle { .. }) {
            this.state = match mem::replace(&mut this.state, State::Terminated) {
                State::Idle { source, span_builder } => {
                    let span = span_builder.start();
                    this.run_hook(&span, "subscribe", |h| h.on_subscribe(&span));
                    let inner = Box::pin(Self::scoped(this.activate, &span, source));
                    State::Active { span, inner }
                }
                other => other,
            };
        }

        let (span, polled) = match &mut this.state {
            State::Active { span, inner } => {
                let polled = Self::scoped(this.activate, span, || inner.as_mut().poll_next(cx));
                (span.clone(), polled)
            }
            _ => return Poll::Ready(None),
        };

        match polled {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(value))) => {
                this.run_hook(&span, "next", |h| h.on_next(&value, &span));
                Poll::Ready(Some(Ok(value)))
            }
            Poll::Ready(Some(Err(error))) => {
                this.run_hook(&span, "error", |h| h.on_error(&error, &span));
                this.close(&span, Outcome::Error);
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                this.close(&span, Outcome::Ok);
                Poll::Ready(None)
            }
        }
    }
}

impl<S, H: CancelHook> Drop for TracedStream<S, H> {
    fn drop(&mut self) {
        if let State::Active { span, .. } = mem::replace(&mut self.state, State::Terminated) {
            tracing::debug!(span = %span.name(), "Traced pipeline cancelled");
            let hooks = &self.hooks;
            Self::guarded(self.activate, &span, "cancel", || {
                hooks.on_cancel(&span);
                Ok(())
            });
            if self.finish_on_close {
                span.set_tag("cancelled", true);
                span.finish();
            }
        }
    }
}
