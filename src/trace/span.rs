//! Spans: one traced unit of work.
//!
//! # Lifecycle
//! ```text
//! SpanBuilder::start → Span (tags mutable, outcome unset)
//!     → set_outcome (first call wins)
//!     → finish (first call reports, later calls are no-ops)
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;

use crate::observability::metrics;
use crate::trace::context::TraceContext;
use crate::trace::tracer::SpanReporter;

/// Value attached to a span tag.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Str(String),
    Bool(bool),
    Int(i64),
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Str(v.to_string())
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Str(v)
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        TagValue::Bool(v)
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Int(v)
    }
}

impl From<u16> for TagValue {
    fn from(v: u16) -> Self {
        TagValue::Int(i64::from(v))
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Str(s) => f.write_str(s),
            TagValue::Bool(b) => write!(f, "{}", b),
            TagValue::Int(i) => write!(f, "{}", i),
        }
    }
}

/// Terminal result of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Error => "error",
        }
    }
}

/// Record of a span handed to a [`SpanReporter`] when it finishes.
#[derive(Debug, Clone)]
pub struct FinishedSpan {
    pub name: String,
    pub context: TraceContext,
    pub parent: Option<TraceContext>,
    pub start_time: SystemTime,
    pub duration: Duration,
    pub tags: BTreeMap<String, TagValue>,
    pub outcome: Option<Outcome>,
}

impl FinishedSpan {
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }
}

/// Configuration for a span that has not started yet.
#[derive(Clone)]
pub struct SpanBuilder {
    name: String,
    parent: Option<TraceContext>,
    tags: Vec<(String, TagValue)>,
    reporter: Arc<dyn SpanReporter>,
}

impl SpanBuilder {
    pub fn new(name: impl Into<String>, reporter: Arc<dyn SpanReporter>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            tags: Vec::new(),
            reporter,
        }
    }

    /// Make the span a child of `parent`.
    pub fn child_of(mut self, parent: Option<TraceContext>) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&TraceContext> {
        self.parent.as_ref()
    }

    /// Start the span now.
    pub fn start(self) -> Span {
        let context = match &self.parent {
            Some(parent) => parent.new_child(),
            None => TraceContext::new_root(),
        };

        Span {
            inner: Arc::new(SpanInner {
                name: self.name,
                context,
                parent: self.parent,
                start_time: SystemTime::now(),
                started: Instant::now(),
                reporter: self.reporter,
                state: Mutex::new(SpanState {
                    tags: self.tags.into_iter().collect(),
                    outcome: None,
                    finished: false,
                }),
            }),
        }
    }
}

impl fmt::Debug for SpanBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanBuilder")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("tags", &self.tags)
            .finish()
    }
}

struct SpanInner {
    name: String,
    context: TraceContext,
    parent: Option<TraceContext>,
    start_time: SystemTime,
    started: Instant,
    reporter: Arc<dyn SpanReporter>,
    state: Mutex<SpanState>,
}

struct SpanState {
    tags: BTreeMap<String, TagValue>,
    outcome: Option<Outcome>,
    finished: bool,
}

/// Handle to a started span. Clones refer to the same span.
#[derive(Clone)]
pub struct Span {
    inner: Arc<SpanInner>,
}

impl Span {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Context to propagate to downstream services.
    pub fn context(&self) -> TraceContext {
        self.inner.context
    }

    pub fn parent(&self) -> Option<TraceContext> {
        self.inner.parent
    }

    /// Set a tag. Ignored once the span is finished.
    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<TagValue>) {
        let mut state = self.inner.state.lock();
        if !state.finished {
            state.tags.insert(key.into(), value.into());
        }
    }

    pub fn tag(&self, key: &str) -> Option<TagValue> {
        self.inner.state.lock().tags.get(key).cloned()
    }

    /// Record the outcome. Returns false if one was already recorded.
    pub fn set_outcome(&self, outcome: Outcome) -> bool {
        let mut state = self.inner.state.lock();
        if state.finished || state.outcome.is_some() {
            return false;
        }
        state.outcome = Some(outcome);
        true
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.inner.state.lock().outcome
    }

    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().finished
    }

    /// Finish the span and report it. Returns false if already finished.
    pub fn finish(&self) -> bool {
        let finished = {
            let mut state = self.inner.state.lock();
            if state.finished {
                return false;
            }
            state.finished = true;
            FinishedSpan {
                name: self.inner.name.clone(),
                context: self.inner.context,
                parent: self.inner.parent,
                start_time: self.inner.start_time,
                duration: self.inner.started.elapsed(),
                tags: state.tags.clone(),
                outcome: state.outcome,
            }
        };

        metrics::record_span_finished(finished.outcome);
        self.inner.reporter.report(finished);
        true
    }

    /// Whether two handles refer to the same span.
    pub fn same_span(&self, other: &Span) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("name", &self.inner.name)
            .field("context", &self.inner.context)
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::tracer::InMemoryReporter;

    #[test]
    fn test_finish_reports_once() {
        let reporter = Arc::new(InMemoryReporter::new());
        let span = SpanBuilder::new("GET /users", reporter.clone())
            .with_tag("http.method", "GET")
            .start();

        span.set_tag("http.status_code", 200u16);
        assert!(span.set_outcome(Outcome::Ok));
        assert!(span.finish());
        assert!(!span.finish());

        let spans = reporter.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].tag("http.method"), Some(&TagValue::from("GET")));
        assert_eq!(spans[0].tag("http.status_code"), Some(&TagValue::Int(200)));
        assert_eq!(spans[0].outcome, Some(Outcome::Ok));
    }

    #[test]
    fn test_outcome_set_once() {
        let span = SpanBuilder::new("op", Arc::new(InMemoryReporter::new())).start();
        assert!(span.set_outcome(Outcome::Error));
        assert!(!span.set_outcome(Outcome::Ok));
        assert_eq!(span.outcome(), Some(Outcome::Error));
    }

    #[test]
    fn test_frozen_after_finish() {
        let span = SpanBuilder::new("op", Arc::new(InMemoryReporter::new())).start();
        span.finish();
        span.set_tag("late", true);
        assert_eq!(span.tag("late"), None);
        assert!(!span.set_outcome(Outcome::Ok));
    }

    #[test]
    fn test_child_of_parent() {
        let parent = TraceContext::new_root();
        let span = SpanBuilder::new("op", Arc::new(InMemoryReporter::new()))
            .child_of(Some(parent))
            .start();
        assert_eq!(span.context().trace_id, parent.trace_id);
        assert_ne!(span.context().span_id, parent.span_id);
        assert_eq!(span.parent(), Some(parent));
    }
}
