//! Customization points for traced pipelines.
//!
//! Every hook defaults to a no-op, so an instrumentation overrides only the
//! events it cares about. Hooks observe; a failing hook is recorded on the
//! span and never changes what the pipeline emits.

use crate::trace::span::Span;

/// Error returned by a hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

pub type HookResult = Result<(), HookError>;

/// Callback fired when a consumer drops a pipeline before it terminates.
pub trait CancelHook: Send + Sync {
    fn on_cancel(&self, _span: &Span) {}
}

/// Callbacks tied to the events of a pipeline yielding `Result<T, E>` items.
pub trait SpanHooks<T, E>: CancelHook {
    /// Runs once the span has started, before the pipeline is first polled.
    fn on_subscribe(&self, _span: &Span) -> HookResult {
        Ok(())
    }

    /// Runs for every value, before it is forwarded.
    fn on_next(&self, _value: &T, _span: &Span) -> HookResult {
        Ok(())
    }

    /// Runs for the terminal failure, before it is forwarded.
    fn on_error(&self, _error: &E, _span: &Span) -> HookResult {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl CancelHook for NoopHooks {}

impl<T, E> SpanHooks<T, E> for NoopHooks {}

type SubscribeFn = Box<dyn Fn(&Span) -> HookResult + Send + Sync>;
type NextFn<T> = Box<dyn Fn(&T, &Span) -> HookResult + Send + Sync>;
type ErrorFn<E> = Box<dyn Fn(&E, &Span) -> HookResult + Send + Sync>;
type CancelFn = Box<dyn Fn(&Span) + Send + Sync>;

/// Hooks assembled from closures. Unset events fall back to no-ops.
///
/// ```
/// use mesh_dispatch::trace::hooks::HookFns;
///
/// let hooks = HookFns::<u32, String>::new()
///     .with_next(|value, span| {
///         span.set_tag("value", i64::from(*value));
///         Ok(())
///     });
/// # let _ = hooks;
/// ```
pub struct HookFns<T, E> {
    subscribe: Option<SubscribeFn>,
    next: Option<NextFn<T>>,
    error: Option<ErrorFn<E>>,
    cancel: Option<CancelFn>,
}

impl<T, E> HookFns<T, E> {
    pub fn new() -> Self {
        Self {
            subscribe: None,
            next: None,
            error: None,
            cancel: None,
        }
    }

    pub fn with_subscribe(
        mut self,
        f: impl Fn(&Span) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.subscribe = Some(Box::new(f));
        self
    }

    pub fn with_next(
        mut self,
        f: impl Fn(&T, &Span) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.next = Some(Box::new(f));
        self
    }

    pub fn with_error(
        mut self,
        f: impl Fn(&E, &Span) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    pub fn with_cancel(mut self, f: impl Fn(&Span) + Send + Sync + 'static) -> Self {
        self.cancel = Some(Box::new(f));
        self
    }
}

impl<T, E> Default for HookFns<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> CancelHook for HookFns<T, E> {
    fn on_cancel(&self, span: &Span) {
        if let Some(f) = &self.cancel {
            f(span);
        }
    }
}

impl<T, E> SpanHooks<T, E> for HookFns<T, E> {
    fn on_subscribe(&self, span: &Span) -> HookResult {
        self.subscribe.as_ref().map_or(Ok(()), |f| f(span))
    }

    fn on_next(&self, value: &T, span: &Span) -> HookResult {
        self.next.as_ref().map_or(Ok(()), |f| f(value, span))
    }

    fn on_error(&self, error: &E, span: &Span) -> HookResult {
        self.error.as_ref().map_or(Ok(()), |f| f(error, span))
    }
}
