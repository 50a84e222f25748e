//! Outbound request handle, transport abstraction, and client span tagging.
//!
//! # Responsibilities
//! - Hold the outgoing request so hooks can write headers before it is sent
//! - Publish the current span and its context as request attributes
//! - Tag client spans from responses and failures

use std::sync::Arc;

use futures_util::stream::BoxStream;
use hyper::header::HeaderMap;
use hyper::{Method, Request, Response, StatusCode, Uri};
use parking_lot::Mutex;
use thiserror::Error;

use crate::trace::{CancelHook, HookResult, Span, SpanBuilder, SpanHooks, TraceContext, Tracer};

pub const TAG_HTTP_CLIENT: &str = "http.client";
pub const TAG_HTTP_METHOD: &str = "http.method";
pub const TAG_HTTP_PATH: &str = "http.path";
pub const TAG_HTTP_STATUS: &str = "http.status_code";
pub const TAG_HTTP_STATUS_TEXT: &str = "http.status_text";
pub const TAG_ERROR: &str = "error";
pub const TAG_ERROR_KIND: &str = "error.kind";
pub const TAG_ERROR_MESSAGE: &str = "error.message";

/// Body type carried by requests and responses.
pub type Body = Vec<u8>;

/// Responses produced by one exchange. A transport may yield several.
pub type ResponseStream = BoxStream<'static, Result<Response<Body>, HttpClientError>>;

/// Failure of an outbound call.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// The server answered with an error status.
    #[error("client response error: {}", .response.status())]
    Response { response: Response<Body> },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The exchange completed without any response.
    #[error("exchange completed without a response")]
    EmptyResponse,
}

impl HttpClientError {
    pub fn from_response(response: Response<Body>) -> Self {
        HttpClientError::Response { response }
    }

    /// The response carried by this error, if any.
    pub fn response(&self) -> Option<&Response<Body>> {
        match self {
            HttpClientError::Response { response } => Some(response),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.response().map(Response::status)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HttpClientError::Response { .. } => "response",
            HttpClientError::Transport(_) => "transport",
            HttpClientError::EmptyResponse => "empty_response",
        }
    }
}

/// Sends requests over the wire.
///
/// A response with a 4xx or 5xx status must be yielded as
/// `Err(HttpClientError::Response)`, not as `Ok`. Spans only take the error
/// outcome from `Err` items, and `ClientDispatcher::retrieve_optional` only
/// maps a 404 carried that way to `None`.
pub trait Transport: Send + Sync {
    /// Send `request`. Nothing is sent until the returned stream is polled.
    fn exchange(&self, request: Request<Body>) -> ResponseStream;
}

/// Shared handle to an outgoing request.
///
/// Headers written through the handle are sent; extensions are the
/// request-scoped attribute store and stay local to this process.
#[derive(Clone)]
pub struct OutboundRequest {
    inner: Arc<Mutex<Request<Body>>>,
}

impl OutboundRequest {
    pub fn new(request: Request<Body>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(request)),
        }
    }

    /// Bodyless request for `method` and `uri`.
    pub fn build(method: Method, uri: &str) -> Result<Self, hyper::http::Error> {
        let request = Request::builder().method(method).uri(uri).body(Body::new())?;
        Ok(Self::new(request))
    }

    pub fn method(&self) -> Method {
        self.inner.lock().method().clone()
    }

    pub fn uri(&self) -> Uri {
        self.inner.lock().uri().clone()
    }

    pub fn set_uri(&self, uri: Uri) {
        *self.inner.lock().uri_mut() = uri;
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.inner
            .lock()
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Mutate the outgoing headers.
    pub fn with_headers<R>(&self, f: impl FnOnce(&mut HeaderMap) -> R) -> R {
        f(self.inner.lock().headers_mut())
    }

    pub fn set_attribute<T: Clone + Send + Sync + 'static>(&self, value: T) {
        self.inner.lock().extensions_mut().insert(value);
    }

    pub fn attribute<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.inner.lock().extensions().get::<T>().cloned()
    }

    /// The span tracing this request, once the call has started.
    pub fn current_span(&self) -> Option<Span> {
        self.attribute::<Span>()
    }

    pub fn current_span_context(&self) -> Option<TraceContext> {
        self.attribute::<TraceContext>()
    }

    /// Copy of the request as it goes on the wire, without attributes.
    pub fn to_wire(&self) -> Request<Body> {
        let request = self.inner.lock();
        let mut wire = Request::new(request.body().clone());
        *wire.method_mut() = request.method().clone();
        *wire.uri_mut() = request.uri().clone();
        *wire.version_mut() = request.version();
        *wire.headers_mut() = request.headers().clone();
        wire
    }
}

impl std::fmt::Debug for OutboundRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let request = self.inner.lock();
        f.debug_struct("OutboundRequest")
            .field("method", request.method())
            .field("uri", request.uri())
            .finish()
    }
}

/// Span hooks for an outbound HTTP call.
pub struct ClientSpanHooks {
    tracer: Arc<dyn Tracer>,
    request: OutboundRequest,
}

impl ClientSpanHooks {
    pub fn new(tracer: Arc<dyn Tracer>, request: OutboundRequest) -> Self {
        Self { tracer, request }
    }

    /// Span builder named `METHOD /path` for `request`.
    pub fn span_builder(
        tracer: &dyn Tracer,
        request: &OutboundRequest,
        parent: Option<&TraceContext>,
    ) -> SpanBuilder {
        let method = request.method();
        let uri = request.uri();
        tracer
            .new_span(&format!("{} {}", method, uri.path()), parent)
            .with_tag(TAG_HTTP_METHOD, method.as_str())
            .with_tag(TAG_HTTP_PATH, uri.path())
    }
}

fn set_response_tags(span: &Span, response: &Response<Body>) {
    let status = response.status();
    span.set_tag(TAG_HTTP_STATUS, status.as_u16());
    if status.is_client_error() || status.is_server_error() {
        span.set_tag(TAG_ERROR, true);
        if let Some(reason) = status.canonical_reason() {
            span.set_tag(TAG_HTTP_STATUS_TEXT, reason);
        }
    }
}

fn set_error_tags(span: &Span, error: &HttpClientError) {
    span.set_tag(TAG_ERROR, true);
    span.set_tag(TAG_ERROR_KIND, error.kind());
    span.set_tag(TAG_ERROR_MESSAGE, error.to_string());
}

impl CancelHook for ClientSpanHooks {
    fn on_cancel(&self, span: &Span) {
        tracing::debug!(span = %span.name(), uri = %self.request.uri(), "Outbound call cancelled");
    }
}

impl SpanHooks<Response<Body>, HttpClientError> for ClientSpanHooks {
    fn on_subscribe(&self, span: &Span) -> HookResult {
        span.set_tag(TAG_HTTP_CLIENT, true);
        let context = span.context();
        self.request
            .with_headers(|headers| self.tracer.inject(&context, headers));
        self.request.set_attribute(context);
        self.request.set_attribute(span.clone());
        Ok(())
    }

    fn on_next(&self, response: &Response<Body>, span: &Span) -> HookResult {
        set_response_tags(span, response);
        Ok(())
    }

    fn on_error(&self, error: &HttpClientError, span: &Span) -> HookResult {
        if let Some(response) = error.response() {
            set_response_tags(span, response);
        }
        set_error_tags(span, error);
        Ok(())
    }
}
