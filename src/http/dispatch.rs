//! Client dispatch pipeline.
//!
//! Resolves a service to a base URL, points the request at it, and wraps the
//! transport exchange in a traced stream.

use std::sync::Arc;

use futures_util::StreamExt;
use hyper::{Response, StatusCode, Uri};
use thiserror::Error;
use url::Url;

use crate::discovery::AddressError;
use crate::http::client::{
    Body, ClientSpanHooks, HttpClientError, OutboundRequest, ResponseStream, Transport,
};
use crate::load_balancer::{registry::LoadBalancerRegistry, LoadBalancerError};
use crate::trace::{TraceContext, TracedStream, Tracer};

/// Traced responses of one dispatched call.
pub type TracedResponses = TracedStream<ResponseStream, ClientSpanHooks>;

/// Errors surfaced by [`ClientDispatcher`].
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No URL could be selected for the service.
    #[error(transparent)]
    Selection(#[from] LoadBalancerError),

    /// The traced call itself failed.
    #[error(transparent)]
    Request(#[from] HttpClientError),
}

impl DispatchError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DispatchError::Request(e) => e.status(),
            DispatchError::Selection(_) => None,
        }
    }
}

/// Sends requests to logical services.
pub struct ClientDispatcher {
    registry: Arc<LoadBalancerRegistry>,
    transport: Arc<dyn Transport>,
    tracer: Arc<dyn Tracer>,
    finish_on_close: bool,
}

impl ClientDispatcher {
    pub fn new(
        registry: Arc<LoadBalancerRegistry>,
        transport: Arc<dyn Transport>,
        tracer: Arc<dyn Tracer>,
    ) -> Self {
        Self {
            registry,
            transport,
            tracer,
            finish_on_close: true,
        }
    }

    /// Whether spans finish when the response stream terminates. Defaults to true.
    pub fn finish_on_close(mut self, finish_on_close: bool) -> Self {
        self.finish_on_close = finish_on_close;
        self
    }

    /// Select an instance of `service` and prepare the traced call.
    ///
    /// The span is parented on `parent`, or on the active span when none is
    /// given. Nothing is sent until the returned stream is polled.
    pub async fn dispatch(
        &self,
        service: &str,
        request: OutboundRequest,
        parent: Option<&TraceContext>,
    ) -> Result<TracedResponses, LoadBalancerError> {
        let base = self.registry.select_url(service).await?;
        let target = resolve_target(service, &base, &request.uri())?;
        tracing::debug!(service = %service, target = %target, "Dispatching request");
        request.set_uri(target);

        let parent = parent
            .copied()
            .or_else(|| self.tracer.active_span().map(|span| span.context()));
        let span_builder =
            ClientSpanHooks::span_builder(self.tracer.as_ref(), &request, parent.as_ref());
        let hooks = Arc::new(ClientSpanHooks::new(self.tracer.clone(), request.clone()));
        let transport = self.transport.clone();

        Ok(
            TracedStream::new(move || transport.exchange(request.to_wire()), span_builder, hooks)
                .finish_on_close(self.finish_on_close),
        )
    }

    /// Dispatch and drive the call to completion, returning the first response.
    pub async fn exchange(
        &self,
        service: &str,
        request: OutboundRequest,
        parent: Option<&TraceContext>,
    ) -> Result<Response<Body>, DispatchError> {
        let mut responses = self.dispatch(service, request, parent).await?;

        let mut first = None;
        while let Some(item) = responses.next().await {
            let response = item?;
            if first.is_none() {
                first = Some(response);
            }
        }
        first.ok_or(DispatchError::Request(HttpClientError::EmptyResponse))
    }

    /// Like [`ClientDispatcher::exchange`], but a 404 yields `None`.
    ///
    /// The span still records the 404 as an error.
    pub async fn retrieve_optional(
        &self,
        service: &str,
        request: OutboundRequest,
        parent: Option<&TraceContext>,
    ) -> Result<Option<Response<Body>>, DispatchError> {
        match self.exchange(service, request, parent).await {
            Ok(response) => Ok(Some(response)),
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Point the request's path and query at `base`.
fn resolve_target(service: &str, base: &Url, uri: &Uri) -> Result<Uri, LoadBalancerError> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    let mut target = base.as_str().trim_end_matches('/').to_string();
    if !path_and_query.starts_with('/') {
        target.push('/');
    }
    target.push_str(path_and_query);

    target
        .parse::<Uri>()
        .map_err(|e| LoadBalancerError::InvalidInstanceAddress {
            service: service.to_string(),
            address: base.to_string(),
            source: AddressError::InvalidUri(e.to_string()),
        })
}
