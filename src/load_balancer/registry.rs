//! Per-service load balancer registry.
//!
//! # Responsibilities
//! - Hand every caller of a service the same balancer (and thus the same cursor)
//! - Create discovery-backed balancers lazily on first use
//! - Allow a custom balancer to be pinned for a service
//! - Trace resolutions when tracing is enabled

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::{stream, StreamExt};
use url::Url;

use crate::config::TracingConfig;
use crate::discovery::InstanceCatalog;
use crate::load_balancer::{
    discovery::DiscoveryRoundRobinLoadBalancer, LoadBalancer, LoadBalancerError,
};
use crate::trace::{HookFns, Span, TracedStream, Tracer};

/// Map of service name -> balancer.
pub struct LoadBalancerRegistry {
    catalog: Arc<dyn InstanceCatalog>,
    balancers: DashMap<String, Arc<dyn LoadBalancer>>,
}

impl LoadBalancerRegistry {
    pub fn new(catalog: Arc<dyn InstanceCatalog>) -> Self {
        Self {
            catalog,
            balancers: DashMap::new(),
        }
    }

    /// Balancer for `service`, created if missing.
    pub fn get(&self, service: &str) -> Arc<dyn LoadBalancer> {
        if let Some(lb) = self.balancers.get(service) {
            return lb.clone();
        }

        self.balancers
            .entry(service.to_string())
            .or_insert_with(|| {
                tracing::debug!(service = %service, "Creating round-robin load balancer");
                let lb: Arc<dyn LoadBalancer> = Arc::new(DiscoveryRoundRobinLoadBalancer::new(
                    service,
                    self.catalog.clone(),
                ));
                lb
            })
            .clone()
    }

    /// Pin a balancer for `service`, replacing any existing one.
    pub fn register(&self, service: impl Into<String>, lb: Arc<dyn LoadBalancer>) {
        self.balancers.insert(service.into(), lb);
    }

    /// Resolve `service` to the URL of its next instance.
    pub async fn select_url(&self, service: &str) -> Result<Url, LoadBalancerError> {
        let lb = self.get(service);
        lb.select_url().await
    }

    /// Resolve `service` inside a `resolve <service>` span.
    ///
    /// With tracing disabled no span is created. Otherwise the span is
    /// parented on the active span and finished on completion when
    /// `finish_on_close` is set; when it is not, the still-open span is
    /// returned for the caller to finish.
    pub async fn select_url_traced(
        self: &Arc<Self>,
        service: &str,
        tracer: &dyn Tracer,
        config: &TracingConfig,
    ) -> (Result<Url, LoadBalancerError>, Option<Span>) {
        if !config.enabled {
            return (self.select_url(service).await, None);
        }

        let registry = self.clone();
        let name = service.to_string();
        let selection = stream::once(async move { registry.select_url(&name).await });

        let parent = tracer.active_span().map(|span| span.context());
        let span_builder = tracer
            .new_span(&format!("resolve {}", service), parent.as_ref())
            .with_tag("lb.service", service);

        let opened = Arc::new(parking_lot::Mutex::new(None));
        let slot = opened.clone();
        let hooks = HookFns::<Url, LoadBalancerError>::new()
            .with_subscribe(move |span| {
                *slot.lock() = Some(span.clone());
                Ok(())
            })
            .with_next(|url, span| {
                span.set_tag("peer.url", url.as_str());
                Ok(())
            })
            .with_error(|e, span| {
                span.set_tag("error", true);
                span.set_tag("error.message", e.to_string());
                Ok(())
            });

        let mut traced = TracedStream::from_stream(selection, span_builder, Arc::new(hooks))
            .finish_on_close(config.finish_on_close);

        let mut first = None;
        while let Some(item) = traced.next().await {
            if first.is_none() {
                first = Some(item);
            }
        }
        let result = first.unwrap_or_else(|| {
            Err(LoadBalancerError::NoInstancesAvailable {
                service: service.to_string(),
            })
        });

        let span = opened.lock().take().filter(|span| !span.is_finished());
        (result, span)
    }

    /// Number of services with a balancer.
    pub fn len(&self) -> usize {
        self.balancers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balancers.is_empty()
    }
}
