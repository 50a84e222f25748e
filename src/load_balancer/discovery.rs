//! Discovery-backed round-robin load balancer.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use url::Url;

use crate::discovery::InstanceCatalog;
use crate::load_balancer::{round_robin::RoundRobinSelector, LoadBalancer, LoadBalancerError};
use crate::observability::metrics;

/// Balances across the instances a catalog reports for one service.
///
/// The instance list is fetched on every selection, so a catalog with
/// caching enabled may hand out a list that is slightly out of date.
pub struct DiscoveryRoundRobinLoadBalancer {
    service: String,
    catalog: Arc<dyn InstanceCatalog>,
    selector: RoundRobinSelector,
}

impl DiscoveryRoundRobinLoadBalancer {
    pub fn new(service: impl Into<String>, catalog: Arc<dyn InstanceCatalog>) -> Self {
        Self {
            service: service.into(),
            catalog,
            selector: RoundRobinSelector::new(),
        }
    }

    /// Logical service this balancer resolves.
    pub fn service(&self) -> &str {
        &self.service
    }

    async fn resolve(&self) -> Result<Url, LoadBalancerError> {
        let snapshot = self.catalog.get_instances(&self.service).await?;

        let instance = self.selector.select(&snapshot).ok_or_else(|| {
            LoadBalancerError::NoInstancesAvailable {
                service: self.service.clone(),
            }
        })?;

        let url = instance
            .to_url()
            .map_err(|source| LoadBalancerError::InvalidInstanceAddress {
                service: self.service.clone(),
                address: instance.to_string(),
                source,
            })?;

        tracing::debug!(
            service = %self.service,
            url = %url,
            candidates = snapshot.len(),
            "Selected service instance"
        );
        Ok(url)
    }
}

impl LoadBalancer for DiscoveryRoundRobinLoadBalancer {
    fn select_url(&self) -> BoxFuture<'_, Result<Url, LoadBalancerError>> {
        async move {
            let result = self.resolve().await;
            match &result {
                Ok(_) => metrics::record_selection(&self.service),
                Err(e) => {
                    tracing::warn!(service = %self.service, error = %e, "Instance selection failed");
                    metrics::record_selection_failure(&self.service, e.reason());
                }
            }
            result
        }
        .boxed()
    }
}

impl std::fmt::Debug for DiscoveryRoundRobinLoadBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryRoundRobinLoadBalancer")
            .field("service", &self.service)
            .field("cursor", &self.selector.cursor())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{DiscoveryError, InstanceSnapshot, ServiceInstance, StaticCatalog};
    use futures_util::future;

    struct FailingCatalog;

    impl InstanceCatalog for FailingCatalog {
        fn get_instances<'a>(
            &'a self,
            service: &'a str,
        ) -> BoxFuture<'a, Result<InstanceSnapshot, DiscoveryError>> {
            future::ready(Err(DiscoveryError::Unavailable {
                service: service.to_string(),
                reason: "connection refused".into(),
            }))
            .boxed()
        }
    }

    fn catalog_with(hosts: &[&str]) -> Arc<StaticCatalog> {
        let catalog = StaticCatalog::new();
        catalog.replace(
            "users",
            hosts
                .iter()
                .map(|h| ServiceInstance::new("users", "http", *h, Some(8080)))
                .collect(),
        );
        Arc::new(catalog)
    }

    #[tokio::test]
    async fn test_round_robin_urls() {
        let lb = DiscoveryRoundRobinLoadBalancer::new("users", catalog_with(&["a", "b", "c"]));

        let mut hosts = Vec::new();
        for _ in 0..4 {
            let url = lb.select_url().await.unwrap();
            hosts.push(url.host_str().unwrap().to_string());
        }
        assert_eq!(hosts, vec!["a", "b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_no_instances() {
        let lb = DiscoveryRoundRobinLoadBalancer::new("users", catalog_with(&[]));
        let err = lb.select_url().await.unwrap_err();
        assert_eq!(
            err,
            LoadBalancerError::NoInstancesAvailable {
                service: "users".into()
            }
        );
    }

    #[tokio::test]
    async fn test_discovery_failure_propagates() {
        let lb = DiscoveryRoundRobinLoadBalancer::new("users", Arc::new(FailingCatalog));
        let err = lb.select_url().await.unwrap_err();
        assert_eq!(
            err,
            LoadBalancerError::Discovery(DiscoveryError::Unavailable {
                service: "users".into(),
                reason: "connection refused".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let lb = DiscoveryRoundRobinLoadBalancer::new("users", catalog_with(&["bad host"]));
        let err = lb.select_url().await.unwrap_err();
        assert!(matches!(err, LoadBalancerError::InvalidInstanceAddress { .. }));
    }
}
