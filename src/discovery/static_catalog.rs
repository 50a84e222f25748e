//! Configuration-backed instance catalog.
//!
//! # Responsibilities
//! - Serve instance lists declared in configuration
//! - Allow an external refresh policy to swap a service's instances atomically

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures_util::future::{self, BoxFuture, FutureExt};

use crate::config::ServiceConfig;
use crate::discovery::{DiscoveryError, InstanceCatalog, InstanceSnapshot, ServiceInstance};

/// Catalog holding a fixed set of instances per service.
///
/// Readers never block: lookups load the current map and clone the list,
/// while [`StaticCatalog::replace`] publishes a new map.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    services: ArcSwap<HashMap<String, Arc<InstanceSnapshot>>>,
}

impl StaticCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from configured services.
    /// URLs that do not parse are skipped with a warning.
    pub fn from_config(configs: &[ServiceConfig]) -> Self {
        let mut services = HashMap::new();

        for config in configs {
            let mut instances = Vec::with_capacity(config.urls.len());
            for uri in &config.urls {
                match ServiceInstance::from_uri(&config.name, uri) {
                    Ok(instance) => instances.push(instance),
                    Err(e) => {
                        tracing::warn!(service = %config.name, uri = %uri, error = %e, "Invalid service URL");
                    }
                }
            }
            services.insert(config.name.clone(), Arc::new(instances));
        }

        Self {
            services: ArcSwap::from_pointee(services),
        }
    }

    /// Replace the instances for `service`.
    pub fn replace(&self, service: &str, instances: InstanceSnapshot) {
        let instances = Arc::new(instances);
        self.services.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(service.to_string(), instances.clone());
            next
        });
        tracing::debug!(service = %service, count = instances.len(), "Service instances replaced");
    }

    /// Names of all services known to the catalog.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.load().keys().cloned().collect();
        names.sort();
        names
    }
}

impl InstanceCatalog for StaticCatalog {
    fn get_instances<'a>(
        &'a self,
        service: &'a str,
    ) -> BoxFuture<'a, Result<InstanceSnapshot, DiscoveryError>> {
        let snapshot = self
            .services
            .load()
            .get(service)
            .map(|instances| instances.to_vec())
            .unwrap_or_default();
        future::ready(Ok(snapshot)).boxed()
    }
}
