//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Caller names a logical service
//!     → registry.rs (one balancer per service, created on first use)
//!     → discovery.rs (fetch a fresh snapshot from the InstanceCatalog)
//!     → round_robin.rs (claim the next index from the shared cursor)
//!     → ServiceInstance::to_url
//!     → base URL or LoadBalancerError
//! ```
//!
//! # Design Decisions
//! - The cursor is the only shared mutable state, updated lock-free
//! - Snapshots are not cached here; staleness belongs to the catalog
//! - No retries: every failure surfaces to the caller immediately

pub mod discovery;
pub mod registry;
pub mod round_robin;

use futures_util::future::BoxFuture;
use thiserror::Error;
use url::Url;

use crate::discovery::{AddressError, DiscoveryError};

/// Errors raised while resolving a service to a URL.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadBalancerError {
    /// The catalog returned no instances for the service.
    #[error("no available instances for service {service}")]
    NoInstancesAvailable { service: String },

    /// The catalog itself failed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// The selected instance's address is not a usable URL.
    #[error("invalid address {address} for service {service}: {source}")]
    InvalidInstanceAddress {
        service: String,
        address: String,
        #[source]
        source: AddressError,
    },
}

impl LoadBalancerError {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            LoadBalancerError::NoInstancesAvailable { .. } => "no_instances",
            LoadBalancerError::Discovery(_) => "discovery",
            LoadBalancerError::InvalidInstanceAddress { .. } => "invalid_address",
        }
    }
}

/// Resolves one base URL to send a request to.
pub trait LoadBalancer: Send + Sync {
    /// Select the URL of the next instance.
    fn select_url(&self) -> BoxFuture<'_, Result<Url, LoadBalancerError>>;
}
