//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! load balancer asks for a logical service name
//!     → InstanceCatalog::get_instances (async, may be stale)
//!     → InstanceSnapshot (ordered Vec<ServiceInstance>, fresh per call)
//!     → handed to the selector, then discarded
//! ```
//!
//! # Design Decisions
//! - Catalogs own caching and refresh; callers never hold a snapshot
//! - An unknown service yields an empty snapshot, not an error
//! - Instance identity is positional within one snapshot only

pub mod static_catalog;
pub mod types;

use futures_util::future::BoxFuture;

pub use static_catalog::StaticCatalog;
pub use types::{AddressError, DiscoveryError, ServiceInstance};

/// Ordered list of instances for one service, produced per request.
pub type InstanceSnapshot = Vec<ServiceInstance>;

/// Source of service instances for a logical service name.
pub trait InstanceCatalog: Send + Sync {
    /// Fetch the current instances for `service`.
    fn get_instances<'a>(
        &'a self,
        service: &'a str,
    ) -> BoxFuture<'a, Result<InstanceSnapshot, DiscoveryError>>;
}
