//! Client-side request dispatch for a service mesh.
//!
//! Resolves a logical service name to one concrete instance URL through a
//! discovery-backed round-robin load balancer, then wraps the outbound call in
//! a span whose lifecycle follows the call's response stream.

pub mod config;
pub mod discovery;
pub mod http;
pub mod load_balancer;
pub mod observability;
pub mod trace;

pub use config::schema::MeshConfig;
pub use discovery::{InstanceCatalog, ServiceInstance, StaticCatalog};
pub use http::dispatch::ClientDispatcher;
pub use load_balancer::{LoadBalancer, LoadBalancerError, registry::LoadBalancerRegistry};
pub use trace::{Span, TraceContext, Tracer, TracingPublisher};
