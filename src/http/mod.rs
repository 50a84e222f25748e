//! Outbound HTTP dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! caller: service name + OutboundRequest (+ optional parent context)
//!     → dispatch.rs (LoadBalancerRegistry::select_url)
//!     → request URI rewritten onto the selected base URL
//!     → TracedStream wrapping Transport::exchange
//!         client.rs hooks: inject traceparent, tag status and errors
//!     → responses / HttpClientError, unchanged
//! ```

pub mod client;
pub mod dispatch;

pub use client::{
    Body, ClientSpanHooks, HttpClientError, OutboundRequest, ResponseStream, Transport,
};
pub use dispatch::{ClientDispatcher, DispatchError, TracedResponses};
