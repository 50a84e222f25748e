//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (selection and span counters)
//!
//! Consumers:
//!     → fmt subscriber on stdout
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Metric updates go through the `metrics` facade and are no-ops until a
//!   recorder is installed
//! - Log level comes from `RUST_LOG` first, then configuration

pub mod logging;
pub mod metrics;
