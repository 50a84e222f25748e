//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mesh_lb_selections_total` (counter): successful selections by service
//! - `mesh_lb_selection_failures_total` (counter): failed selections by service, reason
//! - `mesh_spans_finished_total` (counter): finished spans by outcome

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::trace::Outcome;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_selection(service: &str) {
    metrics::counter!("mesh_lb_selections_total", "service" => service.to_string()).increment(1);
}

pub fn record_selection_failure(service: &str, reason: &'static str) {
    metrics::counter!(
        "mesh_lb_selection_failures_total",
        "service" => service.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_span_finished(outcome: Option<Outcome>) {
    let outcome = outcome.map(|o| o.as_str()).unwrap_or("unset");
    metrics::counter!("mesh_spans_finished_total", "outcome" => outcome).increment(1);
}
