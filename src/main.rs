//! mesh-dispatch: resolve configured services through the round-robin load balancer.
//!
//! ```text
//! config (TOML) → StaticCatalog → LoadBalancerRegistry
//!     → `rounds` selections per service, each traced as a span
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use mesh_dispatch::config::loader::load_config;
use mesh_dispatch::discovery::StaticCatalog;
use mesh_dispatch::load_balancer::registry::LoadBalancerRegistry;
use mesh_dispatch::observability::{logging, metrics};
use mesh_dispatch::trace::{LogReporter, W3cTracer};
use mesh_dispatch::MeshConfig;

#[derive(Parser)]
#[command(name = "mesh-dispatch")]
#[command(about = "Resolve logical services to instance URLs", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of selections per service.
    #[arg(short, long, default_value_t = 3)]
    rounds: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => MeshConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(
        services = config.services.len(),
        config = ?cli.config,
        "mesh-dispatch v0.1.0 starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let catalog = Arc::new(StaticCatalog::from_config(&config.services));
    let registry = Arc::new(LoadBalancerRegistry::new(catalog.clone()));
    let tracer = W3cTracer::new(&config.tracing.service_name, Arc::new(LogReporter));

    for service in catalog.service_names() {
        for round in 0..cli.rounds {
            let (result, open_span) = registry
                .select_url_traced(&service, &tracer, &config.tracing)
                .await;
            match &result {
                Ok(url) => tracing::info!(service = %service, round, url = %url, "Resolved"),
                Err(e) => {
                    tracing::warn!(service = %service, round, error = %e, "Resolution failed")
                }
            }
            if let Some(span) = open_span {
                span.set_tag("lb.round", round as i64);
                span.finish();
            }
        }
    }

    tracing::info!("Done");
    Ok(())
}
