use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::Level;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();
}

/// Installs the global Prometheus recorder; the handle renders the scrape body.
pub fn install_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    metrics::describe_counter!("postflow_posts_created_total", "Posts created from incoming items");
    metrics::describe_counter!("postflow_transitions_total", "Post status transitions by target status");
    metrics::describe_counter!("postflow_refusals_total", "Refused actions by reason");
    metrics::describe_counter!("postflow_bundles_finalized_total", "Media bundles finalized by the sweep");
    metrics::describe_counter!("postflow_delivery_failures_total", "Best-effort deliveries that failed");
    Ok(handle)
}
