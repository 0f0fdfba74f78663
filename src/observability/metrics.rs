//! Metrics collection and exposition.
//!
//! # Metrics
//! - `scheduler_task_runs_total` (counter): invocations by task, outcome
//! - `server_connections_total` (counter): accepted connections
//! - `server_active_connections` (gauge): current connection count
//! - `server_shutdowns_total` (counter): shutdowns by outcome
//!
//! # Design Decisions
//! - `metrics` facade everywhere; the exporter is optional
//! - Without an installed recorder every update is a no-op

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// The `metrics` singleton.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    /// Where the Prometheus endpoint listens, when enabled.
    pub address: Option<SocketAddr>,
}

/// Install the Prometheus recorder and its HTTP endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<MetricsHandle, BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(MetricsHandle {
        address: Some(addr),
    })
}

/// Handle used when metrics are disabled.
pub fn disabled() -> MetricsHandle {
    MetricsHandle { address: None }
}

pub fn record_task_run(task: &str, outcome: &'static str) {
    metrics::counter!(
        "scheduler_task_runs_total",
        "task" => task.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_connection_opened() {
    metrics::counter!("server_connections_total").increment(1);
    metrics::gauge!("server_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    metrics::gauge!("server_active_connections").decrement(1.0);
}

pub fn record_shutdown(outcome: &'static str) {
    metrics::counter!("server_shutdowns_total", "outcome" => outcome).increment(1);
}
