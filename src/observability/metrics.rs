//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tunnel_connections_total` (counter): accepted connections by mode
//! - `tunnel_connection_errors_total` (counter): failures by stage
//! - `tunnel_active_connections` (gauge): current relayed connections
//! - `tunnel_bytes_total` (counter): relayed bytes by direction
//! - `tunnel_config_reloads_total` (counter): applied config reloads
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Recording is a no-op until an exporter is installed

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Stage of a relayed connection at which it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStage {
    Connect,
    Wrap,
    Relay,
}

impl ErrorStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStage::Connect => "connect",
            ErrorStage::Wrap => "wrap",
            ErrorStage::Relay => "relay",
        }
    }
}

pub fn record_connection_opened(mode: &'static str) {
    metrics::counter!("tunnel_connections_total", "mode" => mode).increment(1);
    metrics::gauge!("tunnel_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    metrics::gauge!("tunnel_active_connections").decrement(1.0);
}

pub fn record_connection_error(stage: ErrorStage) {
    metrics::counter!("tunnel_connection_errors_total", "stage" => stage.as_str()).increment(1);
}

/// Record bytes moved in each direction of one relayed connection.
pub fn record_bytes(inbound_to_upstream: u64, upstream_to_inbound: u64) {
    metrics::counter!("tunnel_bytes_total", "direction" => "upstream").increment(inbound_to_upstream);
    metrics::counter!("tunnel_bytes_total", "direction" => "downstream").increment(upstream_to_inbound);
}

pub fn record_config_reload() {
    metrics::counter!("tunnel_config_reloads_total").increment(1);
}
