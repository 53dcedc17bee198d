//! Metrics exposition.
//!
//! # Responsibilities
//! - Install the Prometheus exporter when enabled in config
//! - Record session-level events that are not plain counters
//!
//! # Metrics
//! - `waypoint_*_total` (counter): mirrored from `stats::Counter`
//! - `waypoint_clients_connected` / `waypoint_drivers_connected` (gauge)
//! - `waypoint_match_round_size` (histogram): clients accepted per round
//! - `waypoint_deliveries_failed_total` (counter): offer/abort writes that failed, by kind

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the global Prometheus recorder and its HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record the size of a non-empty match round.
pub fn record_round(size: usize) {
    metrics::histogram!("waypoint_match_round_size").record(size as f64);
}

/// Record a failed asynchronous delivery (`"offer"` or `"abort"`).
pub fn record_delivery_failure(kind: &'static str) {
    metrics::counter!("waypoint_deliveries_failed_total", "kind" => kind).increment(1);
}
