//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, cache outcome
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_cache_operations_total` (counter): store operations by op, result
//! - `proxy_backend_active_connections` (gauge): in-flight requests per server
//! - `proxy_backend_healthy` (gauge): 1=healthy, 0=unhealthy
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exporter only when enabled in config

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed proxied request.
pub fn record_request(method: &str, status: u16, cache: &'static str, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "cache" => cache
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "cache" => cache).record(start.elapsed().as_secs_f64());
}

/// Record a cache store operation outcome.
pub fn record_cache_op(op: &'static str, result: &'static str) {
    counter!("proxy_cache_operations_total", "op" => op, "result" => result).increment(1);
}

/// Record a backend's in-flight request count.
pub fn record_active_connections(server: &str, active: usize) {
    gauge!("proxy_backend_active_connections", "server" => server.to_string()).set(active as f64);
}

/// Record backend health.
pub fn record_backend_health(server: &str, healthy: bool) {
    gauge!("proxy_backend_healthy", "server" => server.to_string()).set(if healthy { 1.0 } else { 0.0 });
}
