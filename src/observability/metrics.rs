//! Metrics collection and exposition.
//!
//! # Metrics
//! - `server_requests_total` (counter): completed requests by method, status
//! - `server_request_duration_seconds` (histogram): time to answer a request
//! - `server_active_connections` (gauge): connections being served
//! - `server_rejected_connections_total` (counter): closed unserved, by reason
//! - `server_rate_limited_connections_total` (counter): served, but only with 429s
//! - `server_cache_hits_total` (counter): responses served from the cache

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    ::metrics::counter!("server_requests_total", &labels).increment(1);
    ::metrics::histogram!("server_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_connection_opened() {
    ::metrics::gauge!("server_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    ::metrics::gauge!("server_active_connections").decrement(1.0);
}

pub fn record_rejected(reason: &'static str) {
    ::metrics::counter!("server_rejected_connections_total", "reason" => reason).increment(1);
}

pub fn record_rate_limited_connection() {
    ::metrics::counter!("server_rate_limited_connections_total").increment(1);
}

pub fn record_cache_hit() {
    ::metrics::counter!("server_cache_hits_total").increment(1);
}
