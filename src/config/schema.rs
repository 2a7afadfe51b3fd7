//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.
//! Keys are kebab-case, matching the option names operators already use
//! (`keep-alive-timeout`, `server-cash-size`, ...).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Listener, limits, keep-alive and caching settings.
    pub server: ListenerConfig,

    /// Where served files live.
    pub resources: ResourceConfig,

    /// Access log and diagnostic log settings.
    pub logging: LoggingConfig,

    /// Optional Prometheus exporter.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Listener configuration.
///
/// `port` and `ip-address` are required; everything else has a default.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ListenerConfig {
    /// TCP port to listen on (0 picks an ephemeral port).
    pub port: u16,

    /// Address to bind, e.g. "127.0.0.1".
    pub ip_address: String,

    /// Listen backlog passed to `listen(2)`.
    #[serde(default = "default_backlog")]
    pub backlog: u32,

    /// Maximum bytes taken from the socket per read.
    #[serde(default = "default_request_size")]
    pub request_size: usize,

    /// Maximum concurrently handled connections (worker pool size).
    #[serde(default = "default_connections_limit")]
    pub connections_limit: usize,

    /// Maximum concurrent connections from a single client IP.
    #[serde(default = "default_client_connections_limit")]
    pub client_connections_limit: usize,

    /// Sliding rate-limit window, in seconds.
    #[serde(default = "default_too_many_requests_span")]
    pub too_many_requests_span: u64,

    /// Connections allowed per IP inside the window before 429s are served.
    #[serde(default = "default_too_many_requests_limit")]
    pub too_many_requests_limit: usize,

    /// Enable persistent connections.
    #[serde(default = "default_true")]
    pub keep_alive: bool,

    /// Idle read deadline, in seconds.
    #[serde(default = "default_keep_alive_timeout")]
    pub keep_alive_timeout: u64,

    /// Requests served on one connection before it is closed.
    #[serde(default = "default_keep_alive_max_requests")]
    pub keep_alive_max_requests: usize,

    /// Largest upload body kept, in bytes. Longer bodies are truncated and
    /// the connection is closed after the response.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,

    /// Shared response cache capacity; 0 disables the cache.
    #[serde(default, alias = "server-cache-size")]
    pub server_cash_size: usize,

    /// Emit `Cache-Control: public` for cacheable resources.
    #[serde(default = "default_true")]
    pub browser_caching: bool,

    /// OS-level TCP keepalive probes on accepted sockets.
    #[serde(default)]
    pub tcp_keepalive: TcpKeepaliveConfig,
}

impl ListenerConfig {
    /// `ip-address:port` as a single string.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.ip_address, self.port)
    }

    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_secs(self.keep_alive_timeout)
    }

    pub fn rate_limit_span(&self) -> Duration {
        Duration::from_secs(self.too_many_requests_span)
    }

    /// Capacity of the shared response cache, if enabled.
    pub fn cache_capacity(&self) -> Option<usize> {
        (self.server_cash_size > 0).then_some(self.server_cash_size)
    }
}

fn default_backlog() -> u32 {
    128
}

fn default_request_size() -> usize {
    8192
}

fn default_connections_limit() -> usize {
    64
}

fn default_client_connections_limit() -> usize {
    8
}

fn default_too_many_requests_span() -> u64 {
    60
}

fn default_too_many_requests_limit() -> usize {
    100
}

fn default_max_upload_size() -> usize {
    16 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_keep_alive_timeout() -> u64 {
    5
}

fn default_keep_alive_max_requests() -> usize {
    100
}

/// TCP keepalive probe settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TcpKeepaliveConfig {
    /// Apply the socket option at all.
    pub enabled: bool,

    /// Idle time before the first probe, in seconds.
    pub idle_secs: u64,

    /// Time between probes, in seconds.
    pub interval_secs: u64,

    /// Unanswered probes before the peer is considered dead.
    pub retries: u32,
}

impl Default for TcpKeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_secs: 60,
            interval_secs: 10,
            retries: 3,
        }
    }
}

/// Served file locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResourceConfig {
    /// Directory of pages and templates.
    pub root: PathBuf,

    /// File served for `/`.
    pub home_page: PathBuf,

    /// Directory of uploaded media.
    pub media: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggingConfig {
    /// File the access log is appended to.
    pub access_log: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MetricsConfig {
    /// Enable the Prometheus scrape endpoint.
    pub enabled: bool,

    /// Metrics endpoint bind address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:9090".to_string(),
        }
    }
}
