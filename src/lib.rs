//! Minimal keep-alive HTTP/1.1 server library.

pub mod cache;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resolver;
pub mod security;

pub use config::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
