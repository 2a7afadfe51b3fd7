//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize collaborators in dependency order
//! - Bind the listener last, once everything it serves is ready

use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::http::{AppState, HttpServer};
use crate::net::{Listener, ListenerError};
use crate::observability::{metrics, FileAccessLog};
use crate::resolver::{FileResolver, ResolverError};

/// Fatal problems while bringing the server up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to index resources: {0}")]
    Resources(#[from] ResolverError),

    #[error("Failed to open access log: {0}")]
    AccessLog(std::io::Error),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Build the server and bind its listener.
pub async fn start(config: &ServerConfig) -> Result<(HttpServer, Listener), StartupError> {
    if config.metrics.enabled {
        match config.metrics.address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.metrics.address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let resolver = Arc::new(FileResolver::new(&config.resources)?);
    let access_log =
        Arc::new(FileAccessLog::open(&config.logging.access_log).map_err(StartupError::AccessLog)?);

    let state = AppState::new(config.server.clone(), resolver, access_log);
    let listener = Listener::bind(&config.server).await?;

    Ok((HttpServer::new(state), listener))
}
