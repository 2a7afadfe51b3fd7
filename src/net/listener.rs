//! Bounded TCP listener.
//!
//! # Responsibilities
//! - Bind `ip-address:port` with the configured listen backlog
//! - Cap concurrently served connections at `connections-limit`
//! - Apply OS-level TCP keepalive to accepted sockets

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::{ListenerConfig, TcpKeepaliveConfig};

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Failed to bind: {0}")]
    Bind(io::Error),

    #[error("Failed to accept: {0}")]
    Accept(io::Error),

    /// The slot semaphore was closed; no further connections can be served.
    #[error("Listener closed")]
    Closed,
}

/// Listening socket plus a fixed pool of serving slots.
///
/// A slot is claimed before `accept(2)` is called, so once every slot is
/// busy new clients queue in the kernel backlog.
pub struct Listener {
    socket: TcpListener,
    slots: Arc<Semaphore>,
    capacity: usize,
    keepalive: Option<TcpKeepaliveConfig>,
}

impl Listener {
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let ip: IpAddr = config
            .ip_address
            .parse()
            .map_err(|e| ListenerError::Bind(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        let requested = SocketAddr::new(ip, config.port);

        let socket = match requested {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(ListenerError::Bind)?;
        socket.set_reuseaddr(true).map_err(ListenerError::Bind)?;
        socket.bind(requested).map_err(ListenerError::Bind)?;
        let socket = socket.listen(config.backlog).map_err(ListenerError::Bind)?;

        let bound = socket.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(
            address = %bound,
            backlog = config.backlog,
            connections_limit = config.connections_limit,
            "Listening"
        );

        let keepalive = (config.keep_alive && config.tcp_keepalive.enabled)
            .then(|| config.tcp_keepalive.clone());

        Ok(Self {
            socket,
            slots: Arc::new(Semaphore::new(config.connections_limit)),
            capacity: config.connections_limit,
            keepalive,
        })
    }

    /// Wait for a free slot, then for a client.
    ///
    /// The returned [`ConnectionPermit`] holds the slot until it is dropped.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, peer) = self.socket.accept().await.map_err(ListenerError::Accept)?;

        if let Some(keepalive) = &self.keepalive {
            if let Err(e) = configure_keepalive(&stream, keepalive) {
                tracing::warn!(peer = %peer, error = %e, "Failed to set TCP keepalive");
            }
        }

        tracing::debug!(
            peer = %peer,
            free_slots = self.slots.available_permits(),
            "Accepted"
        );

        Ok((stream, peer, ConnectionPermit { _slot: slot }))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Slots not currently held by a connection.
    pub fn available_permits(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.capacity
    }
}

fn configure_keepalive(stream: &TcpStream, config: &TcpKeepaliveConfig) -> io::Result<()> {
    let keepalive = TcpKeepalive::new().with_time(Duration::from_secs(config.idle_secs));
    #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
    let keepalive = keepalive.with_interval(Duration::from_secs(config.interval_secs));
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    let keepalive = keepalive.with_retries(config.retries);

    SockRef::from(stream).set_tcp_keepalive(&keepalive)
}

/// One serving slot. Released on drop, including when the task panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _slot: OwnedSemaphorePermit,
}
