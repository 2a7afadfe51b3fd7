//! Connection supervisor.
//!
//! # Responsibilities
//! - Run the accept loop and hand each connection to its own task
//! - Admit or refuse clients through the [`ClientRegistry`]
//! - Drive the keep-alive read → parse → respond → log loop
//! - Isolate failures to the connection they happen on
//!
//! # Keep-alive state machine
//! ```text
//! accepted ─ over client limit ───────────────────────────────▶ closed
//!    │
//!    ▼
//! reading ─ empty read / timeout / error ─────────────────────▶ closed
//!    │ ▲
//!    ▼ │ keep-alive && requests < max
//! responding ─ Connection: close / POST / max reached ────────▶ closed
//! ```

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::cache::ResponseCache;
use crate::config::ListenerConfig;
use crate::http::request::{split_head, ParseError, Payload, Request};
use crate::http::response::{Response, ResponseGenerator};
use crate::net::{ConnectionId, ConnectionTracker, Listener, ListenerError};
use crate::observability::{metrics, AccessLog, AccessRecord};
use crate::resolver::{Resolver, ResolverError};
use crate::security::ClientRegistry;

/// Failures that end a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("read timed out")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error("Blocking task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

/// Shared state handed to every connection task.
pub struct AppState {
    pub config: ListenerConfig,
    pub resolver: Arc<dyn Resolver>,
    pub access_log: Arc<dyn AccessLog>,
    pub clients: Arc<ClientRegistry>,
    pub cache: Option<Arc<ResponseCache>>,
    pub generator: ResponseGenerator,
    pub tracker: ConnectionTracker,
}

impl AppState {
    pub fn new(
        config: ListenerConfig,
        resolver: Arc<dyn Resolver>,
        access_log: Arc<dyn AccessLog>,
    ) -> Self {
        let cache = config
            .cache_capacity()
            .map(|capacity| Arc::new(ResponseCache::new(capacity)));
        let clients = Arc::new(ClientRegistry::new(
            config.rate_limit_span(),
            config.too_many_requests_limit,
        ));
        let generator = ResponseGenerator::new(&config, Arc::clone(&resolver), cache.clone());

        Self {
            config,
            resolver,
            access_log,
            clients,
            cache,
            generator,
            tracker: ConnectionTracker::new(),
        }
    }
}

/// Per-socket keep-alive state.
struct ConnectionState {
    id: ConnectionId,
    stream: TcpStream,
    client: IpAddr,
    requests: usize,
    keep_alive: bool,
    rate_limited: bool,
}

/// Outcome of one pass through the serve loop.
enum Step {
    Served,
    PeerClosed,
}

/// HTTP server over raw TCP connections.
pub struct HttpServer {
    state: Arc<AppState>,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Accept connections until `shutdown` fires, then wait for in-flight
    /// connections up to one keep-alive timeout.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        tracing::info!(
            max_connections = listener.max_connections(),
            keep_alive = self.state.config.keep_alive,
            cache_capacity = self.state.cache.as_ref().map_or(0, |c| c.capacity()),
            "HTTP server starting"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr, permit)) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            let _permit = permit;
                            handle(state, stream, addr).await;
                        });
                    }
                    Err(ListenerError::Closed) => return Err(ListenerError::Closed),
                    Err(e) => {
                        tracing::error!(error = %e, "Accept failed");
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
            }
        }

        let deadline = self.state.config.keep_alive_timeout() + Duration::from_secs(1);
        if !self.state.tracker.drain(deadline).await {
            tracing::warn!(
                open = self.state.tracker.open(),
                "Connections still open after drain deadline"
            );
        }
        tracing::info!(
            accepted = self.state.tracker.accepted(),
            "HTTP server stopped"
        );
        Ok(())
    }
}

/// Serve one accepted connection until it closes.
pub async fn handle(state: Arc<AppState>, stream: TcpStream, addr: SocketAddr) {
    let guard = state.tracker.track(addr.ip());
    let client = state.clients.register(guard.peer());

    if client.exceeds(state.config.client_connections_limit) {
        tracing::warn!(
            connection_id = %guard.id(),
            client = %client.ip(),
            active = client.active_at_registration(),
            limit = state.config.client_connections_limit,
            "Too many connections from client, closing"
        );
        metrics::record_rejected("client_limit");
        return;
    }

    if client.rate_limited() {
        tracing::debug!(connection_id = %guard.id(), client = %client.ip(), "Client is rate limited");
        metrics::record_rate_limited_connection();
    }

    let mut conn = ConnectionState {
        id: guard.id(),
        stream,
        client: client.ip(),
        requests: 0,
        keep_alive: true,
        rate_limited: client.rate_limited(),
    };

    while conn.keep_alive && conn.requests < state.config.keep_alive_max_requests {
        match serve_one(&state, &mut conn).await {
            Ok(Step::Served) => {}
            Ok(Step::PeerClosed) => break,
            Err(ConnectionError::Timeout) => {
                tracing::debug!(connection_id = %conn.id, "Keep-alive timeout");
                break;
            }
            Err(ConnectionError::Parse(e)) => {
                tracing::warn!(connection_id = %conn.id, client = %conn.client, error = %e, "Malformed request");
                break;
            }
            Err(e) => {
                tracing::error!(
                    connection_id = %conn.id,
                    client = %conn.client,
                    requests = conn.requests,
                    error = %e,
                    "Connection failed"
                );
                break;
            }
        }
    }

    let _ = conn.stream.shutdown().await;
    tracing::debug!(connection_id = %conn.id, requests = conn.requests, "Connection finished");
}

async fn serve_one(state: &Arc<AppState>, conn: &mut ConnectionState) -> Result<Step, ConnectionError> {
    let config = &state.config;
    let buf = read_timed(&mut conn.stream, config.request_size, config.keep_alive_timeout()).await?;
    if buf.is_empty() {
        return Ok(Step::PeerClosed);
    }
    conn.requests += 1;
    let start = Instant::now();

    let (head, body) = split_head(&buf);
    let request = Request::parse(&String::from_utf8_lossy(head))?
        .with_origin(conn.client, conn.requests, conn.rate_limited);
    let mut body = body.to_vec();
    let mut oversized = false;

    if request.is_upload() {
        if let Some(declared) = request.content_length {
            oversized = declared > config.max_upload_size;
            let expected = declared.min(config.max_upload_size);
            while body.len() < expected {
                match read_timed(&mut conn.stream, config.request_size, config.keep_alive_timeout()).await {
                    Ok(chunk) if !chunk.is_empty() => body.extend_from_slice(&chunk),
                    Ok(_) | Err(ConnectionError::Timeout) => break,
                    Err(e) => return Err(e),
                }
            }
        }
        if body.len() > config.max_upload_size {
            oversized = true;
            body.truncate(config.max_upload_size);
        }
        if oversized {
            tracing::warn!(
                connection_id = %conn.id,
                client = %conn.client,
                declared = ?request.content_length,
                limit = config.max_upload_size,
                "Upload truncated to size limit"
            );
        }
    }

    let worker = Arc::clone(state);
    let (request, response) = tokio::task::spawn_blocking(move || {
        let mut request = request;
        let response = respond(&worker, &mut request, &body);
        (request, response)
    })
    .await?;
    let response = response?;
    conn.stream.write_all(&response.bytes).await?;

    let access_log = Arc::clone(&state.access_log);
    let (client, status) = (conn.client, response.status);
    let (method, target, user_agent) = (
        request.method.clone(),
        request.target.clone(),
        request.user_agent.clone(),
    );
    let logged = tokio::task::spawn_blocking(move || {
        access_log.record(&AccessRecord {
            client,
            method: &method,
            path: &target,
            status,
            user_agent: user_agent.as_deref(),
        })
    })
    .await;
    match logged {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(connection_id = %conn.id, error = %e, "Failed to write access log"),
        Err(e) => tracing::warn!(connection_id = %conn.id, error = %e, "Access log task failed"),
    }
    metrics::record_request(&request.method, response.status, start);
    tracing::debug!(
        connection_id = %conn.id,
        method = %request.method,
        target = %request.target,
        status = response.status,
        sequence = request.sequence,
        "Request served"
    );

    // Unread body bytes may still be in flight after a truncated upload.
    conn.keep_alive = config.keep_alive
        && !oversized
        && !request.wants_close()
        && !request.is_post()
        && conn.requests < config.keep_alive_max_requests;
    Ok(Step::Served)
}

/// Decode the body, store uploads, and build the response.
fn respond(state: &AppState, request: &mut Request, body: &[u8]) -> Result<Response, ConnectionError> {
    match request.decode_body(body) {
        Ok(()) => {}
        Err(e) if e.is_client_error() => {
            tracing::warn!(client = %request.client, target = %request.target, error = %e, "Rejected form body");
            return Ok(state.generator.bad_request(request));
        }
        Err(e) => return Err(e.into()),
    }

    if let Payload::Upload { data, filename } = &request.body {
        if request.is_post() && !request.rate_limited {
            state.resolver.save_upload(data, filename.as_deref())?;
        }
    }

    Ok(state.generator.generate(request)?)
}

/// Read up to `max` bytes, giving up after `deadline`.
async fn read_timed(
    stream: &mut TcpStream,
    max: usize,
    deadline: Duration,
) -> Result<Vec<u8>, ConnectionError> {
    let mut buf = vec![0u8; max];
    let n = tokio::time::timeout(deadline, stream.read(&mut buf))
        .await
        .map_err(|_| ConnectionError::Timeout)??;
    buf.truncate(n);
    Ok(buf)
}
