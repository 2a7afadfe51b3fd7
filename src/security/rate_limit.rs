//! Per-client connection accounting and sliding-window rate limiting.
//!
//! Every accepted connection registers with the [`ClientRegistry`], which
//! counts active connections per IP and remembers when each connection
//! arrived. The rate-limit verdict is taken once, at registration, and holds
//! for every request served on that connection.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Registry state for a single client IP.
#[derive(Debug, Default)]
struct ClientState {
    active: usize,
    timestamps: VecDeque<Instant>,
}

impl ClientState {
    /// Drop timestamps older than `span` and return how many remain.
    fn trim(&mut self, now: Instant, span: Duration) -> usize {
        while let Some(front) = self.timestamps.front() {
            if now.duration_since(*front) > span {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        self.timestamps.len()
    }
}

/// Process-wide map from client IP to connection count and recent arrivals.
///
/// All read-modify-write operations run under one lock.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<IpAddr, ClientState>>,
    span: Duration,
    limit: usize,
}

impl ClientRegistry {
    /// `span` is the trailing window, `limit` the number of arrivals allowed
    /// inside it before a connection is marked rate limited.
    pub fn new(span: Duration, limit: usize) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            span,
            limit,
        }
    }

    /// Record a new connection from `ip`.
    ///
    /// The returned guard releases the connection slot when dropped.
    pub fn register(self: &Arc<Self>, ip: IpAddr) -> ClientGuard {
        self.register_at(ip, Instant::now())
    }

    fn register_at(self: &Arc<Self>, ip: IpAddr, now: Instant) -> ClientGuard {
        let mut clients = self.lock();
        let state = clients.entry(ip).or_default();
        state.active += 1;
        state.timestamps.push_back(now);
        let recent = state.trim(now, self.span);

        ClientGuard {
            registry: Arc::clone(self),
            ip,
            active: state.active,
            rate_limited: recent > self.limit,
        }
    }

    /// Current number of open connections from `ip`.
    pub fn active_connections(&self, ip: IpAddr) -> usize {
        self.lock().get(&ip).map_or(0, |state| state.active)
    }

    /// Arrivals from `ip` inside the trailing window.
    #[cfg(test)]
    pub(crate) fn recent_requests(&self, ip: IpAddr) -> usize {
        let now = Instant::now();
        self.lock()
            .get_mut(&ip)
            .map_or(0, |state| state.trim(now, self.span))
    }

    /// Number of IPs with at least one open connection.
    #[cfg(test)]
    pub(crate) fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    fn release(&self, ip: IpAddr) {
        let mut clients = self.lock();
        if let Some(state) = clients.get_mut(&ip) {
            state.active = state.active.saturating_sub(1);
            if state.active == 0 {
                clients.remove(&ip);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, ClientState>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A registered connection. Decrements the client's count on drop.
#[derive(Debug)]
pub struct ClientGuard {
    registry: Arc<ClientRegistry>,
    ip: IpAddr,
    active: usize,
    rate_limited: bool,
}

impl ClientGuard {
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Active connections from this IP at registration, this one included.
    pub fn active_at_registration(&self) -> usize {
        self.active
    }

    /// Whether the client exceeded the rate limit when this connection arrived.
    pub fn rate_limited(&self) -> bool {
        self.rate_limited
    }

    /// Whether this connection pushes the client over `limit` concurrent
    /// connections.
    pub fn exceeds(&self, limit: usize) -> bool {
        self.active > limit
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.registry.release(self.ip);
        tracing::trace!(client = %self.ip, "Client connection released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    #[test]
    fn counts_and_cleans_up() {
        let registry = Arc::new(ClientRegistry::new(Duration::from_secs(60), 100));
        let first = registry.register(ip(1));
        let second = registry.register(ip(1));
        let other = registry.register(ip(2));

        assert_eq!(first.active_at_registration(), 1);
        assert_eq!(second.active_at_registration(), 2);
        assert_eq!(registry.active_connections(ip(1)), 2);
        assert_eq!(registry.tracked_clients(), 2);

        drop(first);
        assert_eq!(registry.active_connections(ip(1)), 1);
        drop(second);
        assert_eq!(registry.active_connections(ip(1)), 0);
        assert_eq!(registry.tracked_clients(), 1);
        drop(other);
        assert_eq!(registry.tracked_clients(), 0);
    }

    #[test]
    fn per_client_limit() {
        let registry = Arc::new(ClientRegistry::new(Duration::from_secs(60), 100));
        let a = registry.register(ip(1));
        let b = registry.register(ip(1));
        let c = registry.register(ip(1));

        assert!(!a.exceeds(2));
        assert!(!b.exceeds(2));
        assert!(c.exceeds(2));
    }

    #[test]
    fn rate_limited_past_threshold() {
        let registry = Arc::new(ClientRegistry::new(Duration::from_secs(60), 2));
        let guards: Vec<ClientGuard> = (0..4).map(|_| registry.register(ip(3))).collect();
        let verdicts: Vec<bool> = guards.iter().map(ClientGuard::rate_limited).collect();

        assert_eq!(verdicts, vec![false, false, true, true]);
        drop(guards);
        assert_eq!(registry.tracked_clients(), 0);
    }

    #[test]
    fn history_is_forgotten_once_disconnected() {
        let registry = Arc::new(ClientRegistry::new(Duration::from_secs(60), 1));
        drop(registry.register(ip(6)));
        drop(registry.register(ip(6)));
        assert_eq!(registry.recent_requests(ip(6)), 0);
        assert!(!registry.register(ip(6)).rate_limited());
    }

    #[test]
    fn old_arrivals_leave_the_window() {
        let span = Duration::from_secs(10);
        let registry = Arc::new(ClientRegistry::new(span, 1));
        let start = Instant::now();

        let _a = registry.register_at(ip(4), start);
        let b = registry.register_at(ip(4), start + Duration::from_secs(1));
        assert!(b.rate_limited());

        let c = registry.register_at(ip(4), start + Duration::from_secs(12));
        assert!(!c.rate_limited());
    }

    #[test]
    fn history_is_kept_while_connected() {
        let registry = Arc::new(ClientRegistry::new(Duration::from_secs(60), 100));
        let _held = registry.register(ip(5));
        drop(registry.register(ip(5)));
        assert_eq!(registry.recent_requests(ip(5)), 2);
    }
}
