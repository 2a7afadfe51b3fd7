//! Connection bookkeeping.
//!
//! # Responsibilities
//! - Number accepted sockets so log lines from one connection can be joined
//! - Count open connections for the shutdown drain and the metrics gauge

use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::observability::metrics;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique number of an accepted socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        // Only uniqueness matters here.
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Counts {
    open: AtomicU64,
    accepted: AtomicU64,
}

/// Shared counters for every connection the server is handling.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    counts: Arc<Counts>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a connection from `peer`. Dropping the guard stops it.
    pub fn track(&self, peer: IpAddr) -> ConnectionGuard {
        self.counts.open.fetch_add(1, Ordering::SeqCst);
        self.counts.accepted.fetch_add(1, Ordering::Relaxed);
        metrics::record_connection_opened();

        ConnectionGuard {
            counts: Arc::clone(&self.counts),
            id: ConnectionId::next(),
            peer,
            opened: Instant::now(),
        }
    }

    /// Connections currently open.
    pub fn open(&self) -> u64 {
        self.counts.open.load(Ordering::SeqCst)
    }

    /// Connections accepted since start.
    pub fn accepted(&self) -> u64 {
        self.counts.accepted.load(Ordering::Relaxed)
    }

    /// Wait for every open connection to finish, for at most `deadline`.
    ///
    /// Returns `false` if some were still open when time ran out.
    pub async fn drain(&self, deadline: Duration) -> bool {
        let settled = async {
            while self.open() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(deadline, settled).await.is_ok()
    }
}

/// Live connection handle.
#[derive(Debug)]
pub struct ConnectionGuard {
    counts: Arc<Counts>,
    id: ConnectionId,
    peer: IpAddr,
    opened: Instant,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> IpAddr {
        self.peer
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counts.open.fetch_sub(1, Ordering::SeqCst);
        metrics::record_connection_closed();
        tracing::trace!(
            connection_id = %self.id,
            client = %self.peer,
            open_ms = self.opened.elapsed().as_millis() as u64,
            "Connection released"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn localhost() -> IpAddr {
        IpAddr::from([127, 0, 0, 1])
    }

    #[test]
    fn ids_increase() {
        let tracker = ConnectionTracker::new();
        let a = tracker.track(localhost());
        let b = tracker.track(localhost());

        assert!(b.id() > a.id());
        assert_eq!(a.id().to_string(), format!("conn-{}", a.id().get()));
        assert_eq!(b.peer(), localhost());
    }

    #[test]
    fn open_and_accepted_counts() {
        let tracker = ConnectionTracker::new();
        let first = tracker.track(localhost());
        let second = tracker.track(localhost());
        assert_eq!(tracker.open(), 2);

        drop(first);
        assert_eq!(tracker.open(), 1);
        drop(second);
        assert_eq!(tracker.open(), 0);
        assert_eq!(tracker.accepted(), 2);
    }

    #[tokio::test]
    async fn drain_waits_for_open_connections() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.track(localhost());
        assert!(!tracker.drain(Duration::from_millis(60)).await);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });
        assert!(tracker.drain(Duration::from_secs(1)).await);
    }
}
