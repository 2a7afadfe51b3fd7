//! Shared response cache.
//!
//! # Data Flow
//! ```text
//! http::response
//!     → ResponseCache::get (hit: return stored bytes verbatim)
//!     → ResponseCache::put (after a fresh 200/404/405)
//!     → clock.rs (second-chance eviction when full)
//! ```
//!
//! # Design Decisions
//! - Keyed by request target only; no variance by method or body
//! - One mutex around the whole store; every operation is O(capacity) at worst

pub mod clock;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use clock::ClockCache;

/// Thread-safe handle to a [`ClockCache`], shared by all connections.
#[derive(Debug)]
pub struct ResponseCache {
    inner: Mutex<ClockCache>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(ClockCache::new(capacity)),
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.lock().contains(url)
    }

    /// Stored response for `url`, marking the entry referenced.
    pub fn get(&self, url: &str) -> Option<(Vec<u8>, u16)> {
        self.lock().get(url)
    }

    pub fn put(&self, url: &str, response: Vec<u8>, status: u16) {
        self.lock().put(url, response, status);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    // A panicking connection task must not take the cache down with it.
    fn lock(&self) -> MutexGuard<'_, ClockCache> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
