//! CLOCK (second-chance) eviction store.
//!
//! Entries live in a FIFO ring; a map from URL to slot gives O(1) lookup.
//! When full, `put` walks the ring from the front: a set reference bit is
//! cleared and the entry moves to the back, a clear bit means eviction.
//!
//! New entries start with the bit set, so an entry that was never read still
//! survives one full pass. With capacity 2, `put(A) put(B) get(A) put(C)`
//! clears A then B and evicts A on the second pass, leaving {B, C}.

use std::collections::{HashMap, VecDeque};

/// Cached response and its reference bit.
#[derive(Debug, Clone)]
struct Entry {
    url: String,
    response: Vec<u8>,
    status: u16,
    referenced: bool,
}

/// Fixed-capacity second-chance cache. Not synchronized; see
/// [`super::ResponseCache`] for the shared wrapper.
#[derive(Debug)]
pub struct ClockCache {
    capacity: usize,
    ring: VecDeque<u64>,
    slots: HashMap<u64, Entry>,
    index: HashMap<String, u64>,
    next_slot: u64,
}

impl ClockCache {
    /// Create an empty cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ring: VecDeque::with_capacity(capacity),
            slots: HashMap::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            next_slot: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.index.contains_key(url)
    }

    /// Look up `url`, marking it referenced.
    pub fn get(&mut self, url: &str) -> Option<(Vec<u8>, u16)> {
        let slot = self.index.get(url)?;
        let entry = self.slots.get_mut(slot)?;
        entry.referenced = true;
        Some((entry.response.clone(), entry.status))
    }

    /// Insert or replace `url`, evicting one entry first if the cache is full.
    pub fn put(&mut self, url: &str, response: Vec<u8>, status: u16) {
        if let Some(entry) = self.index.get(url).and_then(|slot| self.slots.get_mut(slot)) {
            entry.response = response;
            entry.status = status;
            entry.referenced = true;
            return;
        }

        if self.index.len() >= self.capacity {
            self.evict_one();
        }

        let slot = self.next_slot;
        self.next_slot += 1;
        self.slots.insert(
            slot,
            Entry {
                url: url.to_string(),
                response,
                status,
                referenced: true,
            },
        );
        self.index.insert(url.to_string(), slot);
        self.ring.push_back(slot);
    }

    /// URLs in ring order, front first.
    #[cfg(test)]
    pub(crate) fn urls(&self) -> Vec<String> {
        self.ring
            .iter()
            .filter_map(|slot| self.slots.get(slot))
            .map(|entry| entry.url.clone())
            .collect()
    }

    fn evict_one(&mut self) {
        while let Some(slot) = self.ring.pop_front() {
            let Some(entry) = self.slots.get_mut(&slot) else {
                continue;
            };
            if entry.referenced {
                entry.referenced = false;
                self.ring.push_back(slot);
            } else if let Some(entry) = self.slots.remove(&slot) {
                self.index.remove(&entry.url);
                tracing::trace!(url = %entry.url, "Evicted cached response");
                return;
            }
        }
    }
}
