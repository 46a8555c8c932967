//! Bounded write-behind cache of in-memory posting lists.
//!
//! During ingest the writer keeps at most `capacity` live posting lists, each
//! in delta form, keyed by token. Evicted entries are handed back to the
//! caller for persistence rather than dropped, so the cache bounds RAM while
//! amortizing the read-update-write cycle of a posting list over every
//! document that shares the token.

use lru::LruCache;

use crate::DocId;

pub const DEFAULT_CAPACITY: usize = 20;

pub struct PostingCache {
    entries: LruCache<String, Vec<DocId>>,
    capacity: usize,
}

impl PostingCache {
    pub fn new(capacity: usize) -> Self {
        // Unbounded underneath: eviction is explicit via `flush` so an entry
        // is never silently dropped with unpersisted postings.
        PostingCache {
            entries: LruCache::unbounded(),
            capacity: capacity.max(1),
        }
    }

    /// Whether the token currently has a live entry. Does not touch recency.
    pub fn contains(&self, token: &str) -> bool {
        self.entries.contains(token)
    }

    /// Fetch the entry for `token`, creating an empty one on miss. The entry
    /// is moved to the head either way. Returns the delta-form posting list
    /// and whether this was a hit.
    pub fn get(&mut self, token: &str) -> (&mut Vec<DocId>, bool) {
        let hit = self.entries.contains(token);
        if !hit {
            self.entries.put(token.to_string(), Vec::new());
        }
        let entry = self
            .entries
            .get_mut(token)
            .expect("entry just looked up or inserted");
        (entry, hit)
    }

    /// Detach and return the least-recently-used entry if the cache has
    /// grown past capacity, for immediate persistence. Returns `None` while
    /// within bounds.
    pub fn flush(&mut self) -> Option<(String, Vec<DocId>)> {
        if self.entries.len() > self.capacity {
            self.entries.pop_lru()
        } else {
            None
        }
    }

    /// Drain every live entry, head first, for the shutdown flush.
    pub fn drain(&mut self) -> Vec<(String, Vec<DocId>)> {
        let mut tail_first = Vec::with_capacity(self.entries.len());
        while let Some(entry) = self.entries.pop_lru() {
            tail_first.push(entry);
        }
        tail_first.reverse();
        tail_first
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
