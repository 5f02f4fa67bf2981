//! Response Cache
//!
//! Maps canonical keys to the last non-error response and the instant it was
//! received. Freshness is decided by the caller's stale time at read time.

use crate::key::CanonicalKey;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Cached response and the instant it was stored
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub data: Value,
    pub timestamp: Instant,
}

impl CacheEntry {
    /// Create an entry stamped with the current time
    pub fn new(data: Value) -> Self {
        Self {
            data,
            timestamp: Instant::now(),
        }
    }

    /// Age of the entry at `now`
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.timestamp)
    }

    /// An entry is usable while its age is strictly below the stale time;
    /// a zero stale time never yields a fresh entry.
    pub fn is_fresh(&self, stale_time: Duration, now: Instant) -> bool {
        self.age(now) < stale_time
    }
}

/// Store of cached responses keyed by canonical message key
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: HashMap<CanonicalKey, CacheEntry>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: CanonicalKey) -> Option<&CacheEntry> {
        self.entries.get(&key)
    }

    /// Insert or overwrite the entry for `key`
    pub fn set(&mut self, key: CanonicalKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    /// Remove the entry for `key`, returning whether one existed
    pub fn delete(&mut self, key: CanonicalKey) -> bool {
        self.entries.remove(&key).is_some()
    }

    /// Drop every entry by replacing the backing store
    pub fn clear(&mut self) {
        self.entries = HashMap::new();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
