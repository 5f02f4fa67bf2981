//! Messenger Statistics
//!
//! Lock-free counters updated on the request path and read as a snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by a `Messenger`
#[derive(Debug, Default)]
pub struct MessengerStats {
    /// Requests answered from the cache
    pub cache_hits: AtomicU64,
    /// Requests that went to the channel
    pub cache_misses: AtomicU64,
    /// Channel round trips that returned a value
    pub round_trips: AtomicU64,
    /// Channel sends that failed at the transport level
    pub channel_failures: AtomicU64,
    /// Error envelopes received from remote resolvers
    pub remote_failures: AtomicU64,
    /// Replies pushed through `send_response`
    pub responses_sent: AtomicU64,
}

impl MessengerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_round_trip(&self) {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_channel_failure(&self) {
        self.channel_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_failure(&self) {
        self.remote_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response_sent(&self) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Get statistics snapshot
    pub fn snapshot(&self, interned_messages: usize, cached_entries: usize) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            round_trips: self.round_trips.load(Ordering::Relaxed),
            channel_failures: self.channel_failures.load(Ordering::Relaxed),
            remote_failures: self.remote_failures.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
            interned_messages,
            cached_entries,
        }
    }
}

/// Point-in-time view of messenger statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub round_trips: u64,
    pub channel_failures: u64,
    pub remote_failures: u64,
    pub responses_sent: u64,
    /// Size of the key resolver arena
    pub interned_messages: usize,
    /// Entries currently held by the response cache
    pub cached_entries: usize,
}

impl StatsSnapshot {
    /// Total `send_message` calls observed
    pub fn total_requests(&self) -> u64 {
        self.cache_hits + self.cache_misses
    }

    /// Fraction of requests served from the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / total as f64
    }
}
