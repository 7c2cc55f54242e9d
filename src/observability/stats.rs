//! Request counters reported by the admin API.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Per-process cache outcome counters.
#[derive(Debug, Default)]
pub struct ProxyStats {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    total_requests: AtomicU64,
}

/// Point-in-time copy of [`ProxyStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub total_requests: u64,
    /// Hits as a percentage of all requests.
    pub hit_rate: f64,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        StatsSnapshot {
            hits,
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            total_requests,
            hit_rate: if total_requests > 0 {
                hits as f64 / total_requests as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}
