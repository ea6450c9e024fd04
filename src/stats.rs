//! Proxy-wide counters
//!
//! Tracks sessions, requests and backend traffic. Updated by every session;
//! read for logging only.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Usage statistics for the proxy
#[derive(Debug, Default)]
pub struct ProxyStats {
    /// Client connections accepted
    sessions_opened: AtomicU64,
    /// Client connections currently open
    sessions_active: AtomicU64,
    /// Non-blank request lines handled
    requests: AtomicU64,
    /// Lines rejected as invalid JSON or invalid requests
    invalid_requests: AtomicU64,
    /// Requests answered from the cache
    cache_hits: AtomicU64,
    /// Requests sent to the backend
    backend_forwards: AtomicU64,
    /// Connect/send/receive failures and malformed backend replies
    backend_failures: AtomicU64,
}

impl ProxyStats {
    /// Create new statistics tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted client connection
    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished client connection
    pub fn session_closed(&self) {
        // Saturates at zero
        let _ = self
            .sessions_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Record a handled request line
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected request line
    pub fn record_invalid(&self) {
        self.invalid_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache hit
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request forwarded to the backend
    pub fn record_forward(&self) {
        self.backend_forwards.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a backend failure
    pub fn record_backend_failure(&self) {
        self.backend_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current statistics
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            invalid_requests: self.invalid_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            backend_forwards: self.backend_forwards.load(Ordering::Relaxed),
            backend_failures: self.backend_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ProxyStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Client connections accepted
    pub sessions_opened: u64,
    /// Client connections currently open
    pub sessions_active: u64,
    /// Non-blank request lines handled
    pub requests: u64,
    /// Lines rejected as invalid
    pub invalid_requests: u64,
    /// Requests answered from the cache
    pub cache_hits: u64,
    /// Requests sent to the backend
    pub backend_forwards: u64,
    /// Backend failures
    pub backend_failures: u64,
}
