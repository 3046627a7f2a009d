//! Per-endpoint rate-limit windows.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::util::serde::Endpoint;

/// Maps endpoint to the timestamp until which it must not be contacted.
///
/// Entries are never evicted automatically; an expired entry simply reports
/// "not blocked" until it is overwritten or cleared.
#[derive(Debug, Default)]
pub struct EndpointBackpressureTracker {
    blocked_until: RwLock<HashMap<Endpoint, u64>>,
}

impl EndpointBackpressureTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True while `now < blocked_until` for `endpoint`.
    #[must_use]
    pub fn is_blocked(&self, endpoint: Endpoint, now: u64) -> bool {
        self.blocked_until
            .read()
            .get(&endpoint)
            .is_some_and(|until| now < *until)
    }

    /// Block `endpoint` for `duration_ms` starting at `now`, replacing any
    /// previous window.
    pub fn block(&self, endpoint: Endpoint, now: u64, duration_ms: u64) {
        let until = now.saturating_add(duration_ms);
        self.blocked_until.write().insert(endpoint, until);
        tracing::info!(endpoint = %endpoint, blocked_until = until, "endpoint rate limited");
    }

    /// Raw block timestamp, expired or not.
    #[must_use]
    pub fn blocked_until(&self, endpoint: Endpoint) -> Option<u64> {
        self.blocked_until.read().get(&endpoint).copied()
    }

    /// Earliest timestamp after `now` at which a blocked endpoint reopens.
    #[must_use]
    pub fn next_unblock(&self, now: u64) -> Option<u64> {
        self.blocked_until
            .read()
            .values()
            .copied()
            .filter(|until| now < *until)
            .min()
    }

    /// Drop expired entries and return how many were removed.
    pub fn clear_expired(&self, now: u64) -> usize {
        let mut map = self.blocked_until.write();
        let before = map.len();
        map.retain(|_, until| now < *until);
        before - map.len()
    }
}
