//! Delivery audit trail.
//!
//! The scheduler reports what it did (cycles, sends, outcomes, backoff) to an
//! optional [`AuditSink`]. The in-memory sink keeps a bounded buffer and is
//! what tests use to observe ordering.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::util::serde::{Endpoint, PayloadMetadata};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryAction {
    /// An orchestration cycle began.
    CycleStarted,
    /// A send attempt was made.
    Sent,
    /// The collector accepted a payload and it was removed from storage.
    Delivered,
    /// A send attempt failed and will be retried.
    Failed,
    /// The collector rate limited an endpoint.
    RateLimited,
    /// A payload could not be loaded and was skipped.
    Dropped,
    /// Deleting a delivered payload failed; it will not be sent again.
    DeleteFailed,
    /// A follow-up cycle was scheduled after a delay.
    BackoffScheduled,
    /// Nothing failed, but a follow-up cycle waits for a rate-limit window
    /// to close.
    AwaitingUnblock,
    /// The loop went idle with nothing left to send.
    Idle,
}

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryEvent {
    /// Action taken.
    pub action: DeliveryAction,
    /// Payload involved, rendered as `kind:uuid`.
    pub payload: Option<String>,
    /// Endpoint involved.
    pub endpoint: Option<Endpoint>,
    /// Delay or block duration, where one applies.
    pub delay_ms: Option<u64>,
    /// Timestamp milliseconds.
    pub created_at_ms: u64,
}

impl DeliveryEvent {
    /// Event without payload context.
    #[must_use]
    pub const fn new(action: DeliveryAction, created_at_ms: u64) -> Self {
        Self {
            action,
            payload: None,
            endpoint: None,
            delay_ms: None,
            created_at_ms,
        }
    }

    /// Event about a specific payload.
    #[must_use]
    pub fn for_payload(action: DeliveryAction, meta: &PayloadMetadata, created_at_ms: u64) -> Self {
        Self {
            action,
            payload: Some(meta.to_string()),
            endpoint: Some(meta.endpoint),
            delay_ms: None,
            created_at_ms,
        }
    }

    /// Attach a delay.
    #[must_use]
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }
}

/// Audit sink abstraction.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: DeliveryEvent);
}

/// In-memory audit sink for testing and dev. Clones share the buffer.
#[derive(Clone)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<VecDeque<DeliveryEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(1024)))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<DeliveryEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Snapshot of events with the given action.
    #[must_use]
    pub fn events_of(&self, action: DeliveryAction) -> Vec<DeliveryEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: DeliveryEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}
