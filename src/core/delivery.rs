//! Per-endpoint delivery lanes.
//!
//! A lane is the ordered list of payloads a cycle sends to one endpoint. It
//! runs as a single task on the delivery executor and sends sequentially, so
//! an endpoint never has more than one request in flight. The lane holds an
//! [`InFlightGuard`] for its endpoint until it finishes or is dropped.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::core::audit::{AuditSink, DeliveryAction, DeliveryEvent};
use crate::core::backpressure::EndpointBackpressureTracker;
use crate::core::collaborators::{Collaborators, PayloadStorage, RequestExecution};
use crate::core::StorageError;
use crate::util::clock::Clock;
use crate::util::serde::{Endpoint, EnvelopeKind, ExecutionOutcome, PayloadMetadata, TaskPriority};

#[derive(Debug, Default)]
pub(crate) struct DeliveryCounters {
    pub cycles: AtomicU64,
    pub send_attempts: AtomicU64,
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
    pub rate_limited: AtomicU64,
    pub dropped: AtomicU64,
    pub scheduled_backoff_ms: AtomicU64,
}

/// What one lane, or a whole cycle, left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct LaneReport {
    pub delivered: u64,
    pub failed: u64,
    pub rate_limited: u64,
    pub dropped: u64,
    /// Eligible payloads not attempted because their endpoint was blocked.
    pub blocked: u64,
    /// Delivered payloads whose delete still has to succeed.
    pub pending_delete: u64,
    pub storage_errors: u64,
    /// An endpoint was busy, so some payloads wait for an immediate follow-up.
    pub deferred: bool,
}

impl LaneReport {
    pub fn absorb(&mut self, other: &Self) {
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.rate_limited += other.rate_limited;
        self.dropped += other.dropped;
        self.blocked += other.blocked;
        self.pending_delete += other.pending_delete;
        self.storage_errors += other.storage_errors;
        self.deferred |= other.deferred;
    }

    /// Something went wrong that the doubling backoff has to cover. Rate
    /// limits are backpressure, not failures.
    pub const fn has_failures(&self) -> bool {
        self.failed + self.pending_delete + self.storage_errors > 0
    }

    /// Payloads were held back by a rate-limit window.
    pub const fn is_backpressured(&self) -> bool {
        self.rate_limited + self.blocked > 0
    }
}

/// State shared by the orchestration loop and the lanes it dispatches.
pub(crate) struct DeliveryContext {
    pub storage: Arc<dyn PayloadStorage>,
    pub execution: Arc<dyn RequestExecution>,
    pub clock: Arc<dyn Clock>,
    pub audit: Option<Arc<dyn AuditSink>>,
    pub backpressure: EndpointBackpressureTracker,
    pub counters: DeliveryCounters,
    in_flight: Mutex<HashSet<Endpoint>>,
    // Sent successfully but not yet removed from storage. Never sent again.
    awaiting_delete: Mutex<HashSet<PayloadMetadata>>,
}

impl DeliveryContext {
    pub fn new(collaborators: Collaborators) -> Self {
        let Collaborators {
            storage,
            execution,
            clock,
            audit,
        } = collaborators;
        Self {
            storage,
            execution,
            clock,
            audit,
            backpressure: EndpointBackpressureTracker::new(),
            counters: DeliveryCounters::default(),
            in_flight: Mutex::new(HashSet::new()),
            awaiting_delete: Mutex::new(HashSet::new()),
        }
    }

    pub fn record(&self, action: DeliveryAction) {
        if let Some(audit) = &self.audit {
            audit.record(DeliveryEvent::new(action, self.clock.now()));
        }
    }

    pub fn record_event(&self, event: DeliveryEvent) {
        if let Some(audit) = &self.audit {
            audit.record(event);
        }
    }

    fn record_payload(&self, action: DeliveryAction, meta: &PayloadMetadata) {
        if let Some(audit) = &self.audit {
            audit.record(DeliveryEvent::for_payload(action, meta, self.clock.now()));
        }
    }

    /// Mark `endpoint` busy. `None` if a send to it is already in flight.
    pub fn try_claim(self: &Arc<Self>, endpoint: Endpoint) -> Option<InFlightGuard> {
        if self.in_flight.lock().insert(endpoint) {
            Some(InFlightGuard {
                ctx: Arc::clone(self),
                endpoint,
            })
        } else {
            None
        }
    }

    /// Forget delete retries for payloads storage no longer lists.
    pub fn retain_awaiting_delete(&self, ready: &[PayloadMetadata]) {
        let mut awaiting = self.awaiting_delete.lock();
        if !awaiting.is_empty() {
            let listed: HashSet<&PayloadMetadata> = ready.iter().collect();
            awaiting.retain(|meta| listed.contains(meta));
        }
    }

    pub fn is_awaiting_delete(&self, meta: &PayloadMetadata) -> bool {
        self.awaiting_delete.lock().contains(meta)
    }

    async fn delete_delivered(&self, meta: &PayloadMetadata, report: &mut LaneReport) {
        match self.storage.delete(meta).await {
            Ok(()) => {
                self.awaiting_delete.lock().remove(meta);
                debug!(payload_id = %meta, "payload removed from storage");
            }
            Err(e) => {
                warn!(payload_id = %meta, error = %e, "failed to delete delivered payload");
                self.awaiting_delete.lock().insert(meta.clone());
                report.pending_delete += 1;
                self.record_payload(DeliveryAction::DeleteFailed, meta);
            }
        }
    }
}

/// Releases an endpoint's in-flight slot on drop.
pub(crate) struct InFlightGuard {
    ctx: Arc<DeliveryContext>,
    endpoint: Endpoint,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ctx.in_flight.lock().remove(&self.endpoint);
    }
}

/// Executor priority for a lane, taken from its first payload.
pub(crate) fn lane_priority(first: &PayloadMetadata) -> TaskPriority {
    if first.kind == EnvelopeKind::Session {
        TaskPriority::High
    } else {
        TaskPriority::Normal
    }
}

/// Send `payloads` to `endpoint` in order, stopping early if the endpoint
/// becomes rate limited.
pub(crate) async fn run_lane(
    ctx: Arc<DeliveryContext>,
    endpoint: Endpoint,
    payloads: Vec<PayloadMetadata>,
    guard: InFlightGuard,
) -> LaneReport {
    let mut report = LaneReport::default();
    let total = payloads.len();

    for (idx, meta) in payloads.iter().enumerate() {
        if ctx.backpressure.is_blocked(endpoint, ctx.clock.now()) {
            report.blocked += (total - idx) as u64;
            debug!(endpoint = %endpoint, remaining = total - idx, "lane stopped, endpoint blocked");
            break;
        }

        if ctx.is_awaiting_delete(meta) {
            ctx.delete_delivered(meta, &mut report).await;
            continue;
        }

        let body = match ctx.storage.load_body(meta).await {
            Ok(body) => body,
            Err(StorageError::NotFound(_)) => {
                info!(payload_id = %meta, "payload vanished before send, dropping");
                report.dropped += 1;
                ctx.counters.dropped.fetch_add(1, Ordering::Relaxed);
                ctx.record_payload(DeliveryAction::Dropped, meta);
                continue;
            }
            Err(e) => {
                warn!(payload_id = %meta, error = %e, "failed to load payload body");
                report.storage_errors += 1;
                continue;
            }
        };

        ctx.counters.send_attempts.fetch_add(1, Ordering::Relaxed);
        ctx.record_payload(DeliveryAction::Sent, meta);
        debug!(payload_id = %meta, endpoint = %endpoint, "sending payload");

        match ctx.execution.send(endpoint, body, meta.kind).await {
            ExecutionOutcome::Success => {
                report.delivered += 1;
                ctx.counters.delivered.fetch_add(1, Ordering::Relaxed);
                ctx.record_payload(DeliveryAction::Delivered, meta);
                ctx.delete_delivered(meta, &mut report).await;
            }
            ExecutionOutcome::Failure { http_status } => {
                debug!(payload_id = %meta, ?http_status, "send failed, will retry");
                report.failed += 1;
                ctx.counters.failed.fetch_add(1, Ordering::Relaxed);
                ctx.record_payload(DeliveryAction::Failed, meta);
            }
            ExecutionOutcome::RateLimited {
                endpoint: limited,
                blocked_for_ms,
            } => {
                ctx.backpressure.block(limited, ctx.clock.now(), blocked_for_ms);
                report.rate_limited += 1;
                ctx.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
                ctx.record_event(
                    DeliveryEvent::for_payload(DeliveryAction::RateLimited, meta, ctx.clock.now())
                        .with_delay(blocked_for_ms),
                );
                if limited == endpoint {
                    report.blocked += (total - idx - 1) as u64;
                    break;
                }
            }
        }
    }

    drop(guard);
    report
}
