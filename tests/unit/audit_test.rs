//! Tests for audit sink

use telemetry_delivery::core::{AuditSink, DeliveryAction, DeliveryEvent, InMemoryAuditSink};
use telemetry_delivery::util::{Endpoint, EnvelopeKind, PayloadMetadata};

#[test]
fn test_in_memory_audit_sink() {
    let sink = InMemoryAuditSink::new(10);
    let meta = PayloadMetadata::new(1, "abc", "pid", EnvelopeKind::Session);

    sink.record(DeliveryEvent::for_payload(DeliveryAction::Sent, &meta, 42));
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].action, DeliveryAction::Sent);
    assert_eq!(events[0].payload.as_deref(), Some("session:abc"));
    assert_eq!(events[0].endpoint, Some(Endpoint::Sessions));
    assert_eq!(events[0].created_at_ms, 42);
}

#[test]
fn test_audit_sink_overflow() {
    let sink = InMemoryAuditSink::new(2);
    for at in 0..5 {
        sink.record(DeliveryEvent::new(DeliveryAction::CycleStarted, at));
    }
    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].created_at_ms, 3);
    assert_eq!(events[1].created_at_ms, 4);
}

#[test]
fn test_clones_share_buffer() {
    let sink = InMemoryAuditSink::new(8);
    let other = sink.clone();
    other.record(DeliveryEvent::new(DeliveryAction::BackoffScheduled, 1).with_delay(60_000));
    other.record(DeliveryEvent::new(DeliveryAction::Idle, 2));

    let backoffs = sink.events_of(DeliveryAction::BackoffScheduled);
    assert_eq!(backoffs.len(), 1);
    assert_eq!(backoffs[0].delay_ms, Some(60_000));
}
