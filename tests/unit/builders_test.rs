//! Tests for builder modules

use std::sync::Arc;

use telemetry_delivery::builders::build_scheduler;
use telemetry_delivery::config::{DeliveryConfig, ExecutorConfig};
use telemetry_delivery::core::{Collaborators, DeliveryError, LoopState, RequestExecution};
use telemetry_delivery::infra::InMemoryPayloadStorage;
use telemetry_delivery::runtime::TokioSpawner;
use telemetry_delivery::util::{Endpoint, EnvelopeKind, ExecutionOutcome, ManualClock};

struct AlwaysOk;

#[async_trait::async_trait]
impl RequestExecution for AlwaysOk {
    async fn send(&self, _endpoint: Endpoint, _body: Vec<u8>, _kind: EnvelopeKind) -> ExecutionOutcome {
        ExecutionOutcome::Success
    }
}

fn collaborators() -> Collaborators {
    Collaborators::new(
        Arc::new(InMemoryPayloadStorage::new()),
        Arc::new(AlwaysOk),
        Arc::new(ManualClock::new(0)),
    )
}

#[tokio::test]
async fn test_build_scheduler_defaults() {
    let cfg = DeliveryConfig::default();
    let scheduler = build_scheduler(
        &cfg,
        collaborators(),
        TokioSpawner::new(tokio::runtime::Handle::current()),
    )
    .unwrap();

    assert_eq!(scheduler.config(), &cfg);
    assert_eq!(scheduler.stats().state, LoopState::Idle);
    assert_eq!(scheduler.stats().cycles, 0);
    assert_eq!(scheduler.executor_stats().worker_count, 1);
}

#[tokio::test]
async fn test_build_scheduler_rejects_invalid_config() {
    let cfg = DeliveryConfig::default().with_delivery(ExecutorConfig::new().with_worker_count(0));
    let result = build_scheduler(
        &cfg,
        collaborators(),
        TokioSpawner::new(tokio::runtime::Handle::current()),
    );

    match result {
        Err(DeliveryError::InvalidConfig(msg)) => assert!(msg.contains("worker_count")),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("invalid config accepted"),
    }
}
