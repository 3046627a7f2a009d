//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use telemetry_delivery::config::{DeliveryConfig, ExecutorConfig};
use telemetry_delivery::core::{
    Collaborators, DeliveryAction, DeliveryScheduler, DeliveryStats, InMemoryAuditSink,
    LoopState, RequestExecution,
};
use telemetry_delivery::infra::InMemoryPayloadStorage;
use telemetry_delivery::runtime::TokioSpawner;
use telemetry_delivery::util::{
    init_tracing, Clock, Endpoint, EnvelopeKind, ExecutionOutcome, ManualClock, MonotonicClock,
    PayloadMetadata,
};

/// Initial backoff used by the suites. Long enough that only intakes drive
/// follow-up cycles while a test runs.
pub const INITIAL_DELAY_MS: u64 = 60_000;

// ============================================================================
// RECORDING EXECUTION
// ============================================================================

/// One observed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRecord {
    pub endpoint: Endpoint,
    pub kind: EnvelopeKind,
    /// Bodies are the payload uuid, so this identifies the payload.
    pub payload: String,
    pub at_ms: u64,
}

type Responder = Arc<dyn Fn(Endpoint, &str) -> ExecutionOutcome + Send + Sync>;

/// Request execution that records every send and answers from a script,
/// falling back to a responder once the script runs out.
pub struct RecordingExecution {
    clock: ManualClock,
    sends: Mutex<Vec<SendRecord>>,
    script: Mutex<VecDeque<ExecutionOutcome>>,
    responder: Mutex<Responder>,
    gate: Option<Arc<Semaphore>>,
    in_flight: Mutex<HashMap<Endpoint, usize>>,
    max_in_flight: Mutex<HashMap<Endpoint, usize>>,
}

impl RecordingExecution {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            sends: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            responder: Mutex::new(Arc::new(|_: Endpoint, _: &str| ExecutionOutcome::Success)),
            gate: None,
            in_flight: Mutex::new(HashMap::new()),
            max_in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Every send waits for a permit on `gate` before answering.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Queue outcomes answered in order before the responder takes over.
    pub fn script(&self, outcomes: impl IntoIterator<Item = ExecutionOutcome>) {
        self.script.lock().extend(outcomes);
    }

    pub fn respond_with<F>(&self, f: F)
    where
        F: Fn(Endpoint, &str) -> ExecutionOutcome + Send + Sync + 'static,
    {
        *self.responder.lock() = Arc::new(f);
    }

    pub fn always(&self, outcome: ExecutionOutcome) {
        self.respond_with(move |_, _| outcome.clone());
    }

    pub fn sends(&self) -> Vec<SendRecord> {
        self.sends.lock().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sends.lock().len()
    }

    pub fn sends_to(&self, endpoint: Endpoint) -> usize {
        self.sends.lock().iter().filter(|s| s.endpoint == endpoint).count()
    }

    pub fn sends_of(&self, payload: &PayloadMetadata) -> usize {
        self.sends.lock().iter().filter(|s| s.payload == payload.uuid).count()
    }

    /// Highest number of simultaneous sends observed for `endpoint`.
    pub fn max_concurrent(&self, endpoint: Endpoint) -> usize {
        self.max_in_flight.lock().get(&endpoint).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RequestExecution for RecordingExecution {
    async fn send(&self, endpoint: Endpoint, body: Vec<u8>, kind: EnvelopeKind) -> ExecutionOutcome {
        let payload = String::from_utf8_lossy(&body).into_owned();
        {
            let mut in_flight = self.in_flight.lock();
            let current = in_flight.entry(endpoint).or_insert(0);
            *current += 1;
            let mut max = self.max_in_flight.lock();
            let seen = max.entry(endpoint).or_insert(0);
            *seen = (*seen).max(*current);
        }
        self.sends.lock().push(SendRecord {
            endpoint,
            kind,
            payload: payload.clone(),
            at_ms: self.clock.now(),
        });

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                drop(permit);
            }
        }

        let scripted = self.script.lock().pop_front();
        let outcome = scripted.unwrap_or_else(|| {
            let responder = Arc::clone(&*self.responder.lock());
            responder(endpoint, &payload)
        });

        if let Some(current) = self.in_flight.lock().get_mut(&endpoint) {
            *current -= 1;
        }
        outcome
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// Scheduler wired to in-memory collaborators and a hand-driven clock.
pub struct Harness {
    pub clock: ManualClock,
    pub storage: Arc<InMemoryPayloadStorage>,
    pub execution: Arc<RecordingExecution>,
    pub audit: InMemoryAuditSink,
    pub scheduler: DeliveryScheduler<TokioSpawner>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_execution(RecordingExecution::new)
    }

    pub fn with_execution<F>(make: F) -> Self
    where
        F: FnOnce(ManualClock) -> RecordingExecution,
    {
        Self::build(default_config(), make)
    }

    pub fn build<F>(config: DeliveryConfig, make: F) -> Self
    where
        F: FnOnce(ManualClock) -> RecordingExecution,
    {
        init_tracing();
        let clock = ManualClock::new(1_000);
        let storage = Arc::new(InMemoryPayloadStorage::new());
        let execution = Arc::new(make(clock.clone()));
        let audit = InMemoryAuditSink::new(10_000);

        let collaborators = Collaborators::new(
            storage.clone(),
            execution.clone(),
            Arc::new(clock.clone()),
        )
        .with_audit(Arc::new(audit.clone()));
        let spawner = TokioSpawner::try_current().expect("tests run inside a tokio runtime");
        let scheduler = DeliveryScheduler::new(config, collaborators, spawner).unwrap();

        Self {
            clock,
            storage,
            execution,
            audit,
            scheduler,
        }
    }

    /// Store a payload whose body is its uuid.
    pub fn store(&self, uuid: &str, kind: EnvelopeKind) -> PayloadMetadata {
        let meta = PayloadMetadata::new(
            self.clock.now(),
            uuid,
            "pid-1",
            kind,
        );
        self.storage.store(meta.clone(), uuid.as_bytes().to_vec());
        meta
    }

    pub fn stats(&self) -> DeliveryStats {
        self.scheduler.stats()
    }

    /// Wait until at least `cycles` cycles finished and the loop is idle or
    /// backing off.
    pub async fn settle(&self, cycles: u64) -> DeliveryStats {
        wait_until(Duration::from_secs(10), || {
            let stats = self.scheduler.stats();
            stats.cycles >= cycles && stats.state != LoopState::Running
        })
        .await;
        self.scheduler.stats()
    }

    /// Intake, then wait for the cycle it triggers.
    pub async fn intake_and_settle(&self) -> DeliveryStats {
        let before = self.scheduler.stats().cycles;
        self.scheduler.on_payload_intake();
        self.settle(before + 1).await
    }
}

/// Scheduler on a monotonic clock, for timing that depends on rate-limit
/// windows and backoff delays elapsing for real.
pub struct LiveHarness {
    pub clock: Arc<MonotonicClock>,
    pub storage: Arc<InMemoryPayloadStorage>,
    pub execution: Arc<RecordingExecution>,
    pub audit: InMemoryAuditSink,
    pub scheduler: DeliveryScheduler<TokioSpawner>,
}

impl LiveHarness {
    pub fn new(config: DeliveryConfig) -> Self {
        init_tracing();
        let clock = Arc::new(MonotonicClock::new());
        let storage = Arc::new(InMemoryPayloadStorage::new());
        // Send timestamps are not inspected here.
        let execution = Arc::new(RecordingExecution::new(ManualClock::new(0)));
        let audit = InMemoryAuditSink::new(10_000);

        let collaborators = Collaborators::new(storage.clone(), execution.clone(), clock.clone())
            .with_audit(Arc::new(audit.clone()));
        let spawner = TokioSpawner::try_current().expect("tests run inside a tokio runtime");
        let scheduler = DeliveryScheduler::new(config, collaborators, spawner).unwrap();

        Self {
            clock,
            storage,
            execution,
            audit,
            scheduler,
        }
    }

    pub fn store(&self, uuid: &str, kind: EnvelopeKind) -> PayloadMetadata {
        let meta = PayloadMetadata::new(self.clock.now(), uuid, "pid-1", kind);
        self.storage.store(meta.clone(), uuid.as_bytes().to_vec());
        meta
    }

    pub fn delays_of(&self, action: DeliveryAction) -> Vec<u64> {
        self.audit
            .events_of(action)
            .iter()
            .filter_map(|e| e.delay_ms)
            .collect()
    }
}

pub fn default_config() -> DeliveryConfig {
    DeliveryConfig::default()
        .with_initial_delay_ms(INITIAL_DELAY_MS)
        .with_delivery(ExecutorConfig::new().with_worker_count(1))
}

/// Poll `condition` until it holds, panicking after `timeout`.
pub async fn wait_until<F>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {timeout:?}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
