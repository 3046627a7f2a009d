//! Delivery scheduler: the orchestration loop over pending payloads.
//!
//! Intake and connectivity events are non-blocking. At most one orchestration
//! loop runs at a time, guarded by an atomically swapped `running` flag; events
//! arriving while it runs are coalesced into a `pending` flag the loop checks
//! before it finishes. The loop itself lives on the scheduling context (a
//! [`Spawn`] implementation) and never blocks: sends are handed to the
//! delivery executor as per-endpoint lanes and awaited through their handles.
//!
//! After a cycle with failures the loop waits out a doubling [`Backoff`]
//! delay, cut short by any new intake. A cycle held back only by rate limits
//! waits for the earliest window to close without advancing the backoff. A
//! fully successful cycle resets the delay.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::DeliveryConfig;
use crate::core::audit::{DeliveryAction, DeliveryEvent};
use crate::core::backoff::Backoff;
use crate::core::backpressure::EndpointBackpressureTracker;
use crate::core::collaborators::Collaborators;
use crate::core::delivery::{lane_priority, run_lane, DeliveryContext, InFlightGuard, LaneReport};
use crate::core::priority_executor::{ExecutorStats, PriorityTaskExecutor};
use crate::core::spawn::Spawn;
use crate::core::{DeliveryError, ExecutorError};
use crate::util::serde::{Endpoint, NetworkStatus, PayloadMetadata};

/// What the orchestration loop is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No loop is running.
    Idle,
    /// A cycle is in progress.
    Running,
    /// Waiting out a backoff delay before the next cycle.
    BackingOff,
}

impl LoopState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::BackingOff => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::BackingOff,
            _ => Self::Idle,
        }
    }
}

/// Snapshot of scheduler counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Completed orchestration cycles.
    pub cycles: u64,
    /// Send attempts handed to the request execution collaborator.
    pub send_attempts: u64,
    /// Payloads accepted by the collector.
    pub delivered: u64,
    /// Send attempts that failed and will be retried.
    pub failed: u64,
    /// Send attempts answered with a rate limit.
    pub rate_limited: u64,
    /// Payloads that vanished before they could be sent.
    pub dropped: u64,
    /// Delay of the current wait before the next cycle, zero when not
    /// backing off.
    pub scheduled_backoff_ms: u64,
    /// Loop state.
    pub state: LoopState,
}

struct SchedulerInner {
    ctx: Arc<DeliveryContext>,
    executor: PriorityTaskExecutor,
    backoff: Mutex<Backoff>,
    running: AtomicBool,
    pending: AtomicBool,
    shutdown: AtomicBool,
    reachable: AtomicBool,
    state: AtomicU8,
    wake: tokio::sync::Notify,
}

/// Schedules delivery of stored payloads with backoff and per-endpoint
/// backpressure.
pub struct DeliveryScheduler<S: Spawn> {
    inner: Arc<SchedulerInner>,
    spawner: S,
    config: DeliveryConfig,
}

impl<S: Spawn> DeliveryScheduler<S> {
    /// Create a scheduler. Its delivery executor threads start immediately;
    /// no cycle runs until the first intake.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::InvalidConfig`] for a bad configuration, or an
    /// executor error if the delivery threads cannot start.
    pub fn new(
        config: DeliveryConfig,
        collaborators: Collaborators,
        spawner: S,
    ) -> Result<Self, DeliveryError> {
        config.validate().map_err(DeliveryError::InvalidConfig)?;

        let executor = PriorityTaskExecutor::new(
            "telemetry-delivery",
            config.delivery.clone(),
            Arc::clone(&collaborators.clock),
        )?;
        let backoff = Backoff::new(config.initial_delay(), config.max_retry_interval());

        let inner = Arc::new(SchedulerInner {
            ctx: Arc::new(DeliveryContext::new(collaborators)),
            executor,
            backoff: Mutex::new(backoff),
            running: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            reachable: AtomicBool::new(true),
            state: AtomicU8::new(LoopState::Idle.as_u8()),
            wake: tokio::sync::Notify::new(),
        });

        info!(
            initial_delay_ms = config.initial_delay_ms,
            max_retry_interval_ms = ?config.max_retry_interval_ms,
            "delivery scheduler created"
        );
        Ok(Self {
            inner,
            spawner,
            config,
        })
    }

    /// Signal that at least one payload is ready. Starts the loop if it is
    /// idle, otherwise makes the running loop look again before it stops and
    /// cuts any backoff wait short. Never blocks; a no-op after shutdown.
    pub fn on_payload_intake(&self) {
        if self.inner.shutdown.load(Ordering::Acquire) {
            debug!("intake ignored after shutdown");
            return;
        }
        self.inner.pending.store(true, Ordering::SeqCst);

        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            debug!("starting delivery loop");
            let inner = Arc::clone(&self.inner);
            self.spawner.spawn(async move { inner.run_loop().await });
        } else {
            self.inner.wake.notify_waiters();
        }
    }

    /// Record a connectivity change. A reachable status triggers an immediate
    /// cycle; `NotReachable` keeps the loop from dispatching until it clears.
    /// Rate-limit blocks are never lifted early.
    pub fn on_network_connectivity_changed(&self, status: NetworkStatus) {
        let reachable = status.is_reachable();
        let was = self.inner.reachable.swap(reachable, Ordering::SeqCst);
        info!(?status, "network connectivity changed");
        if reachable {
            if !was {
                debug!("connectivity restored");
            }
            self.on_payload_intake();
        }
    }

    /// Stop scheduling new cycles and wake any backoff wait. Lanes already
    /// dispatched keep running. Returns immediately.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("delivery scheduler shutting down");
        self.inner.wake.notify_waiters();
    }

    /// [`shutdown`](Self::shutdown), then let dispatched sends drain for up
    /// to `timeout`. Blocks the calling thread.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::Executor`] wrapping [`ExecutorError::Timeout`] if
    /// sends are still running at the deadline.
    pub fn shutdown_and_drain(&self, timeout: Duration) -> Result<(), DeliveryError> {
        self.shutdown();
        self.inner.executor.shutdown(timeout)?;
        Ok(())
    }

    /// Shut down and drain using the configured timeout.
    ///
    /// # Errors
    ///
    /// Same as [`shutdown_and_drain`](Self::shutdown_and_drain).
    pub fn close(&self) -> Result<(), DeliveryError> {
        self.shutdown_and_drain(self.config.shutdown_timeout())
    }

    /// True once shutdown has begun.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> DeliveryStats {
        let counters = &self.inner.ctx.counters;
        DeliveryStats {
            cycles: counters.cycles.load(Ordering::Acquire),
            send_attempts: counters.send_attempts.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            rate_limited: counters.rate_limited.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            scheduled_backoff_ms: counters.scheduled_backoff_ms.load(Ordering::Relaxed),
            state: self.inner.state(),
        }
    }

    /// Delivery executor statistics.
    #[must_use]
    pub fn executor_stats(&self) -> ExecutorStats {
        self.inner.executor.stats()
    }

    /// Rate-limit windows recorded so far.
    #[must_use]
    pub fn backpressure(&self) -> &EndpointBackpressureTracker {
        &self.inner.ctx.backpressure
    }

    /// Configuration the scheduler was built with.
    #[must_use]
    pub const fn config(&self) -> &DeliveryConfig {
        &self.config
    }
}

impl<S: Spawn> Drop for DeliveryScheduler<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl SchedulerInner {
    fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: LoopState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn may_dispatch(&self) -> bool {
        !self.shutdown.load(Ordering::SeqCst) && self.reachable.load(Ordering::SeqCst)
    }

    async fn run_loop(self: Arc<Self>) {
        loop {
            if !self.may_dispatch() {
                if self.go_idle() {
                    continue;
                }
                return;
            }

            self.set_state(LoopState::Running);
            let report = self.run_cycle().await;

            if let Some((delay, action)) = self.follow_up_delay(&report) {
                self.wait_for_follow_up(delay, action, &report).await;
                continue;
            }

            if !report.is_backpressured() {
                self.backoff.lock().reset();
            }
            // Deferred lanes, racing intakes and windows that closed during the
            // cycle all get an immediate follow-up.
            if report.deferred || report.is_backpressured() || self.pending.load(Ordering::SeqCst) {
                self.ctx.counters.cycles.fetch_add(1, Ordering::Release);
                tokio::task::yield_now().await;
                continue;
            }

            self.ctx.counters.scheduled_backoff_ms.store(0, Ordering::Relaxed);
            self.ctx.counters.cycles.fetch_add(1, Ordering::Release);
            if self.go_idle() {
                continue;
            }
            return;
        }
    }

    /// How long to wait before the next cycle, if at all.
    ///
    /// Failures advance the doubling backoff. A cycle held back only by rate
    /// limits waits for the earliest window to close and leaves the backoff
    /// where it was.
    fn follow_up_delay(&self, report: &LaneReport) -> Option<(Duration, DeliveryAction)> {
        let unblock = if report.is_backpressured() {
            let now = self.ctx.clock.now();
            self.ctx
                .backpressure
                .next_unblock(now)
                .map(|until| Duration::from_millis(until - now))
        } else {
            None
        };

        if report.has_failures() {
            let delay = self.backoff.lock().next_delay();
            let delay = unblock.map_or(delay, |unblock| delay.min(unblock));
            return Some((delay, DeliveryAction::BackoffScheduled));
        }
        unblock.map(|delay| (delay, DeliveryAction::AwaitingUnblock))
    }

    async fn wait_for_follow_up(&self, delay: Duration, action: DeliveryAction, report: &LaneReport) {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.ctx.counters.scheduled_backoff_ms.store(delay_ms, Ordering::Relaxed);
        self.set_state(LoopState::BackingOff);
        self.ctx.record_event(DeliveryEvent::new(action, self.ctx.clock.now()).with_delay(delay_ms));
        self.ctx.counters.cycles.fetch_add(1, Ordering::Release);
        info!(
            delay_ms,
            ?action,
            failed = report.failed,
            rate_limited = report.rate_limited,
            blocked = report.blocked,
            "payloads left undelivered, waiting before next cycle"
        );

        let notified = self.wake.notified();
        tokio::pin!(notified);
        // Registered before the flag checks so an intake in between still wakes us.
        notified.as_mut().enable();
        if !self.pending.load(Ordering::SeqCst) && !self.shutdown.load(Ordering::SeqCst) {
            tokio::select! {
                () = tokio::time::sleep(delay) => debug!(delay_ms, "wait elapsed"),
                () = notified => debug!("wait cut short"),
            }
        }
        self.ctx.counters.scheduled_backoff_ms.store(0, Ordering::Relaxed);
    }

    /// Park the loop. Returns true if a racing intake means it must keep going.
    fn go_idle(&self) -> bool {
        self.ctx.record(DeliveryAction::Idle);
        self.set_state(LoopState::Idle);
        self.running.store(false, Ordering::SeqCst);
        debug!("delivery loop idle");

        // An intake that saw `running` still set only raised `pending`.
        self.pending.load(Ordering::SeqCst)
            && self.may_dispatch()
            && self
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }

    /// One orchestration cycle: keep querying storage and dispatching lanes
    /// while intakes keep arriving.
    async fn run_cycle(&self) -> LaneReport {
        self.ctx.record(DeliveryAction::CycleStarted);
        let mut report = LaneReport::default();
        let mut attempted: HashSet<PayloadMetadata> = HashSet::new();

        loop {
            self.pending.store(false, Ordering::SeqCst);
            if !self.may_dispatch() {
                break;
            }

            let ready = match self.ctx.storage.ready_payloads().await {
                Ok(ready) => ready,
                Err(e) => {
                    warn!(error = %e, "failed to list ready payloads");
                    report.storage_errors += 1;
                    break;
                }
            };
            self.ctx.retain_awaiting_delete(&ready);

            let pass = self.dispatch(ready, &mut attempted).await;
            report.absorb(&pass);

            if !self.pending.load(Ordering::SeqCst) {
                break;
            }
            debug!("intake during cycle, querying storage again");
        }

        report
    }

    /// Group eligible payloads into per-endpoint lanes, run them on the
    /// delivery executor and wait for all of them.
    async fn dispatch(
        &self,
        ready: Vec<PayloadMetadata>,
        attempted: &mut HashSet<PayloadMetadata>,
    ) -> LaneReport {
        let mut report = LaneReport::default();
        let now = self.ctx.clock.now();
        let mut lanes: Vec<(Endpoint, Vec<PayloadMetadata>, InFlightGuard)> = Vec::new();
        let mut busy: HashSet<Endpoint> = HashSet::new();

        for meta in ready {
            if !meta.complete || attempted.contains(&meta) {
                continue;
            }
            let endpoint = meta.endpoint;
            if self.ctx.backpressure.is_blocked(endpoint, now) {
                debug!(payload_id = %meta, endpoint = %endpoint, "endpoint blocked, skipping");
                report.blocked += 1;
                continue;
            }
            if busy.contains(&endpoint) {
                report.deferred = true;
                continue;
            }
            if let Some((_, payloads, _)) = lanes.iter_mut().find(|(e, _, _)| *e == endpoint) {
                attempted.insert(meta.clone());
                payloads.push(meta);
                continue;
            }
            // Lanes from an earlier pass are joined before this one starts, so a
            // claim only fails if a lane outlives its dispatch.
            match self.ctx.try_claim(endpoint) {
                Some(guard) => {
                    attempted.insert(meta.clone());
                    lanes.push((endpoint, vec![meta], guard));
                }
                None => {
                    debug!(endpoint = %endpoint, "send already in flight, deferring");
                    busy.insert(endpoint);
                    report.deferred = true;
                }
            }
        }

        let mut handles = Vec::with_capacity(lanes.len());
        for (endpoint, payloads, guard) in lanes {
            let priority = lane_priority(&payloads[0]);
            let count = payloads.len() as u64;
            let lane = run_lane(Arc::clone(&self.ctx), endpoint, payloads, guard);
            match self.executor.submit(priority, lane) {
                Ok(handle) => handles.push((endpoint, handle)),
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "could not dispatch lane");
                    report.failed += count;
                }
            }
        }

        for (endpoint, handle) in handles {
            match handle.join().await {
                Ok(lane) => report.absorb(&lane),
                Err(ExecutorError::TaskPanicked) => {
                    warn!(endpoint = %endpoint, "delivery lane panicked");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "delivery lane failed");
                    report.failed += 1;
                }
            }
        }

        report
    }
}
