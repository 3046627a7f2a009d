//! Priority task executor with age-based starvation avoidance.
//!
//! Work is queued in an [`InMemoryQueue`] ranked by
//! `submitted_at + priority.delay_threshold_ms()` and executed on dedicated OS
//! threads. Each worker owns a single-threaded tokio runtime, so tasks are
//! futures and may also block the thread for the length of an I/O call
//! without touching the host's async runtime.
//!
//! # Design Principles
//!
//! - **No polling**: idle workers park on a `Condvar` until work or shutdown arrives
//! - **Fail fast**: submissions after shutdown or past the queue depth are rejected immediately
//! - **Drain on shutdown**: queued work still runs; `shutdown` waits for it up to a timeout

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::ExecutorConfig;
use crate::core::ExecutorError;
use crate::infra::queue::memory::{InMemoryQueue, PriorityTask};
use crate::util::clock::Clock;
use crate::util::serde::TaskPriority;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Statistics about executor utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Tasks waiting in the queue.
    pub queued_tasks: u64,
    /// Tasks currently executing.
    pub active_tasks: u64,
    /// Tasks accepted by `submit`.
    pub submitted_tasks: u64,
    /// Tasks that ran to completion.
    pub completed_tasks: u64,
    /// Tasks that panicked.
    pub panicked_tasks: u64,
}

#[derive(Debug, Default)]
struct ExecutorCounters {
    queued_tasks: AtomicU64,
    active_tasks: AtomicU64,
    submitted_tasks: AtomicU64,
    completed_tasks: AtomicU64,
    panicked_tasks: AtomicU64,
}

impl ExecutorCounters {
    fn snapshot(&self, worker_count: usize) -> ExecutorStats {
        ExecutorStats {
            worker_count,
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            panicked_tasks: self.panicked_tasks.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the executor handle and its workers.
struct Shared {
    queue: Mutex<InMemoryQueue<Job>>,
    work_available: Condvar,
    shutdown: AtomicBool,
    counters: ExecutorCounters,
}

/// Handle to the eventual result of a submitted task.
#[must_use = "dropping a handle does not cancel the task"]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Wait for the task to finish.
    ///
    /// # Errors
    ///
    /// [`ExecutorError::TaskPanicked`] if the task panicked or was dropped
    /// without running.
    pub async fn join(self) -> Result<T, ExecutorError> {
        self.rx.await.map_err(|_| ExecutorError::TaskPanicked)
    }

    /// Block the current thread until the task finishes. Must not be called
    /// from inside an async runtime.
    ///
    /// # Errors
    ///
    /// Same as [`join`](Self::join).
    pub fn blocking_join(self) -> Result<T, ExecutorError> {
        self.rx.blocking_recv().map_err(|_| ExecutorError::TaskPanicked)
    }
}

/// Executes futures on dedicated threads in aging-priority order.
pub struct PriorityTaskExecutor {
    name: String,
    config: ExecutorConfig,
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PriorityTaskExecutor {
    /// Create an executor and spawn `config.worker_count` threads named
    /// `{name}-{index}`.
    ///
    /// # Errors
    ///
    /// [`ExecutorError::InvalidConfig`] for a bad configuration and
    /// [`ExecutorError::Spawn`] if a runtime or thread cannot be created.
    pub fn new(
        name: impl Into<String>,
        config: ExecutorConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ExecutorError> {
        config.validate().map_err(ExecutorError::InvalidConfig)?;
        let name = name.into();

        let shared = Arc::new(Shared {
            queue: Mutex::new(InMemoryQueue::new(config.max_queue_depth)),
            work_available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            counters: ExecutorCounters::default(),
        });

        let executor = Self {
            name,
            config,
            clock,
            shared,
            workers: Mutex::new(Vec::new()),
        };

        for worker_id in 0..executor.config.worker_count {
            match spawn_worker(
                &executor.name,
                worker_id,
                Arc::clone(&executor.shared),
                executor.config.thread_stack_size,
            ) {
                Ok(handle) => executor.workers.lock().push(handle),
                Err(e) => {
                    // Release the workers that did start.
                    executor.signal_shutdown();
                    return Err(e);
                }
            }
        }

        info!(
            executor = %executor.name,
            worker_count = executor.config.worker_count,
            max_queue_depth = executor.config.max_queue_depth,
            "priority executor started"
        );
        Ok(executor)
    }

    /// Queue `task` at `priority`.
    ///
    /// # Errors
    ///
    /// [`ExecutorError::Shutdown`] after shutdown began and
    /// [`ExecutorError::QueueFull`] at the configured depth. Neither blocks.
    pub fn submit<F, T>(&self, priority: TaskPriority, task: F) -> Result<TaskHandle<T>, ExecutorError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(ExecutorError::Shutdown);
        }

        let (tx, rx) = oneshot::channel();
        let job = track_job(Arc::clone(&self.shared), priority, task, tx);

        {
            let mut queue = self.shared.queue.lock();
            // Re-checked under the lock: workers only exit once they observe
            // shutdown with an empty queue.
            if self.shared.shutdown.load(Ordering::Acquire) {
                return Err(ExecutorError::Shutdown);
            }
            if let Err(e) = queue.enqueue(PriorityTask::new(priority, self.clock.now(), job)) {
                warn!(executor = %self.name, "executor queue is full");
                return Err(e);
            }
        }

        self.shared.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
        self.shared.counters.queued_tasks.fetch_add(1, Ordering::Relaxed);
        self.shared.work_available.notify_one();
        debug!(executor = %self.name, ?priority, "task submitted");
        Ok(TaskHandle { rx })
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        self.shared.counters.snapshot(self.config.worker_count)
    }

    /// True once shutdown has begun.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Stop accepting work, let queued and running tasks finish, and wait up
    /// to `timeout` for the workers to exit. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// [`ExecutorError::Timeout`] if workers are still busy at the deadline;
    /// they are detached and finish in the background.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), ExecutorError> {
        self.signal_shutdown();

        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return Ok(());
        }
        info!(executor = %self.name, workers = workers.len(), "shutting down executor");

        let deadline = Instant::now() + timeout;
        let (done_tx, done_rx) = crossbeam_channel::bounded(workers.len());
        let expected = workers.len();
        for (idx, worker) in workers.into_iter().enumerate() {
            let done_tx = done_tx.clone();
            // Joiner threads let us bound the wait; a stuck worker only leaks its joiner.
            let spawned = thread::Builder::new()
                .name(format!("{}-join-{idx}", self.name))
                .spawn(move || {
                    let _ = done_tx.send((idx, worker.join().is_ok()));
                });
            if let Err(e) = spawned {
                warn!(executor = %self.name, worker_id = idx, error = %e, "could not spawn joiner");
                return Err(ExecutorError::Spawn(e.to_string()));
            }
        }
        drop(done_tx);

        for _ in 0..expected {
            match done_rx.recv_deadline(deadline) {
                Ok((idx, true)) => debug!(executor = %self.name, worker_id = idx, "worker joined"),
                Ok((idx, false)) => warn!(executor = %self.name, worker_id = idx, "worker panicked"),
                Err(_) => {
                    warn!(executor = %self.name, "workers did not drain before the shutdown timeout");
                    return Err(ExecutorError::Timeout);
                }
            }
        }

        info!(executor = %self.name, "executor shut down");
        Ok(())
    }

    fn signal_shutdown(&self) {
        {
            // Flip under the queue lock so a worker between its empty check and
            // its wait cannot miss the wakeup.
            let _queue = self.shared.queue.lock();
            self.shared.shutdown.store(true, Ordering::Release);
        }
        self.shared.work_available.notify_all();
    }
}

impl Drop for PriorityTaskExecutor {
    fn drop(&mut self) {
        // Workers drain and exit on their own; joining here could hang the dropper.
        if !self.shared.shutdown.load(Ordering::Acquire) {
            self.signal_shutdown();
            debug!(executor = %self.name, "executor dropped without explicit shutdown");
        }
    }
}

/// Wrap `task` so counters are settled before its handle resolves. The task
/// is spawned on the worker's runtime, so a panic surfaces as a `JoinError`
/// instead of unwinding through the worker.
fn track_job<F, T>(shared: Arc<Shared>, priority: TaskPriority, task: F, tx: oneshot::Sender<T>) -> Job
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    Box::pin(async move {
        let counters = &shared.counters;
        counters.active_tasks.fetch_add(1, Ordering::Relaxed);
        let outcome = tokio::spawn(task).await;
        counters.active_tasks.fetch_sub(1, Ordering::Relaxed);

        match outcome {
            Ok(output) => {
                counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
                // The caller may have dropped its handle.
                let _ = tx.send(output);
            }
            Err(e) => {
                counters.panicked_tasks.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, ?priority, "task did not complete");
                // Dropping `tx` resolves the handle with `TaskPanicked`.
            }
        }
    })
}

fn spawn_worker(
    name: &str,
    worker_id: usize,
    shared: Arc<Shared>,
    stack_size: usize,
) -> Result<JoinHandle<()>, ExecutorError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ExecutorError::Spawn(format!("worker runtime: {e}")))?;

    thread::Builder::new()
        .name(format!("{name}-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || worker_loop(worker_id, &shared, &runtime))
        .map_err(|e| ExecutorError::Spawn(e.to_string()))
}

fn worker_loop(worker_id: usize, shared: &Shared, runtime: &tokio::runtime::Runtime) {
    debug!(worker_id, "worker started");
    loop {
        let next = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(task) = queue.dequeue() {
                    break Some(task);
                }
                if shared.shutdown.load(Ordering::Acquire) {
                    break None;
                }
                shared.work_available.wait(&mut queue);
            }
        };
        let Some(task) = next else {
            break;
        };

        shared.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
        let PriorityTask { priority, work, .. } = task;
        debug!(worker_id, ?priority, "running task");
        runtime.block_on(work);
    }
    debug!(worker_id, "worker exiting");
}
