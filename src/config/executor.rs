//! Priority executor configuration.

use serde::{Deserialize, Serialize};

/// Smallest stack a worker thread may be given.
pub const MIN_STACK_SIZE: usize = 64 * 1024;

/// Configuration for a [`PriorityTaskExecutor`](crate::core::PriorityTaskExecutor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Number of dedicated worker threads.
    pub worker_count: usize,
    /// Maximum queued tasks before submissions are rejected.
    pub max_queue_depth: usize,
    /// Stack size for each worker thread in bytes.
    pub thread_stack_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_count: 1,
            max_queue_depth: 1_024,
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl ExecutorConfig {
    /// Defaults: one worker, 1024 queued tasks, 2 MiB stacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One worker per logical CPU.
    #[must_use]
    pub fn per_cpu() -> Self {
        Self::default().with_worker_count(num_cpus::get())
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the queue depth.
    #[must_use]
    pub const fn with_max_queue_depth(mut self, max_queue_depth: usize) -> Self {
        self.max_queue_depth = max_queue_depth;
        self
    }

    /// Set the worker stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, thread_stack_size: usize) -> Self {
        self.thread_stack_size = thread_stack_size;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        let ceiling = num_cpus::get().max(1) * 16;
        if self.worker_count > ceiling {
            return Err(format!("worker_count must be at most {ceiling}"));
        }
        if self.max_queue_depth == 0 {
            return Err("max_queue_depth must be greater than 0".into());
        }
        if self.thread_stack_size < MIN_STACK_SIZE {
            return Err(format!("thread_stack_size must be at least {MIN_STACK_SIZE}"));
        }
        Ok(())
    }
}
