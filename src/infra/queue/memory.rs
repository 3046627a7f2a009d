//! In-memory aging priority queue.
//!
//! Tasks are ranked by `submitted_at_ms + priority.delay_threshold_ms()` and the
//! lowest score is dequeued first. Scores never change after submission, so a
//! plain min-heap stays valid without re-sorting.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::core::ExecutorError;
use crate::util::serde::TaskPriority;

/// Unit of work waiting in the queue.
#[derive(Debug)]
pub struct PriorityTask<T> {
    /// Priority tier chosen by the submitter.
    pub priority: TaskPriority,
    /// Submission time in milliseconds.
    pub submitted_at_ms: u64,
    /// The work itself.
    pub work: T,
}

impl<T> PriorityTask<T> {
    /// Create a task.
    pub const fn new(priority: TaskPriority, submitted_at_ms: u64, work: T) -> Self {
        Self {
            priority,
            submitted_at_ms,
            work,
        }
    }

    /// Effective score; lower runs first.
    #[must_use]
    pub const fn score(&self) -> u64 {
        self.submitted_at_ms
            .saturating_add(self.priority.delay_threshold_ms())
    }
}

// Ordering looks at the score only. Equal scores compare equal, and the heap
// gives no guarantee about which of them pops first.
impl<T> PartialEq for PriorityTask<T> {
    fn eq(&self, other: &Self) -> bool {
        self.score() == other.score()
    }
}

impl<T> Eq for PriorityTask<T> {}

impl<T> PartialOrd for PriorityTask<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for PriorityTask<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap and we want the lowest score.
        other.score().cmp(&self.score())
    }
}

/// Bounded min-score heap.
pub struct InMemoryQueue<T> {
    max_depth: usize,
    tasks: BinaryHeap<PriorityTask<T>>,
}

impl<T> InMemoryQueue<T> {
    /// Create a queue holding at most `max_depth` tasks.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            tasks: BinaryHeap::with_capacity(max_depth.min(1024)),
        }
    }

    /// Add a task, failing fast when the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::QueueFull`] at `max_depth`.
    pub fn enqueue(&mut self, task: PriorityTask<T>) -> Result<(), ExecutorError> {
        if self.tasks.len() >= self.max_depth {
            return Err(ExecutorError::QueueFull(format!(
                "max queue depth {} reached",
                self.max_depth
            )));
        }
        self.tasks.push(task);
        Ok(())
    }

    /// Remove the lowest-score task.
    pub fn dequeue(&mut self) -> Option<PriorityTask<T>> {
        self.tasks.pop()
    }

    /// Score of the task that would be dequeued next.
    #[must_use]
    pub fn peek_score(&self) -> Option<u64> {
        self.tasks.peek().map(PriorityTask::score)
    }

    /// Maximum depth.
    #[must_use]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Current depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
