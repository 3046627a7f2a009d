//! Scheduling-context abstraction.

use std::future::Future;

/// Spawns orchestration futures onto a lightweight async context.
///
/// Spawned work must never block on I/O; blocking sends belong on the
/// delivery executor.
pub trait Spawn: Send + Sync + 'static {
    /// Spawn a detached future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
