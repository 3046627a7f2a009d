//! Error types for the executor, storage and scheduler.

use thiserror::Error;

/// Errors produced by the priority task executor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// The queue is at its configured depth.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// The executor no longer accepts work.
    #[error("executor has been shut down")]
    Shutdown,
    /// The task panicked before producing a result.
    #[error("task panicked")]
    TaskPanicked,
    /// Workers did not finish within the shutdown timeout.
    #[error("timed out waiting for workers")]
    Timeout,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Worker thread could not be created.
    #[error("worker spawn failed: {0}")]
    Spawn(String),
}

/// Errors reported by a payload storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The payload is no longer present.
    #[error("payload not found: {0}")]
    NotFound(String),
    /// Underlying I/O failure.
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    /// Backend-specific failure with context.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the delivery scheduler's own API.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The delivery executor failed.
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
