//! Core delivery abstractions: executor, scheduler, backpressure and backoff.

pub mod audit;
pub mod backoff;
pub mod backpressure;
pub mod collaborators;
mod delivery;
pub mod error;
pub mod priority_executor;
pub mod scheduler;
pub mod spawn;

pub use audit::{AuditSink, DeliveryAction, DeliveryEvent, InMemoryAuditSink};
pub use backoff::Backoff;
pub use backpressure::EndpointBackpressureTracker;
pub use collaborators::{Collaborators, PayloadStorage, RequestExecution};
pub use error::{AppResult, DeliveryError, ExecutorError, StorageError};
pub use priority_executor::{ExecutorStats, PriorityTaskExecutor, TaskHandle};
pub use scheduler::{DeliveryScheduler, DeliveryStats, LoopState};
pub use spawn::Spawn;
