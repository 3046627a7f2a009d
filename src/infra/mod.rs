//! Infrastructure adapters for the executor queue and payload storage.

pub mod queue;
pub mod storage;
pub use queue::InMemoryQueue;
pub use storage::InMemoryPayloadStorage;
