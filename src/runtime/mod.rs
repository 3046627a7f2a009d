//! Runtime adapters for the scheduling context.

pub mod tokio_spawner;

pub use tokio_spawner::TokioSpawner;
