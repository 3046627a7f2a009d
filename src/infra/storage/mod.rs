//! Payload storage backends.

pub mod memory;

pub use memory::InMemoryPayloadStorage;
