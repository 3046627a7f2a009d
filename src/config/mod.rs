//! Configuration models for the delivery scheduler and its executors.

pub mod delivery;
pub mod executor;

pub use delivery::DeliveryConfig;
pub use executor::ExecutorConfig;
