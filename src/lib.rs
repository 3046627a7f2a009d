//! # Telemetry Delivery
//!
//! Delivery scheduling for an observability agent: takes serialized telemetry
//! payloads (sessions, logs, crash reports) already sitting in durable storage
//! and transmits them to a remote collector under bounded concurrency,
//! server-driven rate limiting, partial failure and priority ordering.
//!
//! ## Core Problem Solved
//!
//! - **Never block the caller**: `on_payload_intake` is an atomic flag flip and
//!   may be called from any thread, any number of times
//! - **One loop at a time**: intakes during a cycle are coalesced; the running
//!   cycle re-queries storage before it finishes
//! - **Backpressure per endpoint**: a 429 blocks only the endpoint that sent it
//! - **No duplicate sends**: an endpoint never has two sends in flight, and a
//!   payload is only deleted after the collector accepted it
//!
//! ## Two Execution Contexts
//!
//! Orchestration runs on a lightweight async context (any [`core::Spawn`],
//! usually [`runtime::TokioSpawner`]). Sends run on a
//! [`core::PriorityTaskExecutor`]: dedicated threads pulling from an aging
//! priority queue where a task's score is
//! `submitted_at + priority.delay_threshold_ms()`, so old low-priority work
//! eventually outranks fresh high-priority work.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use telemetry_delivery::builders::build_scheduler;
//! use telemetry_delivery::config::DeliveryConfig;
//! use telemetry_delivery::core::Collaborators;
//! use telemetry_delivery::infra::InMemoryPayloadStorage;
//! use telemetry_delivery::runtime::TokioSpawner;
//! use telemetry_delivery::util::{EnvelopeKind, PayloadMetadata, SystemClock};
//!
//! let storage = Arc::new(InMemoryPayloadStorage::new());
//! let collaborators = Collaborators::new(storage.clone(), my_http_client, Arc::new(SystemClock));
//! let scheduler = build_scheduler(
//!     &DeliveryConfig::default(),
//!     collaborators,
//!     TokioSpawner::new(tokio::runtime::Handle::current()),
//! )?;
//!
//! storage.store(PayloadMetadata::generate(now, "pid", EnvelopeKind::Session), body);
//! scheduler.on_payload_intake();
//! ```
//!
//! For complete examples, see `tests/scheduler_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core delivery abstractions: executor, scheduler, backpressure and backoff.
pub mod core;
/// Configuration models for the scheduler and its executors.
pub mod config;
/// Builders to construct schedulers from configuration.
pub mod builders;
/// Infrastructure adapters for the executor queue and payload storage.
pub mod infra;
/// Runtime adapters for the scheduling context.
pub mod runtime;
/// Shared utilities.
pub mod util;
