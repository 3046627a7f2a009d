//! Builders to construct a delivery scheduler from configuration.

use std::sync::Arc;

use anyhow::Context;

use crate::config::DeliveryConfig;
use crate::core::{
    AppResult, AuditSink, Collaborators, DeliveryError, DeliveryScheduler, PayloadStorage,
    RequestExecution, Spawn,
};
use crate::runtime::TokioSpawner;
use crate::util::clock::{Clock, MonotonicClock};

/// Build a scheduler from configuration, collaborators and a scheduling
/// context. The scheduler validates the configuration itself.
///
/// # Errors
///
/// Returns [`DeliveryError::InvalidConfig`] if validation fails, or the
/// executor error if the delivery threads cannot start.
pub fn build_scheduler<S: Spawn>(
    cfg: &DeliveryConfig,
    collaborators: Collaborators,
    spawner: S,
) -> Result<DeliveryScheduler<S>, DeliveryError> {
    DeliveryScheduler::new(cfg.clone(), collaborators, spawner)
}

/// Application-level wiring: configuration from the environment, a
/// monotonic clock and the current tokio runtime as the scheduling context.
///
/// # Errors
///
/// Fails if the environment holds an invalid configuration, no tokio
/// runtime is active, or the scheduler cannot start.
pub fn build_from_env(
    storage: Arc<dyn PayloadStorage>,
    execution: Arc<dyn RequestExecution>,
    audit: Option<Arc<dyn AuditSink>>,
) -> AppResult<DeliveryScheduler<TokioSpawner>> {
    let cfg = DeliveryConfig::from_env()
        .map_err(anyhow::Error::msg)
        .context("loading delivery configuration")?;
    let spawner = TokioSpawner::try_current().context("no tokio runtime to schedule on")?;

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let mut collaborators = Collaborators::new(storage, execution, clock);
    if let Some(audit) = audit {
        collaborators = collaborators.with_audit(audit);
    }

    build_scheduler(&cfg, collaborators, spawner).context("starting delivery scheduler")
}
