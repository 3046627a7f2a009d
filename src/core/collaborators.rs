//! Interfaces the scheduler consumes: payload storage and request execution.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AuditSink, StorageError};
use crate::util::clock::Clock;
use crate::util::serde::{Endpoint, EnvelopeKind, ExecutionOutcome, PayloadMetadata};

/// Durable store of serialized payloads awaiting delivery.
#[async_trait]
pub trait PayloadStorage: Send + Sync + 'static {
    /// Complete payloads, sessions first and otherwise in the store's natural order.
    async fn ready_payloads(&self) -> Result<Vec<PayloadMetadata>, StorageError>;

    /// Load a payload body. Returns [`StorageError::NotFound`] if it vanished.
    async fn load_body(&self, meta: &PayloadMetadata) -> Result<Vec<u8>, StorageError>;

    /// Remove a delivered payload.
    async fn delete(&self, meta: &PayloadMetadata) -> Result<(), StorageError>;
}

/// Performs the network call for one payload and classifies the response.
///
/// Implementations run on the delivery context and may block for the length
/// of a request.
#[async_trait]
pub trait RequestExecution: Send + Sync + 'static {
    /// Send `body` to `endpoint`.
    async fn send(&self, endpoint: Endpoint, body: Vec<u8>, kind: EnvelopeKind) -> ExecutionOutcome;
}

/// Everything the scheduler needs from its host.
#[derive(Clone)]
pub struct Collaborators {
    /// Payload store.
    pub storage: Arc<dyn PayloadStorage>,
    /// Network layer.
    pub execution: Arc<dyn RequestExecution>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Optional audit trail.
    pub audit: Option<Arc<dyn AuditSink>>,
}

impl Collaborators {
    /// Bundle the required collaborators.
    pub fn new(
        storage: Arc<dyn PayloadStorage>,
        execution: Arc<dyn RequestExecution>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            execution,
            clock,
            audit: None,
        }
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }
}
