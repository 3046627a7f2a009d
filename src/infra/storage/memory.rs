//! In-memory payload storage backend.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{PayloadStorage, StorageError};
use crate::util::serde::PayloadMetadata;

struct StoredPayload {
    meta: PayloadMetadata,
    // `None` once the body was removed behind the index's back.
    body: Option<Vec<u8>>,
}

/// Simple in-memory payload store for development/testing.
///
/// Keeps insertion order. `ready_payloads` lists complete payloads, sessions
/// first and otherwise oldest first.
#[derive(Default)]
pub struct InMemoryPayloadStorage {
    payloads: Mutex<Vec<StoredPayload>>,
    fail_deletes: AtomicBool,
}

impl InMemoryPayloadStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload, replacing any previous body with the same metadata.
    pub fn store(&self, meta: PayloadMetadata, body: impl Into<Vec<u8>>) {
        let body = Some(body.into());
        let mut payloads = self.payloads.lock();
        if let Some(existing) = payloads.iter_mut().find(|p| p.meta == meta) {
            existing.body = body;
        } else {
            payloads.push(StoredPayload { meta, body });
        }
    }

    /// Drop a payload's body but keep it listed, as when the file vanishes
    /// between listing and loading. Returns false if it was not stored.
    pub fn remove_body(&self, meta: &PayloadMetadata) -> bool {
        self.payloads
            .lock()
            .iter_mut()
            .find(|p| &p.meta == meta)
            .is_some_and(|p| p.body.take().is_some())
    }

    /// Make every `delete` fail until switched off again.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// True if `meta` is still stored.
    #[must_use]
    pub fn contains(&self, meta: &PayloadMetadata) -> bool {
        self.payloads.lock().iter().any(|p| &p.meta == meta)
    }

    /// Number of stored payloads, complete or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payloads.lock().len()
    }

    /// True when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payloads.lock().is_empty()
    }
}

#[async_trait]
impl PayloadStorage for InMemoryPayloadStorage {
    async fn ready_payloads(&self) -> Result<Vec<PayloadMetadata>, StorageError> {
        let mut ready: Vec<PayloadMetadata> = self
            .payloads
            .lock()
            .iter()
            .filter(|p| p.meta.complete)
            .map(|p| p.meta.clone())
            .collect();
        // Stable, so equal keys keep insertion order.
        ready.sort_by(PayloadMetadata::delivery_order);
        Ok(ready)
    }

    async fn load_body(&self, meta: &PayloadMetadata) -> Result<Vec<u8>, StorageError> {
        self.payloads
            .lock()
            .iter()
            .find(|p| &p.meta == meta)
            .and_then(|p| p.body.clone())
            .ok_or_else(|| StorageError::NotFound(meta.to_string()))
    }

    async fn delete(&self, meta: &PayloadMetadata) -> Result<(), StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!("delete of {meta} refused")));
        }
        self.payloads.lock().retain(|p| &p.meta != meta);
        Ok(())
    }
}
