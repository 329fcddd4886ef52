//! In-memory store for tests and ephemeral sessions.

use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::store::OfflineStore;
use backlot_protocol::{EntityKind, HttpMethod, PendingEntity, QueuedMutation};

/// An in-memory [`OfflineStore`].
///
/// Snapshots live in a map keyed by `(kind, id)`; the queue is a plain
/// vector so insertion order is replay order. Suitable for unit tests,
/// integration tests, and sessions that do not need to survive a restart.
///
/// # Thread Safety
///
/// All operations take `&self`; the store can be shared across tasks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: RwLock<BTreeMap<(EntityKind, String), PendingEntity>>,
    queue: RwLock<Vec<QueuedMutation>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of queued mutations.
    ///
    /// Useful for tests and status displays.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.read().len()
    }
}

impl OfflineStore for MemoryStore {
    fn put_pending(
        &self,
        kind: EntityKind,
        id: &str,
        payload: Value,
        timestamp: i64,
    ) -> StoreResult<()> {
        let entity = PendingEntity::new(kind, id, payload, timestamp);
        self.entities.write().insert((kind, id.to_string()), entity);
        Ok(())
    }

    fn get_pending(&self, kind: EntityKind, id: &str) -> StoreResult<Option<PendingEntity>> {
        Ok(self.entities.read().get(&(kind, id.to_string())).cloned())
    }

    fn enqueue_mutation(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<Value>,
    ) -> StoreResult<Uuid> {
        let mutation = QueuedMutation::new(method, url, body, Utc::now().timestamp_millis());
        let id = mutation.id;
        self.queue.write().push(mutation);
        Ok(id)
    }

    fn list_unsynced(&self) -> StoreResult<Vec<PendingEntity>> {
        Ok(self
            .entities
            .read()
            .values()
            .filter(|entity| !entity.synced)
            .cloned()
            .collect())
    }

    fn list_queue(&self) -> StoreResult<Vec<QueuedMutation>> {
        Ok(self.queue.read().clone())
    }

    fn mark_synced(&self, kind: EntityKind, id: &str) -> StoreResult<()> {
        if let Some(entity) = self.entities.write().get_mut(&(kind, id.to_string())) {
            entity.synced = true;
        }
        Ok(())
    }

    fn remove_from_queue(&self, id: Uuid) -> StoreResult<()> {
        self.queue.write().retain(|mutation| mutation.id != id);
        Ok(())
    }

    fn increment_retries(&self, id: Uuid) -> StoreResult<()> {
        if let Some(mutation) = self.queue.write().iter_mut().find(|m| m.id == id) {
            mutation.retries += 1;
        }
        Ok(())
    }
}
