//! File-backed store for persistent desktop sessions.

use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::store::OfflineStore;
use backlot_protocol::{EntityKind, HttpMethod, PendingEntity, QueuedMutation};

/// On-disk document holding both logical tables.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    entities: Vec<PendingEntity>,
    queue: Vec<QueuedMutation>,
}

impl Document {
    fn entity_index(&self, kind: EntityKind, id: &str) -> Option<usize> {
        self.entities
            .iter()
            .position(|entity| entity.kind == kind && entity.id == id)
    }
}

/// A file-backed [`OfflineStore`].
///
/// Both tables are held in memory and rewritten to a single JSON document
/// after every mutation, then reloaded on open. Data volumes here are a
/// handful of snapshots and queued writes per session, so a full rewrite
/// per mutation is fine.
///
/// # Durability
///
/// Writes go through `std::fs::write`; a crash between the in-memory
/// update and the rewrite loses at most that one mutation.
///
/// # Example
///
/// ```no_run
/// use backlot_store::{JsonFileStore, OfflineStore};
/// use backlot_protocol::EntityKind;
/// use serde_json::json;
///
/// let store = JsonFileStore::open("offline.json").unwrap();
/// store
///     .put_pending(EntityKind::Scene, "s1", json!({"title": "Opening"}), 0)
///     .unwrap();
/// ```
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    document: RwLock<Document>,
}

impl JsonFileStore {
    /// Opens the store, loading any previously persisted document.
    ///
    /// A missing file opens an empty store; a file that exists but cannot
    /// be read or parsed is an error.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let document = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            Document::default()
        };

        Ok(Self {
            path,
            document: RwLock::new(document),
        })
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, document: &Document) -> StoreResult<()> {
        std::fs::write(&self.path, serde_json::to_string_pretty(document)?)?;
        Ok(())
    }
}

impl OfflineStore for JsonFileStore {
    fn put_pending(
        &self,
        kind: EntityKind,
        id: &str,
        payload: Value,
        timestamp: i64,
    ) -> StoreResult<()> {
        let mut document = self.document.write();
        let entity = PendingEntity::new(kind, id, payload, timestamp);
        match document.entity_index(kind, id) {
            Some(index) => document.entities[index] = entity,
            None => document.entities.push(entity),
        }
        self.persist(&document)
    }

    fn get_pending(&self, kind: EntityKind, id: &str) -> StoreResult<Option<PendingEntity>> {
        let document = self.document.read();
        Ok(document
            .entity_index(kind, id)
            .map(|index| document.entities[index].clone()))
    }

    fn enqueue_mutation(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<Value>,
    ) -> StoreResult<Uuid> {
        let mut document = self.document.write();
        let mutation = QueuedMutation::new(method, url, body, Utc::now().timestamp_millis());
        let id = mutation.id;
        document.queue.push(mutation);
        self.persist(&document)?;
        Ok(id)
    }

    fn list_unsynced(&self) -> StoreResult<Vec<PendingEntity>> {
        Ok(self
            .document
            .read()
            .entities
            .iter()
            .filter(|entity| !entity.synced)
            .cloned()
            .collect())
    }

    fn list_queue(&self) -> StoreResult<Vec<QueuedMutation>> {
        Ok(self.document.read().queue.clone())
    }

    fn mark_synced(&self, kind: EntityKind, id: &str) -> StoreResult<()> {
        let mut document = self.document.write();
        match document.entity_index(kind, id) {
            Some(index) => {
                document.entities[index].synced = true;
                self.persist(&document)
            }
            None => Ok(()),
        }
    }

    fn remove_from_queue(&self, id: Uuid) -> StoreResult<()> {
        let mut document = self.document.write();
        let before = document.queue.len();
        document.queue.retain(|mutation| mutation.id != id);
        if document.queue.len() == before {
            return Ok(());
        }
        self.persist(&document)
    }

    fn increment_retries(&self, id: Uuid) -> StoreResult<()> {
        let mut document = self.document.write();
        match document.queue.iter_mut().find(|m| m.id == id) {
            Some(mutation) => {
                mutation.retries += 1;
                self.persist(&document)
            }
            None => Ok(()),
        }
    }
}
