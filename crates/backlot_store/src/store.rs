//! Offline store trait definition.

use crate::error::StoreResult;
use backlot_protocol::{EntityKind, HttpMethod, PendingEntity, QueuedMutation};
use serde_json::Value;
use uuid::Uuid;

/// The local store backing the offline core.
///
/// Two logical tables live behind this trait: pending entity snapshots and
/// the mutation queue. Implementations take `&self` so a single store can
/// be shared between the sync engine, the autosave scheduler, and the UI.
///
/// # Invariants
///
/// - `put_pending` upserts: at most one row per `(kind, id)`, newest wins
/// - `list_queue` returns rows in insertion order (the replay order)
/// - `mark_synced`, `remove_from_queue`, and `increment_retries` are
///   idempotent and tolerate missing rows, so overlapping sync passes may
///   double-process a row without error
///
/// Storage-layer failures propagate; there is no other error path.
///
/// # Implementors
///
/// - [`crate::MemoryStore`] - for tests and ephemeral sessions
/// - [`crate::JsonFileStore`] - for persistent desktop sessions
pub trait OfflineStore: Send + Sync {
    /// Upserts a snapshot for `(kind, id)` with `synced = false`.
    fn put_pending(
        &self,
        kind: EntityKind,
        id: &str,
        payload: Value,
        timestamp: i64,
    ) -> StoreResult<()>;

    /// Looks up the snapshot for `(kind, id)`, if any.
    fn get_pending(&self, kind: EntityKind, id: &str) -> StoreResult<Option<PendingEntity>>;

    /// Records a write for later replay and returns its generated id.
    ///
    /// The row is stamped with the current time and zero retries.
    fn enqueue_mutation(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<Value>,
    ) -> StoreResult<Uuid>;

    /// Returns every snapshot with `synced = false`, in no particular order.
    fn list_unsynced(&self) -> StoreResult<Vec<PendingEntity>>;

    /// Returns the full mutation queue in insertion order.
    fn list_queue(&self) -> StoreResult<Vec<QueuedMutation>>;

    /// Flags the snapshot for `(kind, id)` as persisted remotely.
    ///
    /// No-op if the row is missing or already synced.
    fn mark_synced(&self, kind: EntityKind, id: &str) -> StoreResult<()>;

    /// Deletes a queue row. No-op if the row is missing.
    fn remove_from_queue(&self, id: Uuid) -> StoreResult<()>;

    /// Bumps a queue row's retry counter. No-op if the row is missing
    /// (losing a race with a concurrent removal is fine).
    fn increment_retries(&self, id: Uuid) -> StoreResult<()>;
}
