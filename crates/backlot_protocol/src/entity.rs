//! Entity kinds and locally pending snapshots.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of domain entity tracked by the offline core.
///
/// The set is closed: [`EntityKind::resource_path`] is a total function,
/// so a push for an unrepresentable kind cannot be constructed in the
/// first place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A production project.
    Project,
    /// A scene within a project.
    Scene,
    /// A comment on a project or scene.
    Comment,
}

impl EntityKind {
    /// Returns the REST collection segment for this kind.
    pub fn resource_path(&self) -> &'static str {
        match self {
            EntityKind::Project => "projects",
            EntityKind::Scene => "scenes",
            EntityKind::Comment => "comments",
        }
    }

    /// Returns the stable lowercase name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Scene => "scene",
            EntityKind::Comment => "comment",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point-in-time snapshot of a domain entity awaiting upload.
///
/// Snapshots are keyed by `(kind, id)`; writing a second snapshot for the
/// same key replaces the first (upsert, newest wins). The payload schema
/// is owned by the entity kind, not by this core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEntity {
    /// Stable entity identifier, unique per `(kind, id)`.
    pub id: String,
    /// Kind of the snapshotted entity.
    pub kind: EntityKind,
    /// Opaque domain snapshot.
    pub payload: Value,
    /// Capture time, UTC epoch milliseconds.
    pub timestamp: i64,
    /// `false` until a sync pass confirms the snapshot was persisted remotely.
    pub synced: bool,
}

impl PendingEntity {
    /// Creates an unsynced snapshot.
    pub fn new(kind: EntityKind, id: impl Into<String>, payload: Value, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            kind,
            payload,
            timestamp,
            synced: false,
        }
    }
}
