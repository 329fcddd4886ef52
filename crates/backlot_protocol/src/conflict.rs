//! Field-level conflict detection and resolution.
//!
//! A conflict set is ephemeral: it is built when a sync attempt finds the
//! local and remote snapshots diverging, handed to the caller for per-field
//! choices, and discarded once a resolution is applied or abandoned. The
//! resolved payload goes back to the local store as a fresh unsynced
//! snapshot, so it re-syncs like any other local edit.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// Result type for conflict resolution.
pub type ConflictResult<T> = Result<T, ConflictError>;

/// Errors raised while applying a conflict resolution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConflictError {
    /// A field was marked for merge but no merged value was supplied.
    #[error("field `{0}` is marked for merge but no merged value was supplied")]
    MissingMerge(String),

    /// The local snapshot is not a JSON object.
    #[error("local snapshot is not a JSON object")]
    NotAnObject,
}

/// A single attribute on which the local and remote snapshots disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictField {
    /// Attribute name.
    pub field: String,
    /// Value held locally.
    pub local: Value,
    /// Value held remotely.
    pub remote: Value,
    /// Last local edit, UTC epoch milliseconds, when known.
    pub local_updated_at: Option<i64>,
    /// Last remote edit, UTC epoch milliseconds, when known.
    pub remote_updated_at: Option<i64>,
}

impl ConflictField {
    /// Creates a conflict field without edit timestamps.
    pub fn new(field: impl Into<String>, local: Value, remote: Value) -> Self {
        Self {
            field: field.into(),
            local,
            remote,
            local_updated_at: None,
            remote_updated_at: None,
        }
    }

    /// Attaches the edit timestamps used by [`ConflictStrategy::Newest`].
    pub fn with_timestamps(mut self, local: Option<i64>, remote: Option<i64>) -> Self {
        self.local_updated_at = local;
        self.remote_updated_at = remote;
        self
    }
}

/// Diffs two JSON object snapshots field by field.
///
/// A field is in conflict iff the two values differ under deep equality.
/// A key present on only one side compares against `null`. Non-object
/// snapshots produce no fields; callers diff those wholesale. Edit
/// timestamps are attached by the caller via
/// [`ConflictField::with_timestamps`].
pub fn fields_in_conflict(local: &Value, remote: &Value) -> Vec<ConflictField> {
    let (Some(local_map), Some(remote_map)) = (local.as_object(), remote.as_object()) else {
        return Vec::new();
    };

    let mut keys: Vec<&String> = local_map.keys().collect();
    keys.extend(remote_map.keys().filter(|key| !local_map.contains_key(*key)));

    keys.into_iter()
        .filter_map(|key| {
            let local_value = local_map.get(key).cloned().unwrap_or(Value::Null);
            let remote_value = remote_map.get(key).cloned().unwrap_or(Value::Null);
            if local_value == remote_value {
                None
            } else {
                Some(ConflictField::new(key.clone(), local_value, remote_value))
            }
        })
        .collect()
}

/// The caller's resolution for one conflicting field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionChoice {
    /// Keep the local value.
    Local,
    /// Accept the remote value.
    Remote,
    /// Use a caller-supplied merged value.
    Merge,
}

/// Strategy used to seed per-field choices before the caller confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictStrategy {
    /// Every field resolves to the local value.
    Local,
    /// Every field resolves to the remote value.
    Remote,
    /// Per field, the side with the strictly newer edit timestamp wins.
    Newest,
    /// Explicit user choice per field, seeded with local values.
    #[default]
    Manual,
}

impl ConflictStrategy {
    /// Seeds a choice for every conflicting field.
    ///
    /// `Newest` picks local only when its edit timestamp is strictly
    /// greater than the remote one; equal or missing timestamps fall back
    /// to remote. `Manual` seeds local as the working selection pending
    /// explicit user input.
    pub fn initial_choices(&self, fields: &[ConflictField]) -> BTreeMap<String, ResolutionChoice> {
        fields
            .iter()
            .map(|field| {
                let choice = match self {
                    ConflictStrategy::Local | ConflictStrategy::Manual => ResolutionChoice::Local,
                    ConflictStrategy::Remote => ResolutionChoice::Remote,
                    ConflictStrategy::Newest => {
                        match (field.local_updated_at, field.remote_updated_at) {
                            (Some(local), Some(remote)) if local > remote => {
                                ResolutionChoice::Local
                            }
                            _ => ResolutionChoice::Remote,
                        }
                    }
                };
                (field.field.clone(), choice)
            })
            .collect()
    }
}

/// Starting value offered when a field's choice is switched to merge.
///
/// Two arrays seed with their deduplicated union, local elements first;
/// everything else (including two strings, which the user is expected to
/// hand-edit) seeds with the local value verbatim.
pub fn merge_seed(field: &ConflictField) -> Value {
    match (&field.local, &field.remote) {
        (Value::Array(local), Value::Array(remote)) => {
            let mut union: Vec<Value> = Vec::with_capacity(local.len() + remote.len());
            for item in local.iter().chain(remote.iter()) {
                if !union.contains(item) {
                    union.push(item.clone());
                }
            }
            Value::Array(union)
        }
        _ => field.local.clone(),
    }
}

/// Applies per-field choices to the local snapshot and returns the
/// resolved payload.
///
/// Fields without an entry in `choices` retain the local value; a field
/// is never silently dropped. A field marked [`ResolutionChoice::Merge`]
/// must have a value in `merged`; otherwise the whole resolution is
/// rejected and nothing is applied.
pub fn resolve(
    local: &Value,
    fields: &[ConflictField],
    choices: &BTreeMap<String, ResolutionChoice>,
    merged: &BTreeMap<String, Value>,
) -> ConflictResult<Value> {
    let mut output = local
        .as_object()
        .cloned()
        .ok_or(ConflictError::NotAnObject)?;

    // Validate all merge choices before touching the output.
    for field in fields {
        if matches!(choices.get(&field.field), Some(ResolutionChoice::Merge))
            && !merged.contains_key(&field.field)
        {
            return Err(ConflictError::MissingMerge(field.field.clone()));
        }
    }

    for field in fields {
        let value = match choices.get(&field.field) {
            // The output starts as the local snapshot, so keeping local is
            // a no-op; this also leaves keys the snapshot never had absent
            // rather than inserting explicit nulls.
            None | Some(ResolutionChoice::Local) => continue,
            Some(ResolutionChoice::Remote) => field.remote.clone(),
            Some(ResolutionChoice::Merge) => match merged.get(&field.field) {
                Some(value) => value.clone(),
                None => return Err(ConflictError::MissingMerge(field.field.clone())),
            },
        };
        output.insert(field.field.clone(), value);
    }

    Ok(Value::Object(output))
}
