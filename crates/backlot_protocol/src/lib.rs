//! # Backlot Protocol
//!
//! Data model for Backlot's offline core.
//!
//! This crate provides:
//! - [`EntityKind`] and [`PendingEntity`] for locally captured snapshots
//! - [`QueuedMutation`] for recorded writes awaiting replay
//! - Field-level conflict detection and resolution
//!
//! This is a pure data-model crate with no I/O.
//!
//! ## Key Invariants
//!
//! - At most one pending snapshot per `(kind, id)`; the newest write wins
//! - A mutation's retry counter never decreases while the row exists
//! - Conflict resolutions apply whole-or-not-at-all

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod entity;
mod mutation;

pub use conflict::{
    fields_in_conflict, merge_seed, resolve, ConflictError, ConflictField, ConflictResult,
    ConflictStrategy, ResolutionChoice,
};
pub use entity::{EntityKind, PendingEntity};
pub use mutation::{HttpMethod, QueuedMutation, MAX_RETRIES};
