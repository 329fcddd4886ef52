//! # Backlot Sync
//!
//! Sync engine and autosave scheduler for Backlot's offline core.
//!
//! This crate provides:
//! - [`SyncEngine`]: drains the mutation queue and pushes unsynced snapshots
//! - [`SyncService`]: caller-owned background runner with interval,
//!   connectivity, and visibility triggers
//! - [`Autosave`]: debounced save scheduling with a periodic fallback flush
//! - [`HttpClient`]: the transport seam, with reqwest and mock
//!   implementations
//!
//! ## Architecture
//!
//! Edits flow from the UI into the [`Autosave`] scheduler, which debounces
//! them into local snapshots; the [`SyncEngine`] later replays queued
//! writes and uploads unsynced snapshots whenever connectivity, the
//! periodic timer, or the caller asks for a pass. Diverging snapshots are
//! resolved field by field with `backlot_protocol`'s conflict model, and
//! the resolved payload re-enters the store as a fresh unsynced snapshot.
//!
//! ## Key Invariants
//!
//! - A sync pass is skipped entirely while offline
//! - Queue rows replay in insertion order; one row's failure never stops
//!   the rest of the pass
//! - A row is removed on success or once its retries are exhausted
//! - Store mutations are idempotent, so overlapping passes are safe
//! - At most one autosave effect is in flight at a time

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod autosave;
mod config;
mod engine;
mod error;
mod http;
mod service;

pub use autosave::{Autosave, HttpSaveTarget, SaveError, SaveTarget, SnapshotSaveTarget};
pub use config::{AutosaveConfig, BearerToken, SyncConfig};
pub use engine::{SyncEngine, SyncReport, SyncStats, SyncStatus};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpRequest, HttpResponse, MockClient, ReqwestClient};
pub use service::SyncService;
