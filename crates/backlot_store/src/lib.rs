//! # Backlot Store
//!
//! Local persistence for Backlot's offline core.
//!
//! This crate provides:
//! - [`OfflineStore`], the trait the sync engine and autosave write through
//! - [`MemoryStore`] for tests and ephemeral sessions
//! - [`JsonFileStore`] for desktop persistence
//!
//! ## Key Invariants
//!
//! - At most one pending snapshot per `(kind, id)`; upserts replace
//! - The mutation queue preserves insertion order; insertion order is
//!   replay order
//! - Row operations are idempotent, so overlapping sync passes are safe

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StoreError, StoreResult};
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use store::OfflineStore;
