//! Versioned snapshot storage.
//!
//! Two backends serve the same five-method contract:
//!
//! - [`MemoryVersionStore`] — the reference in-memory store (process lifetime)
//! - [`DurableVersionStore`] — ACID persistence via redb, with a
//!   monotonic-write guard for multi-writer deployments
//!
//! A store holds the immutable published snapshots of one knowledge domain
//! and tracks at most one "active" version pointer. Reads hand out clones,
//! never references into the stored copy, so a saved snapshot is deep-equal
//! on every retrieval for the lifetime of the store.

pub mod durable;
pub mod mem;

use crate::error::StoreError;

pub use durable::DurableVersionStore;
pub use mem::MemoryVersionStore;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// An immutable published snapshot, as the store sees it.
///
/// Concrete version types expose their identity and sequence number through
/// this trait; everything else about them is opaque to the store.
pub trait Snapshot: Clone {
    /// Stable identifier, unique within one store.
    fn id(&self) -> &str;

    /// Monotonic sequence number assigned at publish time.
    fn number(&self) -> u32;
}

/// Storage contract for one knowledge domain's published versions.
///
/// Invariant: at most one active version exists at any time, and none exists
/// before the first `set_active`. `save` of an already-saved id replaces the
/// snapshot (the publish workflow never does this; ids embed the unique
/// sequence number).
pub trait VersionStore<V: Snapshot> {
    /// Persist a snapshot.
    fn save(&mut self, version: V) -> StoreResult<()>;

    /// Fetch a snapshot by id. `Ok(None)` for an id never saved.
    fn get(&self, id: &str) -> StoreResult<Option<V>>;

    /// Fetch the currently active snapshot, if any.
    fn get_active(&self) -> StoreResult<Option<V>>;

    /// Point the active marker at a previously saved snapshot.
    ///
    /// Fails with [`StoreError::VersionNotFound`] for an id that was never
    /// saved.
    fn set_active(&mut self, id: &str) -> StoreResult<()>;

    /// All saved snapshots, in a stable, deterministic order.
    fn list(&self) -> StoreResult<Vec<V>>;
}
