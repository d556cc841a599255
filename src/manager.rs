//! Generic publication workflow shared by every knowledge library.
//!
//! A [`LibraryManager`] wraps a [`VersionStore`] and enforces the publish
//! workflow identically for every domain: status check, sequential numbering,
//! save, activation. The only domain-specific behavior is supplied through
//! the two hooks on [`KnowledgeDomain`].

use serde::{Deserialize, Serialize};

use crate::error::PublishError;
use crate::store::{Snapshot, StoreResult, VersionStore};

/// Review status of a draft under assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DraftStatus {
    /// Being assembled; publishable.
    Draft,
    /// Submitted for steward review; publishable.
    Review,
    /// Rejected by review; can never be published.
    Rejected,
}

impl std::fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Review => write!(f, "review"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// An entry added to a draft, with a human-readable note of where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedEntry {
    pub entry_id: String,
    pub description: String,
}

/// A field-level change to an existing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryChange {
    pub entry_id: String,
    /// Which field changed (e.g. `"confidence"`).
    pub field: String,
    pub previous: String,
    pub current: String,
}

/// Diff bookkeeping carried by every draft and frozen into its version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftDiff {
    pub added: Vec<AddedEntry>,
    pub removed: Vec<String>,
    pub changed: Vec<EntryChange>,
}

/// The (Entry, Draft, Version) type triple of one knowledge domain, plus the
/// two hooks the shared workflow calls into.
pub trait KnowledgeDomain {
    /// One atomic knowledge item.
    type Entry;
    /// Mutable, never-persisted bundle of entries under assembly.
    type Draft;
    /// Immutable published snapshot.
    type Version: Snapshot;

    /// Domain name used in version ids and log events.
    const NAME: &'static str;

    /// Extract the draft's review status.
    fn draft_status(draft: &Self::Draft) -> DraftStatus;

    /// Freeze a draft into an immutable version with the assigned number.
    fn seal(draft: &Self::Draft, number: u32, published_by: &str) -> Self::Version;
}

/// Publish workflow over one knowledge domain's store.
///
/// Version numbers are strictly increasing with no gaps: the counter starts
/// above the store's highest existing number (1 on an empty store) and only
/// advances after a successful publish — a rejected draft consumes nothing.
#[derive(Debug)]
pub struct LibraryManager<D: KnowledgeDomain, S: VersionStore<D::Version>> {
    store: S,
    next_number: u32,
    _domain: std::marker::PhantomData<D>,
}

impl<D: KnowledgeDomain, S: VersionStore<D::Version>> LibraryManager<D, S> {
    /// Wrap a store, resuming numbering after whatever it already holds.
    pub fn new(store: S) -> StoreResult<Self> {
        let head = store
            .list()?
            .iter()
            .map(|v| v.number())
            .max()
            .unwrap_or(0);
        Ok(Self {
            store,
            next_number: head + 1,
            _domain: std::marker::PhantomData,
        })
    }

    /// The currently active version, if any has been published.
    pub fn active_version(&self) -> StoreResult<Option<D::Version>> {
        self.store.get_active()
    }

    /// A version by id. `Ok(None)` for ids never published.
    pub fn version(&self, id: &str) -> StoreResult<Option<D::Version>> {
        self.store.get(id)
    }

    /// Every published version.
    pub fn versions(&self) -> StoreResult<Vec<D::Version>> {
        self.store.list()
    }

    /// Publish a draft: seal it under the next sequence number, save it, and
    /// make it active.
    ///
    /// A rejected draft fails with [`PublishError::RejectedDraft`] before any
    /// state is touched; the store is only mutated once the status check has
    /// passed, so a failed publish leaves nothing to recover.
    pub fn publish(
        &mut self,
        draft: &D::Draft,
        published_by: &str,
    ) -> Result<D::Version, PublishError> {
        if D::draft_status(draft) == DraftStatus::Rejected {
            return Err(PublishError::RejectedDraft { domain: D::NAME });
        }

        let version = D::seal(draft, self.next_number, published_by);
        let id = version.id().to_string();
        self.store.save(version.clone())?;
        self.store.set_active(&id)?;
        self.next_number += 1;

        tracing::info!(
            domain = D::NAME,
            version = %id,
            number = version.number(),
            published_by,
            "published knowledge version"
        );
        Ok(version)
    }
}
