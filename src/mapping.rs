//! Mapping library: text patterns mapped to target codes.
//!
//! Each entry pairs a recurring free-text pattern (e.g. a line-item
//! description) with the code downstream computations should classify it
//! under, plus a confidence score in `[0, 1]`. Drafts are rebuilt from the
//! active version and refined through the learning loop's recorded analyst
//! overrides before each publication cycle.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::learning::LearningLoop;
use crate::manager::{AddedEntry, DraftDiff, DraftStatus, EntryChange, KnowledgeDomain, LibraryManager};
use crate::store::{MemoryVersionStore, Snapshot, StoreResult, VersionStore};

/// Generate a URL-safe slug from free text.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// One pattern → code mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Stable identifier derived from pattern and code.
    pub id: String,
    /// The text pattern being classified.
    pub pattern: String,
    /// The code this pattern maps to.
    pub target_code: String,
    /// Classification confidence in `[0, 1]`.
    pub confidence: f64,
}

impl MappingEntry {
    /// Build an entry with its identifier derived from pattern and code.
    pub fn new(pattern: impl Into<String>, target_code: impl Into<String>, confidence: f64) -> Self {
        let pattern = pattern.into();
        let target_code = target_code.into();
        Self {
            id: format!("{}--{}", slugify(&pattern), slugify(&target_code)),
            pattern,
            target_code,
            confidence,
        }
    }
}

/// Mutable mapping draft under assembly. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingDraft {
    pub status: DraftStatus,
    /// The version this draft was built from, if any.
    pub base_version_id: Option<String>,
    pub entries: Vec<MappingEntry>,
    pub diff: DraftDiff,
}

impl MappingDraft {
    /// An empty draft with no parent.
    pub fn empty() -> Self {
        Self {
            status: DraftStatus::Draft,
            base_version_id: None,
            entries: Vec::new(),
            diff: DraftDiff::default(),
        }
    }

    /// Content identity used by the publication idempotency check.
    ///
    /// Confidence participates at full f64 bit precision: a rolling-average
    /// delta as small as one ulp counts as a content change and forces
    /// republication.
    pub fn content_identity(&self) -> BTreeSet<(String, String, String, u64)> {
        entry_identity(&self.entries)
    }
}

fn entry_identity(entries: &[MappingEntry]) -> BTreeSet<(String, String, String, u64)> {
    entries
        .iter()
        .map(|e| {
            (
                e.id.clone(),
                e.pattern.clone(),
                e.target_code.clone(),
                e.confidence.to_bits(),
            )
        })
        .collect()
}

/// Immutable published mapping snapshot.
///
/// Constructed only by the publish workflow; exposes no mutators, so the
/// snapshot downstream computations pin to can never drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingVersion {
    id: String,
    number: u32,
    published_by: String,
    published_at: u64,
    base_version_id: Option<String>,
    entries: Vec<MappingEntry>,
    diff: DraftDiff,
    entry_count: usize,
}

impl MappingVersion {
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn published_by(&self) -> &str {
        &self.published_by
    }

    /// Publication timestamp, seconds since the UNIX epoch.
    pub fn published_at(&self) -> u64 {
        self.published_at
    }

    pub fn base_version_id(&self) -> Option<&str> {
        self.base_version_id.as_deref()
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn diff(&self) -> &DraftDiff {
        &self.diff
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Content identity used by the publication idempotency check.
    pub fn content_identity(&self) -> BTreeSet<(String, String, String, u64)> {
        entry_identity(&self.entries)
    }
}

impl Snapshot for MappingVersion {
    fn id(&self) -> &str {
        &self.id
    }

    fn number(&self) -> u32 {
        self.number
    }
}

/// Domain hooks wiring the mapping types into the generic manager.
#[derive(Debug)]
pub struct MappingDomain;

impl KnowledgeDomain for MappingDomain {
    type Entry = MappingEntry;
    type Draft = MappingDraft;
    type Version = MappingVersion;

    const NAME: &'static str = "mapping";

    fn draft_status(draft: &MappingDraft) -> DraftStatus {
        draft.status
    }

    fn seal(draft: &MappingDraft, number: u32, published_by: &str) -> MappingVersion {
        MappingVersion {
            id: format!("{}-v{number}", Self::NAME),
            number,
            published_by: published_by.to_string(),
            published_at: now_unix(),
            base_version_id: draft.base_version_id.clone(),
            entries: draft.entries.clone(),
            diff: draft.diff.clone(),
            entry_count: draft.entries.len(),
        }
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// The mapping knowledge library: generic publish workflow plus the
/// override-driven draft builder.
#[derive(Debug)]
pub struct MappingLibrary<S: VersionStore<MappingVersion> = MemoryVersionStore<MappingVersion>> {
    manager: LibraryManager<MappingDomain, S>,
    min_override_frequency: usize,
}

impl MappingLibrary<MemoryVersionStore<MappingVersion>> {
    /// Library over the reference in-memory store.
    pub fn in_memory() -> Self {
        // An empty memory store cannot fail to list.
        Self::new(MemoryVersionStore::new()).expect("memory store is infallible")
    }
}

impl<S: VersionStore<MappingVersion>> MappingLibrary<S> {
    /// Library over an arbitrary store, with the default override threshold.
    pub fn new(store: S) -> StoreResult<Self> {
        Self::with_min_frequency(store, 2)
    }

    /// Library with an explicit recurrence threshold for learned entries.
    pub fn with_min_frequency(store: S, min_override_frequency: usize) -> StoreResult<Self> {
        Ok(Self {
            manager: LibraryManager::new(store)?,
            min_override_frequency,
        })
    }

    pub fn active_version(&self) -> StoreResult<Option<MappingVersion>> {
        self.manager.active_version()
    }

    pub fn version(&self, id: &str) -> StoreResult<Option<MappingVersion>> {
        self.manager.version(id)
    }

    pub fn versions(&self) -> StoreResult<Vec<MappingVersion>> {
        self.manager.versions()
    }

    /// Publish a draft through the shared workflow.
    pub fn publish(
        &mut self,
        draft: &MappingDraft,
        published_by: &str,
    ) -> Result<MappingVersion, crate::error::PublishError> {
        self.manager.publish(draft, published_by)
    }

    /// Assemble a new draft.
    ///
    /// Copies the base version's entries verbatim (when given and found),
    /// then lets the learning loop refresh confidence scores from recorded
    /// overrides and extract brand-new entries from corrections not yet
    /// represented. Entries untouched by either step carry through unchanged,
    /// in base order.
    pub fn build_draft(
        &self,
        base_version_id: Option<&str>,
        since: Option<u64>,
        learning_loop: Option<&dyn LearningLoop>,
    ) -> StoreResult<MappingDraft> {
        let mut draft = MappingDraft::empty();

        if let Some(base_id) = base_version_id {
            if let Some(base) = self.manager.version(base_id)? {
                draft.entries = base.entries().to_vec();
                draft.base_version_id = Some(base.id().to_string());
            }
        }

        if let Some(learning) = learning_loop {
            let overrides = learning.overrides_since(since);

            let refreshed = learning.update_confidence_scores(&overrides, &draft.entries);
            for (slot, fresh) in draft.entries.iter_mut().zip(refreshed) {
                if fresh.confidence != slot.confidence {
                    draft.diff.changed.push(EntryChange {
                        entry_id: slot.id.clone(),
                        field: "confidence".into(),
                        previous: format!("{:.4}", slot.confidence),
                        current: format!("{:.4}", fresh.confidence),
                    });
                    *slot = fresh;
                }
            }

            let extracted = learning.extract_new_patterns(
                &overrides,
                &draft.entries,
                self.min_override_frequency,
            );
            for entry in extracted {
                tracing::debug!(
                    entry = %entry.id,
                    code = %entry.target_code,
                    "learned new mapping entry from overrides"
                );
                draft.diff.added.push(AddedEntry {
                    entry_id: entry.id.clone(),
                    description: format!(
                        "learned \"{}\" → {} from recurring overrides",
                        entry.pattern, entry.target_code
                    ),
                });
                draft.entries.push(entry);
            }
        }

        Ok(draft)
    }
}
