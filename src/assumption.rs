//! Assumption library: named default values downstream models fall back to.
//!
//! Defaults are either numeric with a plausible range or categorical with an
//! allowed-value set, and are scoped to one sector code or economy-wide.
//! Unlike the mapping library there is no learning-loop integration — default
//! calibration happens through separate studies, outside this crate.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::manager::{DraftDiff, DraftStatus, KnowledgeDomain, LibraryManager};
use crate::mapping::slugify;
use crate::store::{MemoryVersionStore, Snapshot, StoreResult, VersionStore};

/// How much trust calibration has placed in a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLabel {
    Low,
    Medium,
    High,
}

impl ConfidenceLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for ConfidenceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value side of a default: a number with its plausible range, or a
/// category with its allowed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssumptionValue {
    Numeric { value: f64, min: f64, max: f64 },
    Categorical { value: String, allowed: Vec<String> },
}

/// One named default assumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssumptionEntry {
    /// Stable identifier derived from kind, scope, and name.
    pub id: String,
    /// Free-form grouping (e.g. "labor-share", "discount-rate").
    pub kind: String,
    /// Sector code this default applies to; `None` means economy-wide.
    pub sector: Option<String>,
    /// Human-readable name.
    pub name: String,
    pub value: AssumptionValue,
    /// Unit of measure for numeric values.
    pub unit: Option<String>,
    /// Why this default is what it is.
    pub rationale: String,
    /// Where the figure came from.
    pub provenance: String,
    pub confidence: ConfidenceLabel,
}

impl AssumptionEntry {
    /// Build an entry with its identifier derived from kind, scope, and name.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: impl Into<String>,
        sector: Option<String>,
        name: impl Into<String>,
        value: AssumptionValue,
        unit: Option<String>,
        rationale: impl Into<String>,
        provenance: impl Into<String>,
        confidence: ConfidenceLabel,
    ) -> Self {
        let kind = kind.into();
        let name = name.into();
        let scope = sector.as_deref().unwrap_or("all");
        Self {
            id: format!("{}--{}--{}", slugify(&kind), slugify(scope), slugify(&name)),
            kind,
            sector,
            name,
            value,
            unit,
            rationale: rationale.into(),
            provenance: provenance.into(),
            confidence,
        }
    }

    /// Whether this default applies to the given sector, either by exact
    /// scope or because it is economy-wide.
    pub fn applies_to(&self, sector_code: &str) -> bool {
        match &self.sector {
            Some(scope) => scope == sector_code,
            None => true,
        }
    }
}

/// Mutable assumption draft under assembly. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssumptionDraft {
    pub status: DraftStatus,
    pub base_version_id: Option<String>,
    pub entries: Vec<AssumptionEntry>,
    pub diff: DraftDiff,
}

impl AssumptionDraft {
    pub fn empty() -> Self {
        Self {
            status: DraftStatus::Draft,
            base_version_id: None,
            entries: Vec::new(),
            diff: DraftDiff::default(),
        }
    }

    /// Content identity used by the publication idempotency check.
    pub fn content_identity(&self) -> BTreeSet<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }
}

/// Immutable published assumption snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssumptionVersion {
    id: String,
    number: u32,
    published_by: String,
    published_at: u64,
    base_version_id: Option<String>,
    entries: Vec<AssumptionEntry>,
    diff: DraftDiff,
    entry_count: usize,
}

impl AssumptionVersion {
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

    pub fn entries(&self) -> &[AssumptionEntry] {
        &self.entries
    }

    pub fn diff(&self) -> &DraftDiff {
        &self.diff
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Content identity used by the publication idempotency check.
    pub fn content_identity(&self) -> BTreeSet<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }
}

impl Snapshot for AssumptionVersion {
    fn id(&self) -> &str {
        &self.id
    }

    fn number(&self) -> u32 {
        self.number
    }
}

/// Domain hooks wiring the assumption types into the generic manager.
#[derive(Debug)]
pub struct AssumptionDomain;

impl KnowledgeDomain for AssumptionDomain {
    type Entry = AssumptionEntry;
    type Draft = AssumptionDraft;
    type Version = AssumptionVersion;

    const NAME: &'static str = "assumption";

    fn draft_status(draft: &AssumptionDraft) -> DraftStatus {
        draft.status
    }

    fn seal(draft: &AssumptionDraft, number: u32, published_by: &str) -> AssumptionVersion {
        AssumptionVersion {
            id: format!("{}-v{number}", Self::NAME),
            number,
            published_by: published_by.to_string(),
            published_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            base_version_id: draft.base_version_id.clone(),
            entries: draft.entries.clone(),
            diff: draft.diff.clone(),
            entry_count: draft.entries.len(),
        }
    }
}

/// The assumption knowledge library.
#[derive(Debug)]
pub struct AssumptionLibrary<
    S: VersionStore<AssumptionVersion> = MemoryVersionStore<AssumptionVersion>,
> {
    manager: LibraryManager<AssumptionDomain, S>,
}

impl AssumptionLibrary<MemoryVersionStore<AssumptionVersion>> {
    /// Library over the reference in-memory store.
    pub fn in_memory() -> Self {
        Self::new(MemoryVersionStore::new()).expect("memory store is infallible")
    }
}

impl<S: VersionStore<AssumptionVersion>> AssumptionLibrary<S> {
    pub fn new(store: S) -> StoreResult<Self> {
        Ok(Self {
            manager: LibraryManager::new(store)?,
        })
    }

    pub fn active_version(&self) -> StoreResult<Option<AssumptionVersion>> {
        self.manager.active_version()
    }

    pub fn version(&self, id: &str) -> StoreResult<Option<AssumptionVersion>> {
        self.manager.version(id)
    }

    pub fn versions(&self) -> StoreResult<Vec<AssumptionVersion>> {
        self.manager.versions()
    }

    pub fn publish(
        &mut self,
        draft: &AssumptionDraft,
        published_by: &str,
    ) -> Result<AssumptionVersion, crate::error::PublishError> {
        self.manager.publish(draft, published_by)
    }

    /// Assemble a new draft by copying the base version's entries verbatim.
    pub fn build_draft(&self, base_version_id: Option<&str>) -> StoreResult<AssumptionDraft> {
        let mut draft = AssumptionDraft::empty();
        if let Some(base_id) = base_version_id {
            if let Some(base) = self.manager.version(base_id)? {
                draft.entries = base.entries().to_vec();
                draft.base_version_id = Some(base.id().to_string());
            }
        }
        Ok(draft)
    }

    /// Defaults applicable to a sector from the **active** version: entries
    /// scoped to that sector plus economy-wide ones, optionally filtered by
    /// kind, in the active version's stored entry order. Empty when nothing
    /// has been published yet.
    pub fn defaults_for_sector(
        &self,
        sector_code: &str,
        kind: Option<&str>,
    ) -> StoreResult<Vec<AssumptionEntry>> {
        let Some(active) = self.manager.active_version()? else {
            return Ok(Vec::new());
        };
        Ok(active
            .entries()
            .iter()
            .filter(|e| e.applies_to(sector_code))
            .filter(|e| kind.is_none_or(|k| e.kind == k))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(kind: &str, sector: Option<&str>, name: &str, value: f64) -> AssumptionEntry {
        AssumptionEntry::new(
            kind,
            sector.map(str::to_string),
            name,
            AssumptionValue::Numeric {
                value,
                min: value / 2.0,
                max: value * 2.0,
            },
            Some("ratio".into()),
            "calibrated against the reference survey",
            "survey:2024",
            ConfidenceLabel::Medium,
        )
    }

    fn categorical(kind: &str, name: &str) -> AssumptionEntry {
        AssumptionEntry::new(
            kind,
            None,
            name,
            AssumptionValue::Categorical {
                value: "standard".into(),
                allowed: vec!["standard".into(), "accelerated".into()],
            },
            None,
            "default schedule treatment",
            "methodology-note:7",
            ConfidenceLabel::High,
        )
    }

    #[test]
    fn entry_ids_distinguish_scope() {
        let wide = numeric("labor-share", None, "Labor share", 0.4);
        let scoped = numeric("labor-share", Some("S02"), "Labor share", 0.55);
        assert_eq!(wide.id, "labor-share--all--labor-share");
        assert_eq!(scoped.id, "labor-share--s02--labor-share");
        assert_ne!(wide.id, scoped.id);
    }

    #[test]
    fn defaults_before_first_publish_are_empty() {
        let library = AssumptionLibrary::in_memory();
        assert!(library.defaults_for_sector("S02", None).unwrap().is_empty());
    }

    #[test]
    fn defaults_include_sector_and_economy_wide() {
        let mut library = AssumptionLibrary::in_memory();
        let mut draft = AssumptionDraft::empty();
        draft.entries.push(numeric("labor-share", Some("S02"), "Labor share", 0.55));
        draft.entries.push(numeric("labor-share", Some("F"), "Labor share", 0.35));
        draft.entries.push(categorical("schedule", "Build profile"));
        library.publish(&draft, "steward").unwrap();

        let defaults = library.defaults_for_sector("S02", None).unwrap();
        assert_eq!(defaults.len(), 2);
        // Stored entry order, not sorted.
        assert_eq!(defaults[0].sector.as_deref(), Some("S02"));
        assert!(defaults[1].sector.is_none());
    }

    #[test]
    fn kind_filter_narrows_defaults() {
        let mut library = AssumptionLibrary::in_memory();
        let mut draft = AssumptionDraft::empty();
        draft.entries.push(numeric("labor-share", None, "Labor share", 0.4));
        draft.entries.push(categorical("schedule", "Build profile"));
        library.publish(&draft, "steward").unwrap();

        let defaults = library.defaults_for_sector("S02", Some("schedule")).unwrap();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].kind, "schedule");
    }

    #[test]
    fn build_draft_copies_base_version() {
        let mut library = AssumptionLibrary::in_memory();
        let mut draft = AssumptionDraft::empty();
        draft.entries.push(numeric("labor-share", None, "Labor share", 0.4));
        let v1 = library.publish(&draft, "steward").unwrap();

        let rebuilt = library.build_draft(Some(v1.id())).unwrap();
        assert_eq!(rebuilt.base_version_id.as_deref(), Some(v1.id()));
        assert_eq!(rebuilt.entries, v1.entries());
    }

    #[test]
    fn versions_number_sequentially() {
        let mut library = AssumptionLibrary::in_memory();
        let mut draft = AssumptionDraft::empty();
        draft.entries.push(numeric("labor-share", None, "Labor share", 0.4));
        let v1 = library.publish(&draft, "steward").unwrap();
        draft.entries.push(categorical("schedule", "Build profile"));
        let v2 = library.publish(&draft, "steward").unwrap();

        assert_eq!((v1.number(), v2.number()), (1, 2));
        assert_eq!(library.active_version().unwrap().unwrap().number(), 2);
        assert_eq!(v2.entry_count(), 2);
    }
}
