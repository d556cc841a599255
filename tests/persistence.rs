//! Persistence and recovery tests for the durable version stores.
//!
//! These verify that published versions, the active pointer, and the version
//! numbering all survive a close-and-reopen cycle, and that the durable
//! store's monotonic-write guard holds across restarts.

use almanac::assumption::{
    AssumptionDraft, AssumptionEntry, AssumptionLibrary, AssumptionValue, AssumptionVersion,
    ConfidenceLabel,
};
use almanac::error::StoreError;
use almanac::mapping::{MappingDraft, MappingEntry, MappingLibrary, MappingVersion};
use almanac::store::{DurableVersionStore, Snapshot, VersionStore};

fn mapping_library(dir: &std::path::Path) -> MappingLibrary<DurableVersionStore<MappingVersion>> {
    let store = DurableVersionStore::open(dir, "mapping").unwrap();
    MappingLibrary::new(store).unwrap()
}

#[test]
fn mapping_versions_survive_restart() {
    let dir = tempfile::TempDir::new().unwrap();

    let v1_id;
    // First session: publish and drop.
    {
        let mut library = mapping_library(dir.path());
        let mut draft = MappingDraft::empty();
        draft.entries.push(MappingEntry::new("concrete works", "F", 0.9));
        let v1 = library.publish(&draft, "steward").unwrap();
        v1_id = v1.id().to_string();
    }

    // Second session: reopen and verify the pinned snapshot is intact.
    {
        let library = mapping_library(dir.path());
        let v1 = library.version(&v1_id).unwrap().expect("v1 must survive");
        assert_eq!(v1.number(), 1);
        assert_eq!(v1.entries().len(), 1);
        assert_eq!(v1.entries()[0].pattern, "concrete works");
        assert_eq!(v1.published_by(), "steward");

        let active = library.active_version().unwrap().expect("active must survive");
        assert_eq!(active, v1);
    }
}

#[test]
fn numbering_resumes_after_restart() {
    let dir = tempfile::TempDir::new().unwrap();

    // First session: two publishes.
    {
        let mut library = mapping_library(dir.path());
        let mut draft = MappingDraft::empty();
        draft.entries.push(MappingEntry::new("concrete works", "F", 0.9));
        library.publish(&draft, "steward").unwrap();
        draft.entries.push(MappingEntry::new("steel rebar supply", "S02", 0.7));
        library.publish(&draft, "steward").unwrap();
    }

    // Second session: the next publish must continue at 3, not restart at 1.
    {
        let mut library = mapping_library(dir.path());
        let mut draft = library
            .build_draft(
                library.active_version().unwrap().map(|v| v.id().to_string()).as_deref(),
                None,
                None,
            )
            .unwrap();
        draft.entries.push(MappingEntry::new("site security", "N80", 0.6));
        let v3 = library.publish(&draft, "steward").unwrap();
        assert_eq!(v3.number(), 3);
        assert_eq!(library.versions().unwrap().len(), 3);
    }
}

#[test]
fn assumption_versions_survive_restart() {
    let dir = tempfile::TempDir::new().unwrap();

    {
        let store = DurableVersionStore::open(dir.path(), "assumption").unwrap();
        let mut library = AssumptionLibrary::new(store).unwrap();
        let mut draft = AssumptionDraft::empty();
        draft.entries.push(AssumptionEntry::new(
            "labor-share",
            Some("S02".into()),
            "Labor share",
            AssumptionValue::Numeric {
                value: 0.55,
                min: 0.3,
                max: 0.8,
            },
            Some("ratio".into()),
            "calibrated against the reference survey",
            "survey:2024",
            ConfidenceLabel::Medium,
        ));
        library.publish(&draft, "steward").unwrap();
    }

    let store = DurableVersionStore::open(dir.path(), "assumption").unwrap();
    let library: AssumptionLibrary<DurableVersionStore<AssumptionVersion>> =
        AssumptionLibrary::new(store).unwrap();
    let defaults = library.defaults_for_sector("S02", None).unwrap();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].name, "Labor share");
    assert!(matches!(
        defaults[0].value,
        AssumptionValue::Numeric { value, .. } if value == 0.55
    ));
}

#[test]
fn monotonic_guard_holds_across_restarts() {
    let dir = tempfile::TempDir::new().unwrap();

    {
        let mut library = mapping_library(dir.path());
        let mut draft = MappingDraft::empty();
        draft.entries.push(MappingEntry::new("concrete works", "F", 0.9));
        library.publish(&draft, "steward").unwrap();
    }

    // A stale writer reopening the store cannot reuse number 1.
    let mut store: DurableVersionStore<MappingVersion> =
        DurableVersionStore::open(dir.path(), "mapping").unwrap();
    let stale = store.get("mapping-v1").unwrap().unwrap();
    let err = store.save(stale).unwrap_err();
    assert!(matches!(err, StoreError::NonMonotonicWrite { number: 1, head: 1 }));
}
