//! Publication cycle: build, gate, and conditionally publish new versions.
//!
//! The orchestrator owns the mapping and assumption libraries and runs one
//! full cycle: rebuild both drafts from the active versions, let the quality
//! gate veto the mapping draft, skip anything whose content is unchanged, and
//! publish the rest through the shared manager workflow. Gate failures are
//! data, never errors — a vetoed draft simply sits out the cycle.

use serde::{Deserialize, Serialize};

use crate::assumption::{AssumptionLibrary, AssumptionVersion};
use crate::config::AlmanacConfig;
use crate::error::AlmanacResult;
use crate::learning::LearningLoop;
use crate::mapping::{MappingDraft, MappingLibrary, MappingVersion};
use crate::store::{MemoryVersionStore, Snapshot, VersionStore};

/// Which pre-publication checks the gate runs. All on by default.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityGateConfig {
    /// Demand steward sign-off before a mapping draft may publish.
    pub require_steward_review: bool,
    /// Flag (pattern, code) pairs appearing more than once.
    pub check_duplicates: bool,
    /// Flag patterns mapped to more than one distinct code.
    pub check_conflicts: bool,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            require_steward_review: true,
            check_duplicates: true,
            check_conflicts: true,
        }
    }
}

/// Pre-publication validation for mapping drafts.
///
/// Assumption drafts are never gated; their entries are hand-calibrated
/// rather than machine-learned, so the failure modes this gate catches
/// cannot arise there.
#[derive(Debug, Clone, Default)]
pub struct PublicationQualityGate {
    config: QualityGateConfig,
}

impl PublicationQualityGate {
    pub fn new(config: QualityGateConfig) -> Self {
        Self { config }
    }

    /// Run every enabled check. An empty list is a pass.
    pub fn evaluate(&self, draft: &MappingDraft, steward_approved: bool) -> Vec<String> {
        let mut failures = Vec::new();

        if self.config.require_steward_review && !steward_approved {
            failures.push("steward review required but not approved".to_string());
        }

        if self.config.check_duplicates {
            // Count (pattern, code) pairs, preserving first-seen order.
            let mut pairs: Vec<(&str, &str, usize)> = Vec::new();
            for entry in &draft.entries {
                match pairs
                    .iter_mut()
                    .find(|(p, c, _)| *p == entry.pattern && *c == entry.target_code)
                {
                    Some((_, _, count)) => *count += 1,
                    None => pairs.push((&entry.pattern, &entry.target_code, 1)),
                }
            }
            for (pattern, code, count) in pairs {
                if count > 1 {
                    failures.push(format!(
                        "duplicate mapping: (\"{pattern}\", {code}) appears {count} times"
                    ));
                }
            }
        }

        if self.config.check_conflicts {
            let mut by_pattern: Vec<(&str, Vec<&str>)> = Vec::new();
            for entry in &draft.entries {
                match by_pattern.iter_mut().find(|(p, _)| *p == entry.pattern) {
                    Some((_, codes)) => {
                        if !codes.contains(&entry.target_code.as_str()) {
                            codes.push(&entry.target_code);
                        }
                    }
                    None => by_pattern.push((&entry.pattern, vec![&entry.target_code])),
                }
            }
            for (pattern, codes) in by_pattern {
                if codes.len() > 1 {
                    failures.push(format!(
                        "conflicting mapping: \"{pattern}\" maps to [{}]",
                        codes.join(", ")
                    ));
                }
            }
        }

        failures
    }
}

/// Read-only collaborator summarizing workforce-classification refinement
/// coverage. Its payload is embedded verbatim in the cycle outcome.
pub trait WorkforceBridgeRefinement {
    fn refinement_coverage(&self) -> serde_json::Value;
}

/// Inputs to one publication cycle.
pub struct CycleRequest<'a> {
    /// Identity recorded as the publisher on anything published.
    pub published_by: &'a str,
    /// Only overrides recorded at or after this timestamp feed the draft.
    pub since: Option<u64>,
    pub learning_loop: Option<&'a dyn LearningLoop>,
    /// Whether a steward has signed off on the mapping draft.
    pub steward_approved: bool,
    /// Gate to run over the mapping draft; `None` skips gating entirely.
    pub quality_gate: Option<&'a PublicationQualityGate>,
    pub workforce_bridge: Option<&'a dyn WorkforceBridgeRefinement>,
}

impl<'a> CycleRequest<'a> {
    /// A minimal request: no learning input, no gate, no bridge.
    pub fn bare(published_by: &'a str) -> Self {
        Self {
            published_by,
            since: None,
            learning_loop: None,
            steward_approved: false,
            quality_gate: None,
            workforce_bridge: None,
        }
    }
}

/// What one publication cycle did.
#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    /// The mapping version published this cycle, if any.
    pub mapping_version: Option<MappingVersion>,
    /// The assumption version published this cycle, if any.
    pub assumption_version: Option<AssumptionVersion>,
    /// Entries the learning loop added to the mapping draft. Counted even
    /// when the draft is ultimately vetoed or unchanged.
    pub new_patterns: usize,
    /// Entries whose confidence the learning loop refreshed. Counted under
    /// the same quirk as `new_patterns`.
    pub updated_patterns: usize,
    /// Gate failures that vetoed the mapping draft; empty on a pass.
    pub gate_failures: Vec<String>,
    /// Verbatim payload from the workforce bridge; `Null` without one.
    pub refinement_coverage: serde_json::Value,
    /// Seconds since the UNIX epoch.
    pub completed_at: u64,
    /// One-line human-readable account of the cycle.
    pub summary: String,
}

/// Coordinates publication cycles across the knowledge libraries.
#[derive(Debug)]
pub struct PublicationOrchestrator<
    SM: VersionStore<MappingVersion> = MemoryVersionStore<MappingVersion>,
    SA: VersionStore<AssumptionVersion> = MemoryVersionStore<AssumptionVersion>,
> {
    mappings: MappingLibrary<SM>,
    assumptions: AssumptionLibrary<SA>,
}

impl PublicationOrchestrator {
    /// Orchestrator over the reference in-memory stores.
    pub fn in_memory() -> Self {
        Self {
            mappings: MappingLibrary::in_memory(),
            assumptions: AssumptionLibrary::in_memory(),
        }
    }

    /// In-memory orchestrator tuned by an [`AlmanacConfig`].
    pub fn with_config(config: &AlmanacConfig) -> Self {
        Self {
            mappings: MappingLibrary::with_min_frequency(
                MemoryVersionStore::new(),
                config.min_override_frequency,
            )
            .expect("memory store is infallible"),
            assumptions: AssumptionLibrary::in_memory(),
        }
    }
}

impl<SM, SA> PublicationOrchestrator<SM, SA>
where
    SM: VersionStore<MappingVersion>,
    SA: VersionStore<AssumptionVersion>,
{
    /// Orchestrator over caller-supplied libraries (e.g. durable-backed).
    pub fn new(mappings: MappingLibrary<SM>, assumptions: AssumptionLibrary<SA>) -> Self {
        Self {
            mappings,
            assumptions,
        }
    }

    pub fn mappings(&self) -> &MappingLibrary<SM> {
        &self.mappings
    }

    pub fn mappings_mut(&mut self) -> &mut MappingLibrary<SM> {
        &mut self.mappings
    }

    pub fn assumptions(&self) -> &AssumptionLibrary<SA> {
        &self.assumptions
    }

    pub fn assumptions_mut(&mut self) -> &mut AssumptionLibrary<SA> {
        &mut self.assumptions
    }

    /// Run one full publication cycle.
    ///
    /// Each library is handled independently: the mapping draft can be
    /// vetoed by the gate or skipped as unchanged while the assumption
    /// draft still publishes, and vice versa. With no active version yet,
    /// an empty draft also counts as unchanged — a first, empty version is
    /// never published.
    pub fn publish_new_cycle(&mut self, req: CycleRequest<'_>) -> AlmanacResult<CycleOutcome> {
        // Mapping draft, always built and counted, even if never published.
        let active_mapping = self.mappings.active_version()?;
        let mapping_draft = self.mappings.build_draft(
            active_mapping.as_ref().map(|v| v.id()),
            req.since,
            req.learning_loop,
        )?;
        let new_patterns = mapping_draft.diff.added.len();
        let updated_patterns = mapping_draft.diff.changed.len();

        let active_assumption = self.assumptions.active_version()?;
        let assumption_draft = self
            .assumptions
            .build_draft(active_assumption.as_ref().map(|v| v.id()))?;

        let gate_failures = match req.quality_gate {
            Some(gate) => gate.evaluate(&mapping_draft, req.steward_approved),
            None => Vec::new(),
        };
        if !gate_failures.is_empty() {
            tracing::warn!(
                failures = gate_failures.len(),
                "quality gate vetoed the mapping draft this cycle"
            );
        }

        let mapping_changed = match &active_mapping {
            Some(active) => mapping_draft.content_identity() != active.content_identity(),
            None => !mapping_draft.entries.is_empty(),
        };
        let mapping_version = if gate_failures.is_empty() && mapping_changed {
            Some(self.mappings.publish(&mapping_draft, req.published_by)?)
        } else {
            None
        };

        let assumption_changed = match &active_assumption {
            Some(active) => assumption_draft.content_identity() != active.content_identity(),
            None => !assumption_draft.entries.is_empty(),
        };
        let assumption_version = if assumption_changed {
            Some(self.assumptions.publish(&assumption_draft, req.published_by)?)
        } else {
            None
        };

        let refinement_coverage = req
            .workforce_bridge
            .map(|b| b.refinement_coverage())
            .unwrap_or(serde_json::Value::Null);

        let summary = compose_summary(
            &mapping_version,
            &assumption_version,
            new_patterns,
            updated_patterns,
            &gate_failures,
        );
        tracing::info!(%summary, "publication cycle complete");

        Ok(CycleOutcome {
            mapping_version,
            assumption_version,
            new_patterns,
            updated_patterns,
            gate_failures,
            refinement_coverage,
            completed_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            summary,
        })
    }
}

fn compose_summary(
    mapping: &Option<MappingVersion>,
    assumption: &Option<AssumptionVersion>,
    new_patterns: usize,
    updated_patterns: usize,
    gate_failures: &[String],
) -> String {
    let mapping_part = match mapping {
        Some(v) => format!("mapping v{} published", v.number()),
        None if !gate_failures.is_empty() => "mapping vetoed by quality gate".to_string(),
        None => "mapping unchanged".to_string(),
    };
    let assumption_part = match assumption {
        Some(v) => format!("assumptions v{} published", v.number()),
        None => "assumptions unchanged".to_string(),
    };
    format!(
        "{mapping_part}; {assumption_part}; {new_patterns} new and {updated_patterns} updated mapping entries from overrides"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingEntry;

    fn draft_with(entries: &[(&str, &str, f64)]) -> MappingDraft {
        let mut draft = MappingDraft::empty();
        for (pattern, code, confidence) in entries {
            draft.entries.push(MappingEntry::new(*pattern, *code, *confidence));
        }
        draft
    }

    #[test]
    fn gate_passes_clean_draft() {
        let gate = PublicationQualityGate::default();
        let draft = draft_with(&[("concrete works", "F", 0.9), ("site security", "N80", 0.7)]);
        assert!(gate.evaluate(&draft, true).is_empty());
    }

    #[test]
    fn unapproved_draft_fails_review_check() {
        let gate = PublicationQualityGate::default();
        let draft = draft_with(&[("concrete works", "F", 0.9)]);
        let failures = gate.evaluate(&draft, false);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("steward review"));
    }

    #[test]
    fn duplicate_pair_yields_exactly_one_failure() {
        let gate = PublicationQualityGate::default();
        let draft = draft_with(&[
            ("concrete supply", "S01", 0.8),
            ("concrete supply", "S01", 0.9),
        ]);
        let failures = gate.evaluate(&draft, true);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("concrete supply"));
        assert!(failures[0].contains("2 times"));
    }

    #[test]
    fn conflicting_codes_yield_one_failure_naming_both() {
        let gate = PublicationQualityGate::default();
        let draft = draft_with(&[("X", "A", 0.8), ("X", "B", 0.9)]);
        let failures = gate.evaluate(&draft, true);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("A") && failures[0].contains("B"));
    }

    #[test]
    fn disabled_checks_are_skipped() {
        let gate = PublicationQualityGate::new(QualityGateConfig {
            require_steward_review: false,
            check_duplicates: false,
            check_conflicts: true,
        });
        let draft = draft_with(&[
            ("concrete supply", "S01", 0.8),
            ("concrete supply", "S01", 0.9),
        ]);
        // Duplicates ignored; no conflict (same code twice); review off.
        assert!(gate.evaluate(&draft, false).is_empty());
    }
}
