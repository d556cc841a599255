//! Learning loop: turning analyst corrections into mapping refinements.
//!
//! An override is recorded whenever an analyst replaces a suggested code with
//! a final one. The loop feeds those corrections back into the mapping
//! library in two ways: refreshing confidence scores on existing entries, and
//! extracting brand-new entries from corrections that recur often enough to
//! be worth codifying. The capture mechanism itself lives outside this crate;
//! [`InMemoryLearningLoop`] is the reference implementation the tests drive.

use serde::{Deserialize, Serialize};

use crate::mapping::MappingEntry;

/// One recorded analyst correction: the code the system suggested versus the
/// code the analyst finally chose for a piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRecord {
    /// The text the analyst was classifying.
    pub pattern_text: String,
    /// What the mapping library suggested.
    pub suggested_code: String,
    /// What the analyst decided.
    pub final_code: String,
    /// Seconds since the UNIX epoch.
    pub recorded_at: u64,
}

impl OverrideRecord {
    /// Record a correction stamped with the current time.
    pub fn new(
        pattern_text: impl Into<String>,
        suggested_code: impl Into<String>,
        final_code: impl Into<String>,
    ) -> Self {
        Self {
            pattern_text: pattern_text.into(),
            suggested_code: suggested_code.into(),
            final_code: final_code.into(),
            recorded_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Whether the suggestion survived review unchanged.
    pub fn suggestion_held(&self) -> bool {
        self.suggested_code == self.final_code
    }
}

/// Collaborator interface consumed by the mapping draft builder.
pub trait LearningLoop {
    /// Recorded overrides, optionally restricted to `recorded_at >= since`.
    fn overrides_since(&self, since: Option<u64>) -> Vec<OverrideRecord>;

    /// Recompute confidence for existing entries from recorded overrides.
    ///
    /// Returns fresh entries in input order; the originals are left
    /// untouched. An entry with at least one matching override (final code
    /// equal to its target code) comes back with confidence
    /// `(old + match_accuracy) / 2`, where `match_accuracy` is the fraction
    /// of matching overrides whose suggestion held. Entries with no matching
    /// override come back unchanged.
    fn update_confidence_scores(
        &self,
        overrides: &[OverrideRecord],
        entries: &[MappingEntry],
    ) -> Vec<MappingEntry>;

    /// Extract brand-new entries from overrides not already represented.
    ///
    /// Overrides are grouped by final code; a group recurring at least
    /// `min_frequency` times yields one entry whose pattern is the group's
    /// most frequent text and whose confidence is the fraction of the
    /// group's overrides whose suggestion held. Groups already present
    /// verbatim (pattern text + code) among `existing` are skipped.
    fn extract_new_patterns(
        &self,
        overrides: &[OverrideRecord],
        existing: &[MappingEntry],
        min_frequency: usize,
    ) -> Vec<MappingEntry>;
}

/// Reference learning loop holding overrides in memory.
#[derive(Debug, Default)]
pub struct InMemoryLearningLoop {
    overrides: Vec<OverrideRecord>,
}

impl InMemoryLearningLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a correction to the log.
    pub fn record_override(&mut self, record: OverrideRecord) {
        self.overrides.push(record);
    }

    /// Number of recorded overrides.
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    /// Whether any overrides have been recorded.
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

impl LearningLoop for InMemoryLearningLoop {
    fn overrides_since(&self, since: Option<u64>) -> Vec<OverrideRecord> {
        match since {
            Some(since) => self
                .overrides
                .iter()
                .filter(|o| o.recorded_at >= since)
                .cloned()
                .collect(),
            None => self.overrides.clone(),
        }
    }

    fn update_confidence_scores(
        &self,
        overrides: &[OverrideRecord],
        entries: &[MappingEntry],
    ) -> Vec<MappingEntry> {
        entries
            .iter()
            .map(|entry| {
                let matching: Vec<&OverrideRecord> = overrides
                    .iter()
                    .filter(|o| o.final_code == entry.target_code)
                    .collect();
                let mut fresh = entry.clone();
                if !matching.is_empty() {
                    let held = matching.iter().filter(|o| o.suggestion_held()).count();
                    let accuracy = held as f64 / matching.len() as f64;
                    fresh.confidence = (entry.confidence + accuracy) / 2.0;
                }
                fresh
            })
            .collect()
    }

    fn extract_new_patterns(
        &self,
        overrides: &[OverrideRecord],
        existing: &[MappingEntry],
        min_frequency: usize,
    ) -> Vec<MappingEntry> {
        // Group by final code, preserving first-seen order for determinism.
        let mut codes: Vec<String> = Vec::new();
        for o in overrides {
            if !codes.contains(&o.final_code) {
                codes.push(o.final_code.clone());
            }
        }

        let mut extracted = Vec::new();
        for code in codes {
            let group: Vec<&OverrideRecord> = overrides
                .iter()
                .filter(|o| o.final_code == code)
                .collect();
            if group.len() < min_frequency {
                continue;
            }

            // Most frequent pattern text in the group; first seen wins ties.
            let mut texts: Vec<(&str, usize)> = Vec::new();
            for o in &group {
                match texts.iter_mut().find(|(t, _)| *t == o.pattern_text) {
                    Some((_, count)) => *count += 1,
                    None => texts.push((&o.pattern_text, 1)),
                }
            }
            let top_count = texts.iter().map(|(_, count)| *count).max().unwrap_or(0);
            let pattern = texts
                .iter()
                .find(|(_, count)| *count == top_count)
                .map(|(t, _)| *t)
                .unwrap_or_default();

            let already_present = existing
                .iter()
                .any(|e| e.pattern == pattern && e.target_code == code);
            if already_present {
                continue;
            }

            let held = group.iter().filter(|o| o.suggestion_held()).count();
            let confidence = held as f64 / group.len() as f64;
            extracted.push(MappingEntry::new(pattern, code, confidence));
        }
        extracted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str, suggested: &str, final_code: &str, at: u64) -> OverrideRecord {
        OverrideRecord {
            pattern_text: text.into(),
            suggested_code: suggested.into(),
            final_code: final_code.into(),
            recorded_at: at,
        }
    }

    #[test]
    fn overrides_since_boundary_is_inclusive() {
        let mut learning = InMemoryLearningLoop::new();
        learning.record_override(record("a", "X", "X", 10));
        learning.record_override(record("b", "X", "X", 20));
        learning.record_override(record("c", "X", "X", 30));

        assert_eq!(learning.overrides_since(None).len(), 3);
        assert_eq!(learning.overrides_since(Some(20)).len(), 2);
        assert_eq!(learning.overrides_since(Some(31)).len(), 0);
    }

    #[test]
    fn confidence_refresh_averages_with_accuracy() {
        let learning = InMemoryLearningLoop::new();
        let entries = vec![
            MappingEntry::new("concrete works", "F", 0.9),
            MappingEntry::new("site security", "N80", 0.6),
        ];
        // Two overrides for F: one held, one did not → accuracy 0.5.
        let overrides = vec![
            record("concrete pour", "F", "F", 1),
            record("concrete slab", "X", "F", 2),
        ];

        let fresh = learning.update_confidence_scores(&overrides, &entries);
        assert!((fresh[0].confidence - (0.9 + 0.5) / 2.0).abs() < 1e-12);
        // No override touched N80: unchanged.
        assert_eq!(fresh[1].confidence, 0.6);
        // Originals untouched.
        assert_eq!(entries[0].confidence, 0.9);
    }

    #[test]
    fn extraction_requires_min_frequency() {
        let learning = InMemoryLearningLoop::new();
        let overrides = vec![record("steel rebar supply", "S02", "S02", 1)];
        let extracted = learning.extract_new_patterns(&overrides, &[], 2);
        assert!(extracted.is_empty());

        let extracted = learning.extract_new_patterns(&overrides, &[], 1);
        assert_eq!(extracted.len(), 1);
    }

    #[test]
    fn extraction_confidence_is_held_fraction() {
        let learning = InMemoryLearningLoop::new();
        let overrides = vec![
            record("steel rebar supply", "S02", "S02", 1),
            record("steel rebar supply", "S02", "S02", 2),
            record("steel rebar supply", "X", "S02", 3),
        ];
        let extracted = learning.extract_new_patterns(&overrides, &[], 2);
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].pattern, "steel rebar supply");
        assert_eq!(extracted[0].target_code, "S02");
        assert!((extracted[0].confidence - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn extraction_skips_patterns_already_present() {
        let learning = InMemoryLearningLoop::new();
        let existing = vec![MappingEntry::new("steel rebar supply", "S02", 0.8)];
        let overrides = vec![
            record("steel rebar supply", "S02", "S02", 1),
            record("steel rebar supply", "S02", "S02", 2),
        ];
        let extracted = learning.extract_new_patterns(&overrides, &existing, 2);
        assert!(extracted.is_empty());
    }

    #[test]
    fn extraction_picks_most_frequent_text() {
        let learning = InMemoryLearningLoop::new();
        let overrides = vec![
            record("rebar", "S02", "S02", 1),
            record("steel rebar supply", "S02", "S02", 2),
            record("steel rebar supply", "S02", "S02", 3),
        ];
        let extracted = learning.extract_new_patterns(&overrides, &[], 2);
        assert_eq!(extracted[0].pattern, "steel rebar supply");
    }
}
