//! Scenario pattern library: similarity-merged structural archetypes.
//!
//! Every engagement leaves behind a structural fingerprint — the spend shares
//! across sectors for one project type, plus a few scalar traits. Fingerprints
//! that look alike (cosine similarity strictly above the merge threshold) are
//! folded into one accumulating pattern with rolling-average numerics; the
//! rest seed new patterns. Patterns are never versioned, never deleted, and
//! have no population cap — this library grows for the lifetime of the
//! process.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::mapping::slugify;

/// Default similarity above which an incoming fingerprint merges into an
/// existing pattern rather than seeding a new one. The comparison is strict:
/// a similarity of exactly this value does not merge.
pub const DEFAULT_MERGE_THRESHOLD: f64 = 0.8;

/// Cosine similarity between two sparse non-negative share vectors.
///
/// The dot product runs over the union of keys, with an absent key
/// contributing 0. Returns exactly `0.0` — never an error — when either map
/// is empty or has zero magnitude. For non-negative inputs the result lies
/// in `[0, 1]`.
pub fn cosine_similarity(a: &BTreeMap<String, f64>, b: &BTreeMap<String, f64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0;
    for (key, &av) in a {
        if let Some(&bv) = b.get(key) {
            dot += av * bv;
        }
    }

    let norm_a = a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b = b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Accumulated trust in a pattern, upgraded as engagements contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    /// Tier warranted by a contribution count: medium at 3, high at 5.
    fn for_count(count: u32) -> Self {
        if count >= 5 {
            Self::High
        } else if count >= 3 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One merge event in a pattern's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRecord {
    /// Engagement whose fingerprint was folded in.
    pub merged_from: String,
    /// Similarity that triggered the merge.
    pub similarity: f64,
    /// Seconds since the UNIX epoch.
    pub merged_at: u64,
}

/// A recurring structural archetype, mutated in place across merges.
///
/// Identity (`id`) is preserved for the pattern's lifetime; everything
/// numeric is a rolling average over the contributing engagements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioPattern {
    pub id: String,
    pub name: String,
    pub project_type: String,
    /// Sector carrying the largest share; `None` while shares are empty.
    pub sector_focus: Option<String>,
    /// Typical spend share per sector code.
    pub sector_shares: BTreeMap<String, f64>,
    /// Rolling average import share, when any contribution carried one.
    pub import_share: Option<f64>,
    /// Rolling average local-content ratio.
    pub local_content: Option<f64>,
    /// Rolling average duration, rounded to the nearest whole year.
    pub duration_years: Option<u32>,
    /// Engagements that contributed, in arrival order.
    pub engagement_ids: Vec<String>,
    /// Scenarios that contributed, in arrival order.
    pub scenario_ids: Vec<String>,
    pub engagement_count: u32,
    pub confidence: ConfidenceTier,
    pub merge_history: Vec<MergeRecord>,
    pub created_at: u64,
    pub last_used_at: u64,
}

impl ScenarioPattern {
    /// The sector with the largest share, first key winning ties.
    fn derive_sector_focus(shares: &BTreeMap<String, f64>) -> Option<String> {
        let mut best: Option<(&String, f64)> = None;
        for (key, &share) in shares {
            if best.is_none_or(|(_, b)| share > b) {
                best = Some((key, share));
            }
        }
        best.map(|(key, _)| key.clone())
    }
}

/// An engagement's structural fingerprint, as handed to
/// [`ScenarioPatternLibrary::record_engagement_pattern`].
#[derive(Debug, Clone)]
pub struct EngagementFingerprint {
    pub engagement_id: String,
    pub scenario_id: String,
    pub project_type: String,
    pub sector_shares: BTreeMap<String, f64>,
    /// Explicit name for a newly seeded pattern; auto-named when absent.
    pub name: Option<String>,
    pub import_share: Option<f64>,
    pub local_content: Option<f64>,
    pub duration_years: Option<u32>,
}

impl EngagementFingerprint {
    pub fn new(
        engagement_id: impl Into<String>,
        scenario_id: impl Into<String>,
        project_type: impl Into<String>,
        sector_shares: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            engagement_id: engagement_id.into(),
            scenario_id: scenario_id.into(),
            project_type: project_type.into(),
            sector_shares,
            name: None,
            import_share: None,
            local_content: None,
            duration_years: None,
        }
    }
}

/// Flat, unversioned store of scenario patterns with similarity-gated merging.
#[derive(Debug)]
pub struct ScenarioPatternLibrary {
    patterns: Vec<ScenarioPattern>,
    next_seq: u64,
    merge_threshold: f64,
}

impl ScenarioPatternLibrary {
    /// Library with the default merge threshold of 0.8.
    pub fn new() -> Self {
        Self::with_merge_threshold(DEFAULT_MERGE_THRESHOLD)
    }

    /// Library with an explicit merge threshold (a cosine similarity).
    pub fn with_merge_threshold(merge_threshold: f64) -> Self {
        Self {
            patterns: Vec::new(),
            next_seq: 1,
            merge_threshold,
        }
    }

    /// Library tuned by an [`AlmanacConfig`](crate::config::AlmanacConfig).
    pub fn with_config(config: &crate::config::AlmanacConfig) -> Self {
        Self::with_merge_threshold(config.merge_threshold)
    }

    /// Number of stored patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether any patterns exist yet.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Patterns matching both filters; either filter absent matches all.
    pub fn find_patterns(
        &self,
        project_type: Option<&str>,
        sector_focus: Option<&str>,
    ) -> Vec<&ScenarioPattern> {
        self.patterns
            .iter()
            .filter(|p| project_type.is_none_or(|t| p.project_type == t))
            .filter(|p| sector_focus.is_none_or(|s| p.sector_focus.as_deref() == Some(s)))
            .collect()
    }

    /// The most-contributed-to pattern for a project type, if any exist.
    pub fn suggest_template(&self, project_type: &str) -> Option<&ScenarioPattern> {
        self.patterns
            .iter()
            .filter(|p| p.project_type == project_type)
            .max_by_key(|p| p.engagement_count)
    }

    /// Fold an engagement's fingerprint into the library.
    ///
    /// The fingerprint is compared against every pattern of the same project
    /// type; the best match strictly above the merge threshold absorbs it,
    /// otherwise a new pattern is seeded. Returns a copy of the resulting
    /// pattern either way.
    pub fn record_engagement_pattern(&mut self, fingerprint: EngagementFingerprint) -> ScenarioPattern {
        let mut best: Option<(usize, f64)> = None;
        for (idx, pattern) in self.patterns.iter().enumerate() {
            if pattern.project_type != fingerprint.project_type {
                continue;
            }
            let similarity = cosine_similarity(&pattern.sector_shares, &fingerprint.sector_shares);
            if best.is_none_or(|(_, b)| similarity > b) {
                best = Some((idx, similarity));
            }
        }

        match best {
            Some((idx, similarity)) if similarity > self.merge_threshold => {
                self.merge_into(idx, fingerprint, similarity)
            }
            _ => self.seed_pattern(fingerprint),
        }
    }

    fn merge_into(
        &mut self,
        idx: usize,
        fingerprint: EngagementFingerprint,
        similarity: f64,
    ) -> ScenarioPattern {
        let now = now_unix();
        let pattern = &mut self.patterns[idx];
        let count = pattern.engagement_count as f64;

        // Rolling average over the union of sector keys; a key absent on
        // either side contributes 0 to its term.
        let mut keys: Vec<String> = pattern.sector_shares.keys().cloned().collect();
        for key in fingerprint.sector_shares.keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        let mut merged = BTreeMap::new();
        for key in keys {
            let old = pattern.sector_shares.get(&key).copied().unwrap_or(0.0);
            let new = fingerprint.sector_shares.get(&key).copied().unwrap_or(0.0);
            merged.insert(key, (old * count + new) / (count + 1.0));
        }
        pattern.sector_shares = merged;
        pattern.sector_focus = ScenarioPattern::derive_sector_focus(&pattern.sector_shares);

        if let Some(new) = fingerprint.import_share {
            let old = pattern.import_share.unwrap_or(0.0);
            pattern.import_share = Some((old * count + new) / (count + 1.0));
        }
        if let Some(new) = fingerprint.local_content {
            let old = pattern.local_content.unwrap_or(0.0);
            pattern.local_content = Some((old * count + new) / (count + 1.0));
        }
        if let Some(new) = fingerprint.duration_years {
            let old = pattern.duration_years.unwrap_or(0) as f64;
            let averaged = (old * count + new as f64) / (count + 1.0);
            pattern.duration_years = Some(averaged.round() as u32);
        }

        pattern.engagement_count += 1;
        pattern.engagement_ids.push(fingerprint.engagement_id.clone());
        pattern.scenario_ids.push(fingerprint.scenario_id);
        pattern.merge_history.push(MergeRecord {
            merged_from: fingerprint.engagement_id,
            similarity,
            merged_at: now,
        });
        pattern.last_used_at = now;

        // Tiers only ever move up.
        let warranted = ConfidenceTier::for_count(pattern.engagement_count);
        if warranted > pattern.confidence {
            pattern.confidence = warranted;
        }

        tracing::debug!(
            pattern = %pattern.id,
            similarity,
            count = pattern.engagement_count,
            "merged engagement fingerprint into existing pattern"
        );
        pattern.clone()
    }

    fn seed_pattern(&mut self, fingerprint: EngagementFingerprint) -> ScenarioPattern {
        let now = now_unix();
        let id = format!("{}-{}", slugify(&fingerprint.project_type), self.next_seq);
        self.next_seq += 1;

        let pattern = ScenarioPattern {
            id,
            name: fingerprint
                .name
                .unwrap_or_else(|| format!("{} pattern", fingerprint.project_type)),
            sector_focus: ScenarioPattern::derive_sector_focus(&fingerprint.sector_shares),
            project_type: fingerprint.project_type,
            sector_shares: fingerprint.sector_shares,
            import_share: fingerprint.import_share,
            local_content: fingerprint.local_content,
            duration_years: fingerprint.duration_years,
            engagement_ids: vec![fingerprint.engagement_id],
            scenario_ids: vec![fingerprint.scenario_id],
            engagement_count: 1,
            confidence: ConfidenceTier::Low,
            merge_history: Vec::new(),
            created_at: now,
            last_used_at: now,
        };

        tracing::info!(
            pattern = %pattern.id,
            project_type = %pattern.project_type,
            "seeded new scenario pattern"
        );
        self.patterns.push(pattern.clone());
        pattern
    }
}

impl Default for ScenarioPatternLibrary {
    fn default() -> Self {
        Self::new()
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
