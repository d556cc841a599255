//! Engine configuration.
//!
//! Embedders either take the defaults, build the struct directly, or load it
//! from a TOML snippet. Every threshold is validated up front so a bad value
//! fails at construction time rather than surfacing as a silently-wrong merge
//! or extraction decision later.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::publication::QualityGateConfig;
use crate::scenario::DEFAULT_MERGE_THRESHOLD;

/// Tunable knobs for the almanac engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlmanacConfig {
    /// Cosine similarity above which engagement fingerprints merge into an
    /// existing scenario pattern (strict comparison).
    #[serde(default = "default_merge_threshold")]
    pub merge_threshold: f64,

    /// How often a correction must recur before the learning loop promotes
    /// it to a mapping entry.
    #[serde(default = "default_min_override_frequency")]
    pub min_override_frequency: usize,

    /// Which quality-gate checks run before a mapping draft may publish.
    #[serde(default)]
    pub gate: QualityGateConfig,
}

fn default_merge_threshold() -> f64 {
    DEFAULT_MERGE_THRESHOLD
}

fn default_min_override_frequency() -> usize {
    2
}

impl Default for AlmanacConfig {
    fn default() -> Self {
        Self {
            merge_threshold: default_merge_threshold(),
            min_override_frequency: default_min_override_frequency(),
            gate: QualityGateConfig::default(),
        }
    }
}

impl AlmanacConfig {
    /// Parse a config from TOML and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range thresholds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.merge_threshold) {
            return Err(ConfigError::InvalidThreshold {
                value: self.merge_threshold,
            });
        }
        if self.min_override_frequency == 0 {
            return Err(ConfigError::InvalidFrequency);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AlmanacConfig::default();
        config.validate().unwrap();
        assert_eq!(config.merge_threshold, 0.8);
        assert_eq!(config.min_override_frequency, 2);
        assert!(config.gate.require_steward_review);
    }

    #[test]
    fn toml_overrides_and_defaults_compose() {
        let config = AlmanacConfig::from_toml_str(
            r#"
            merge_threshold = 0.9

            [gate]
            require_steward_review = false
            check_duplicates = true
            check_conflicts = true
            "#,
        )
        .unwrap();
        assert_eq!(config.merge_threshold, 0.9);
        // Unspecified field falls back to its default.
        assert_eq!(config.min_override_frequency, 2);
        assert!(!config.gate.require_steward_review);
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let err = AlmanacConfig::from_toml_str("merge_threshold = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidThreshold { value } if value == 1.5));
    }

    #[test]
    fn zero_frequency_rejected() {
        let err = AlmanacConfig::from_toml_str("min_override_frequency = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFrequency));
    }

    #[test]
    fn garbage_toml_is_a_parse_error() {
        let err = AlmanacConfig::from_toml_str("merge_threshold = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
