//! Tuning knobs for the engine and both resolvers.
//!
//! Hosts usually keep these next to the rest of their settings as JSON, so the
//! whole bundle deserializes with every field optional. Missing values fall
//! back to the defaults below.

use serde::{Deserialize, Serialize};

use crate::engine::{AutofillPreferences, RetryPolicy};
use crate::error::{AutofillError, CoreResult};
use crate::matching::DEFAULT_SCORE_THRESHOLD;

/// Session memory bounds for the trigger resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResolverConfig {
    /// Sessions idle longer than this are forgotten (default: 3 minutes)
    #[serde(default = "default_session_ttl_ms")]
    pub session_ttl_ms: i64,
    /// Most sessions kept at once (default: 48)
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_session_ttl_ms() -> i64 {
    3 * 60 * 1000
}

fn default_max_sessions() -> usize {
    48
}

impl Default for TriggerResolverConfig {
    fn default() -> Self {
        Self {
            session_ttl_ms: default_session_ttl_ms(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// Cycle memory bounds for the direct-entry mode resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectEntryConfig {
    /// Cycles idle longer than this start over (default: 10 minutes)
    #[serde(default = "default_cycle_ttl_ms")]
    pub cycle_ttl_ms: i64,
    /// Most cycles kept at once (default: 128)
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

fn default_cycle_ttl_ms() -> i64 {
    10 * 60 * 1000
}

fn default_max_size() -> usize {
    128
}

impl Default for DirectEntryConfig {
    fn default() -> Self {
        Self {
            cycle_ttl_ms: default_cycle_ttl_ms(),
            max_size: default_max_size(),
        }
    }
}

/// Everything a host can tune, in one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub preferences: AutofillPreferences,
    #[serde(default)]
    pub trigger: TriggerResolverConfig,
    #[serde(default)]
    pub direct_entry: DirectEntryConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Matches scoring below this are never offered (default: 60)
    #[serde(default = "default_score_threshold")]
    pub score_threshold: u8,
}

fn default_score_threshold() -> u8 {
    DEFAULT_SCORE_THRESHOLD
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            preferences: AutofillPreferences::default(),
            trigger: TriggerResolverConfig::default(),
            direct_entry: DirectEntryConfig::default(),
            retry: RetryPolicy::default(),
            score_threshold: default_score_threshold(),
        }
    }
}

impl CoreConfig {
    /// Parse a JSON config document and check it for values the core cannot
    /// work with.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let config: CoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.score_threshold > 100 {
            return Err(AutofillError::Configuration(format!(
                "score_threshold must be within 0-100, got {}",
                self.score_threshold
            )));
        }
        if self.trigger.session_ttl_ms < 0 || self.direct_entry.cycle_ttl_ms < 0 {
            return Err(AutofillError::Configuration(
                "cache TTLs must not be negative".to_string(),
            ));
        }
        if self.preferences.timeout_ms == 0 {
            return Err(AutofillError::Configuration(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = CoreConfig::from_json("{}").unwrap();

        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.trigger.session_ttl_ms, 180_000);
        assert_eq!(config.trigger.max_sessions, 48);
        assert_eq!(config.direct_entry.cycle_ttl_ms, 600_000);
        assert_eq!(config.direct_entry.max_size, 128);
        assert_eq!(config.retry.retry_count, 1);
        assert_eq!(config.retry.retry_delay_ms, 100);
        assert_eq!(config.score_threshold, 60);
        assert_eq!(config.preferences.max_suggestions, 5);
        assert_eq!(config.preferences.timeout_ms, 5_000);
    }

    #[test]
    fn test_partial_sections_keep_remaining_defaults() {
        let json = r#"{
            "preferences": { "max_suggestions": 3, "enable_fuzzy_search": false },
            "direct_entry": { "max_size": 64 }
        }"#;
        let config = CoreConfig::from_json(json).unwrap();

        assert_eq!(config.preferences.max_suggestions, 3);
        assert!(!config.preferences.enable_fuzzy_search);
        assert!(config.preferences.enabled);
        assert_eq!(config.direct_entry.max_size, 64);
        assert_eq!(config.direct_entry.cycle_ttl_ms, 600_000);
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        let err = CoreConfig::from_json(r#"{"score_threshold": 120}"#).unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");

        let err = CoreConfig::from_json(r#"{"preferences": {"timeout_ms": 0}}"#).unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        let err = CoreConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, AutofillError::Json(_)));
    }

    #[test]
    fn test_round_trip_through_json() {
        let mut config = CoreConfig::default();
        config.trigger.max_sessions = 12;
        let restored = CoreConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(restored, config);
    }
}
