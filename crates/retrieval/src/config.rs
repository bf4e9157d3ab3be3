//! Tuning knobs for every retrieval component.
//!
//! All sections deserialize with defaults so partial configs are valid.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::SearchError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// First pool is `target_count * initial_pool_factor`.
    pub initial_pool_factor: usize,
    pub max_widenings: u32,
    /// Hard cap on candidates requested in one search call.
    pub pool_ceiling: usize,
    pub default_min_similarity: f32,
    /// Mean similarity below this marks an outcome `MARGINAL`.
    pub quality_mean_threshold: f32,
    /// Fewer than `target_count * shortfall_ratio` results marks `MARGINAL`.
    pub shortfall_ratio: f32,
    /// Adaptive floor is `max(min_similarity, mean * adaptive_floor_ratio)`.
    pub adaptive_floor_ratio: f32,
    /// Strict tier floor is `min_similarity + multi_tier_strict_boost`.
    pub multi_tier_strict_boost: f32,
    /// Extra plan/materialize rounds when dead records leave a short result.
    pub max_rematerialize_rounds: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            initial_pool_factor: 2,
            max_widenings: 4,
            pool_ceiling: 400,
            default_min_similarity: 0.3,
            quality_mean_threshold: 0.45,
            shortfall_ratio: 0.5,
            adaptive_floor_ratio: 0.8,
            multi_tier_strict_boost: 0.2,
            max_rematerialize_rounds: 2,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.initial_pool_factor == 0 {
            return Err(SearchError::invalid("initial_pool_factor must be >= 1"));
        }
        if self.pool_ceiling == 0 {
            return Err(SearchError::invalid("pool_ceiling must be >= 1"));
        }
        if !(-1.0..=1.0).contains(&self.default_min_similarity) {
            return Err(SearchError::invalid(
                "default_min_similarity must be within [-1, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.shortfall_ratio)
            || !(0.0..=1.0).contains(&self.adaptive_floor_ratio)
        {
            return Err(SearchError::invalid("ratios must be within [0, 1]"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Single budget for embed + plan + materialize.
    pub vector_timeout_ms: u64,
    pub lexical_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            vector_timeout_ms: 3_000,
            lexical_timeout_ms: 2_000,
        }
    }
}

impl CoordinatorConfig {
    pub fn vector_timeout(&self) -> Duration {
        Duration::from_millis(self.vector_timeout_ms)
    }

    pub fn lexical_timeout(&self) -> Duration {
        Duration::from_millis(self.lexical_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Cached status older than this is considered stale.
    pub ttl_secs: u64,
    /// Consecutive failures before the service is marked unavailable.
    pub failure_threshold: u32,
    pub check_timeout_ms: u64,
    /// Text embedded by the live check.
    pub check_text: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            failure_threshold: 3,
            check_timeout_ms: 2_000,
            check_text: "人像 拍照".into(),
        }
    }
}

impl HealthConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalConfig {
    /// Synonyms below this weight are not used for expansion.
    pub min_synonym_weight: f32,
    pub text_weight: f32,
    pub synonym_weight: f32,
    /// Mean score at or above this is `GOOD`, below is `MARGINAL`.
    pub good_score_threshold: f32,
    /// JSON list of `{term, synonym, weight}` edges; the built-in table
    /// is used when unset.
    pub synonyms_path: Option<PathBuf>,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            min_synonym_weight: 0.5,
            text_weight: 0.7,
            synonym_weight: 0.3,
            good_score_threshold: 0.5,
            synonyms_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestConfig {
    pub history_weight: f32,
    pub tag_weight: f32,
    pub synonym_weight: f32,
    /// Age at which a history entry counts half.
    pub history_half_life_days: f64,
    pub max_limit: usize,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            history_weight: 1.0,
            tag_weight: 0.8,
            synonym_weight: 0.6,
            history_half_life_days: 7.0,
            max_limit: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Oldest entries are evicted beyond this many.
    pub capacity: usize,
    pub popular_window_days: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            popular_window_days: 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_defaults_validate() {
        let cfg = PlannerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_widenings, 4);
        assert_eq!(cfg.initial_pool_factor, 2);
    }

    #[test]
    fn planner_rejects_zero_pool_factor() {
        let cfg = PlannerConfig {
            initial_pool_factor: 0,
            ..Default::default()
        };
        assert!(cfg.validate().unwrap_err().is_invalid_query());
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let cfg: HealthConfig = serde_json::from_str(r#"{"ttl_secs":5}"#).unwrap();
        assert_eq!(cfg.ttl(), Duration::from_secs(5));
        assert_eq!(cfg.failure_threshold, 3);
    }
}
