//! Query-prefix suggestions pooled from history, tags and synonyms.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use serde::Serialize;

use crate::config::SuggestConfig;
use crate::history::SearchHistory;
use crate::store::PoseStore;
use crate::synonyms::SynonymTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    History,
    Tag,
    Synonym,
}

impl SuggestionSource {
    /// Lower sorts first when scores tie.
    fn priority(self) -> u8 {
        match self {
            SuggestionSource::History => 0,
            SuggestionSource::Tag => 1,
            SuggestionSource::Synonym => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionCandidate {
    pub text: String,
    #[serde(rename = "type")]
    pub source: SuggestionSource,
    /// Recency or usage weight in [0, 1] before ranking; the final score after.
    pub weight: f32,
}

impl SuggestionCandidate {
    pub fn new(text: impl Into<String>, source: SuggestionSource, weight: f32) -> Self {
        Self {
            text: text.into(),
            source,
            weight,
        }
    }
}

/// Score, filter, deduplicate and order raw candidates for `prefix`.
///
/// Each candidate scores `source weight * candidate weight`; identical text
/// from several sources keeps the best score.
pub fn rank(
    candidates: impl IntoIterator<Item = SuggestionCandidate>,
    prefix: &str,
    limit: usize,
    cfg: &SuggestConfig,
) -> Vec<SuggestionCandidate> {
    let prefix = prefix.trim().to_lowercase();
    if prefix.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut best: HashMap<String, SuggestionCandidate> = HashMap::new();
    for candidate in candidates {
        let text = candidate.text.trim();
        if !text.to_lowercase().starts_with(&prefix) {
            continue;
        }
        let scored = SuggestionCandidate {
            text: text.to_string(),
            source: candidate.source,
            weight: source_weight(cfg, candidate.source) * candidate.weight.clamp(0.0, 1.0),
        };
        match best.get_mut(&scored.text) {
            Some(existing) if compare(&scored, existing) == Ordering::Less => *existing = scored,
            Some(_) => {}
            None => {
                best.insert(scored.text.clone(), scored);
            }
        }
    }

    let mut ranked: Vec<SuggestionCandidate> = best.into_values().collect();
    ranked.sort_by(compare);
    ranked.truncate(limit);
    ranked
}

fn source_weight(cfg: &SuggestConfig, source: SuggestionSource) -> f32 {
    match source {
        SuggestionSource::History => cfg.history_weight,
        SuggestionSource::Tag => cfg.tag_weight,
        SuggestionSource::Synonym => cfg.synonym_weight,
    }
}

fn compare(a: &SuggestionCandidate, b: &SuggestionCandidate) -> Ordering {
    b.weight
        .partial_cmp(&a.weight)
        .unwrap_or(Ordering::Equal)
        .then(a.source.priority().cmp(&b.source.priority()))
        .then_with(|| a.text.cmp(&b.text))
}

/// Sum of half-life decayed hits, capped at 1.
fn recency_weight(timestamps: &[DateTime<Utc>], now: DateTime<Utc>, half_life_days: f64) -> f32 {
    if half_life_days <= 0.0 {
        return 1.0;
    }
    let total: f64 = timestamps
        .iter()
        .map(|at| {
            let age_days = (now - *at).num_seconds().max(0) as f64 / 86_400.0;
            0.5f64.powf(age_days / half_life_days)
        })
        .sum();
    total.min(1.0) as f32
}

pub struct SuggestionRanker {
    cfg: SuggestConfig,
    history: Arc<SearchHistory>,
    store: Arc<dyn PoseStore>,
    synonyms: Arc<SynonymTable>,
}

impl SuggestionRanker {
    pub fn new(
        cfg: SuggestConfig,
        history: Arc<SearchHistory>,
        store: Arc<dyn PoseStore>,
        synonyms: Arc<SynonymTable>,
    ) -> Self {
        Self {
            cfg,
            history,
            store,
            synonyms,
        }
    }

    /// Suggestions for `prefix`. A failing tag lookup only removes that
    /// source.
    pub async fn suggest(&self, prefix: &str, limit: usize) -> Vec<SuggestionCandidate> {
        let limit = limit.min(self.cfg.max_limit);
        if prefix.trim().is_empty() || limit == 0 {
            return Vec::new();
        }
        let now = Utc::now();
        let mut pool: Vec<SuggestionCandidate> = self
            .history
            .occurrences()
            .into_iter()
            .map(|(text, timestamps)| {
                let weight = recency_weight(&timestamps, now, self.cfg.history_half_life_days);
                SuggestionCandidate::new(text, SuggestionSource::History, weight)
            })
            .collect();

        match self.store.tag_usage().await {
            Ok(tags) => {
                let max_usage = tags.iter().map(|t| t.usage_count).max().unwrap_or(0).max(1);
                pool.extend(tags.into_iter().map(|tag| {
                    let weight = tag.usage_count as f32 / max_usage as f32;
                    SuggestionCandidate::new(tag.name, SuggestionSource::Tag, weight)
                }));
            }
            Err(err) => tracing::warn!(error = %err, "tag vocabulary unavailable for suggestions"),
        }

        pool.extend(
            self.synonyms
                .terms()
                .map(|(term, weight)| SuggestionCandidate::new(term, SuggestionSource::Synonym, weight)),
        );
        rank(pool, prefix, limit, &self.cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn history_outranks_tag_for_shared_prefix() {
        let ranked = rank(
            [
                SuggestionCandidate::new("咖啡馆", SuggestionSource::Tag, 1.0),
                SuggestionCandidate::new("咖啡厅拍照", SuggestionSource::History, 1.0),
                SuggestionCandidate::new("户外", SuggestionSource::Tag, 1.0),
            ],
            "咖啡",
            10,
            &SuggestConfig::default(),
        );
        let texts: Vec<&str> = ranked.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["咖啡厅拍照", "咖啡馆"]);
        assert_eq!(ranked[0].source, SuggestionSource::History);
        assert!((ranked[1].weight - 0.8).abs() < 1e-6);
    }

    #[test]
    fn duplicates_keep_best_source() {
        let ranked = rank(
            [
                SuggestionCandidate::new("咖啡馆", SuggestionSource::Synonym, 0.95),
                SuggestionCandidate::new("咖啡馆", SuggestionSource::Tag, 0.5),
            ],
            "咖",
            10,
            &SuggestConfig::default(),
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].source, SuggestionSource::Synonym);
    }

    #[test]
    fn empty_prefix_or_limit_yields_nothing() {
        let pool = [SuggestionCandidate::new("a", SuggestionSource::Tag, 1.0)];
        assert!(rank(pool.clone(), " ", 5, &SuggestConfig::default()).is_empty());
        assert!(rank(pool, "a", 0, &SuggestConfig::default()).is_empty());
    }

    #[test]
    fn recency_decays_by_half_life() {
        let now = Utc::now();
        let week_old = recency_weight(&[now - Duration::days(7)], now, 7.0);
        assert!((week_old - 0.5).abs() < 1e-3);
        let busy = recency_weight(&[now, now, now], now, 7.0);
        assert_eq!(busy, 1.0);
    }
}
