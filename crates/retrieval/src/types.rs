use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use index::PoseId;

/// Publication state of a pose; only `Active` poses are ever returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseStatus {
    Pending,
    #[default]
    Active,
    Hidden,
}

/// The fields of a pose the retrieval engine reads and returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub id: PoseId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub oss_url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub scene_category: Option<String>,
    #[serde(default)]
    pub angle: Option<String>,
    #[serde(default)]
    pub props: Vec<String>,
    #[serde(default)]
    pub shooting_tips: Option<String>,
    /// Tags assigned by the offline vision tagger.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub search_count: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: PoseStatus,
}

impl PoseRecord {
    pub fn is_live(&self) -> bool {
        self.status == PoseStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quality {
    Good,
    Marginal,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModeUsed {
    Vector,
    Lexical,
}

impl ModeUsed {
    pub fn as_str(self) -> &'static str {
        match self {
            ModeUsed::Vector => "vector",
            ModeUsed::Lexical => "lexical",
        }
    }
}

impl Quality {
    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Good => "good",
            Quality::Marginal => "marginal",
            Quality::Degraded => "degraded",
        }
    }
}

/// Which floor of a multi-tier search admitted a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Strict,
    Relaxed,
}

/// Retrieval strategy, dispatched by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchMode {
    /// Widen the candidate pool until `target_count` results clear the floor.
    #[default]
    Dynamic,
    /// Fixed 1-based page window; never widens.
    Paginated { page: usize, page_size: usize },
    /// Strict floor first, then a relaxed floor, merged with tier marks.
    MultiTier,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Dynamic => "dynamic",
            SearchMode::Paginated { .. } => "paginated",
            SearchMode::MultiTier => "multi_tier",
        }
    }
}

/// One ranked, materialized result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub pose_id: PoseId,
    /// Cosine similarity for vector results, blended match score for lexical ones.
    pub similarity: f32,
    /// 1-based position in the returned sequence.
    pub rank: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    pub pose: PoseRecord,
}

/// Page bookkeeping for paginated outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub page: usize,
    pub page_size: usize,
    /// Results known to exist up to and including this page.
    pub total: usize,
    pub has_more: bool,
}

/// The only value callers ever get back from a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub total_considered: usize,
    pub quality: Quality,
    pub mode_used: ModeUsed,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<PageInfo>,
}

impl SearchOutcome {
    /// Terminal outcome when every strategy failed.
    pub fn empty(explanation: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            total_considered: 0,
            quality: Quality::Degraded,
            mode_used: ModeUsed::Lexical,
            elapsed_ms: 0,
            explanation: Some(explanation.into()),
            page: None,
        }
    }

    pub fn avg_similarity(&self) -> f32 {
        mean(self.results.iter().map(|r| r.similarity))
    }

    /// `(min, max)` of the returned scores, `(0, 0)` when empty.
    pub fn similarity_range(&self) -> (f32, f32) {
        score_range(self.results.iter().map(|r| r.similarity))
    }

    pub fn pose_ids(&self) -> Vec<PoseId> {
        self.results.iter().map(|r| r.pose_id).collect()
    }
}

pub(crate) fn mean(scores: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = scores.fold((0.0f32, 0usize), |(s, c), x| (s + x, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

pub(crate) fn score_range(scores: impl Iterator<Item = f32>) -> (f32, f32) {
    scores
        .fold(None, |acc: Option<(f32, f32)>, x| match acc {
            None => Some((x, x)),
            Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
        })
        .unwrap_or((0.0, 0.0))
}

/// Re-number ranks after reordering or slicing.
pub(crate) fn renumber(results: &mut [SearchResult]) {
    for (position, result) in results.iter_mut().enumerate() {
        result.rank = position + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_serializes_with_tag() {
        let json = serde_json::to_value(SearchMode::Paginated {
            page: 2,
            page_size: 10,
        })
        .unwrap();
        assert_eq!(json["type"], "paginated");
        assert_eq!(json["page"], 2);
    }

    #[test]
    fn quality_uses_upper_case_names() {
        assert_eq!(serde_json::to_value(Quality::Marginal).unwrap(), "MARGINAL");
        assert_eq!(serde_json::to_value(ModeUsed::Lexical).unwrap(), "LEXICAL");
    }

    #[test]
    fn empty_outcome_is_degraded_lexical_with_explanation() {
        let outcome = SearchOutcome::empty("nothing worked");
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.quality, Quality::Degraded);
        assert_eq!(outcome.mode_used, ModeUsed::Lexical);
        assert_eq!(outcome.explanation.as_deref(), Some("nothing worked"));
        assert_eq!(outcome.similarity_range(), (0.0, 0.0));
    }

    #[test]
    fn range_and_mean() {
        let scores = [0.5f32, 0.9, 0.7];
        assert!((mean(scores.iter().copied()) - 0.7).abs() < 1e-6);
        assert_eq!(score_range(scores.iter().copied()), (0.5, 0.9));
    }

    #[test]
    fn pose_record_defaults_to_active() {
        let record: PoseRecord = serde_json::from_str(
            r#"{"id":1,"title":"窗边","oss_url":"oss://1.jpg","created_at":"2024-05-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(record.is_live());
        assert!(record.tags.is_empty());
    }
}
