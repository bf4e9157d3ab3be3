//! Lexical fallback search.
//!
//! Terminal strategy of the coordinator: a synonym-expanded substring scan
//! over the live pose catalog. It never reports `DEGRADED`.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use hashbrown::HashSet;

use crate::config::LexicalConfig;
use crate::store::PoseStore;
use crate::synonyms::SynonymTable;
use crate::types::{mean, ModeUsed, PoseRecord, Quality, SearchOutcome, SearchResult};
use crate::SearchError;

const TITLE_WEIGHT: f32 = 1.0;
const KEYWORD_WEIGHT: f32 = 0.8;
const BODY_WEIGHT: f32 = 0.5;

/// Lowercase, drop punctuation and collapse whitespace.
///
/// Punctuation becomes a separator so `咖啡厅，拍照` splits into two tokens.
pub fn normalize_query(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One alternative spelling of a concept with its confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedTerm {
    pub text: String,
    pub weight: f32,
}

/// A query concept and every term that may stand for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Concept {
    pub label: String,
    pub terms: Vec<WeightedTerm>,
}

/// Expanded form of a normalized query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryExpansion {
    pub concepts: Vec<Concept>,
}

impl QueryExpansion {
    /// Union of all expanded terms.
    pub fn terms(&self) -> impl Iterator<Item = &WeightedTerm> {
        self.concepts.iter().flat_map(|c| c.terms.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }
}

/// Searchable text of one pose, lowercased once per scan.
struct PoseText<'a> {
    pose: &'a PoseRecord,
    title: String,
    keywords: Vec<String>,
    body: String,
}

impl<'a> PoseText<'a> {
    fn new(pose: &'a PoseRecord) -> Self {
        let mut keywords: Vec<String> = pose.tags.iter().map(|t| t.to_lowercase()).collect();
        keywords.extend(pose.props.iter().map(|p| p.to_lowercase()));
        keywords.extend(pose.scene_category.iter().map(|c| c.to_lowercase()));
        keywords.extend(pose.angle.iter().map(|a| a.to_lowercase()));

        let mut body = String::new();
        for part in [&pose.description, &pose.shooting_tips].into_iter().flatten() {
            body.push_str(&part.to_lowercase());
            body.push('\n');
        }
        Self {
            pose,
            title: pose.title.to_lowercase(),
            keywords,
            body,
        }
    }

    fn field_strength(&self, term: &str) -> f32 {
        if self.title.contains(term) {
            TITLE_WEIGHT
        } else if self.keywords.iter().any(|k| k.contains(term)) {
            KEYWORD_WEIGHT
        } else if self.body.contains(term) {
            BODY_WEIGHT
        } else {
            0.0
        }
    }
}

#[derive(Clone)]
pub struct LexicalSearcher {
    cfg: LexicalConfig,
    synonyms: Arc<SynonymTable>,
    store: Arc<dyn PoseStore>,
}

impl LexicalSearcher {
    pub fn new(cfg: LexicalConfig, synonyms: Arc<SynonymTable>, store: Arc<dyn PoseStore>) -> Self {
        Self {
            cfg,
            synonyms,
            store,
        }
    }

    pub fn synonyms(&self) -> &SynonymTable {
        &self.synonyms
    }

    /// Split `normalized` into concepts and expand each one with synonyms.
    ///
    /// Whitespace tokens containing CJK text are segmented greedily by the
    /// longest term from `vocabulary` or the synonym table.
    pub fn expand(&self, normalized: &str, vocabulary: &HashSet<String>) -> QueryExpansion {
        let longest = vocabulary
            .iter()
            .map(String::as_str)
            .chain(self.synonyms.terms().map(|(t, _)| t))
            .map(|t| t.chars().count())
            .max()
            .unwrap_or(1);
        let known = |candidate: &str| vocabulary.contains(candidate) || self.synonyms.contains(candidate);

        let mut seen: HashSet<String> = HashSet::new();
        let mut concepts = Vec::new();
        for token in normalized.split_whitespace() {
            for label in segment(token, longest, &known) {
                if !seen.insert(label.clone()) {
                    continue;
                }
                let mut terms = vec![WeightedTerm {
                    text: label.clone(),
                    weight: 1.0,
                }];
                terms.extend(
                    self.synonyms
                        .expand(&label, self.cfg.min_synonym_weight)
                        .into_iter()
                        .map(|(text, weight)| WeightedTerm {
                            text: text.to_string(),
                            weight,
                        }),
                );
                concepts.push(Concept { label, terms });
            }
        }
        QueryExpansion { concepts }
    }

    /// Rank live poses against `query`, optionally within one scene category.
    pub async fn search(
        &self,
        query: &str,
        category: Option<&str>,
        limit: usize,
    ) -> Result<SearchOutcome, SearchError> {
        let started = Instant::now();
        if limit == 0 {
            return Err(SearchError::invalid("limit must be >= 1"));
        }
        let normalized = normalize_query(query);
        if normalized.is_empty() {
            return Err(SearchError::invalid("query is empty after normalization"));
        }
        let category = category
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty());

        let poses = self.store.all_active().await?;
        let vocabulary = vocabulary_of(&poses);
        let expansion = self.expand(&normalized, &vocabulary);

        let mut scored: Vec<(f32, &PoseRecord)> = poses
            .iter()
            .filter(|pose| match &category {
                Some(wanted) => pose
                    .scene_category
                    .as_deref()
                    .is_some_and(|c| c.to_lowercase() == *wanted),
                None => true,
            })
            .filter_map(|pose| {
                let text = PoseText::new(pose);
                self.score(&text, &expansion).map(|score| (score, text.pose))
            })
            .collect();
        let matched = scored.len();
        scored.sort_by(|a, b| compare_scored(a, b));
        scored.truncate(limit);

        let results: Vec<SearchResult> = scored
            .into_iter()
            .enumerate()
            .map(|(position, (score, pose))| SearchResult {
                pose_id: pose.id,
                similarity: score,
                rank: position + 1,
                tier: None,
                pose: pose.clone(),
            })
            .collect();

        let (quality, explanation) = if results.is_empty() {
            (
                Quality::Marginal,
                Some(format!("no poses matched \"{normalized}\"")),
            )
        } else if mean(results.iter().map(|r| r.similarity)) >= self.cfg.good_score_threshold {
            (Quality::Good, None)
        } else {
            (Quality::Marginal, None)
        };

        tracing::debug!(
            query = %normalized,
            concepts = expansion.concepts.len(),
            matched,
            returned = results.len(),
            "lexical search"
        );
        Ok(SearchOutcome {
            results,
            total_considered: matched,
            quality,
            mode_used: ModeUsed::Lexical,
            elapsed_ms: started.elapsed().as_millis() as u64,
            explanation,
            page: None,
        })
    }

    /// Blend of concept coverage and synonym confidence, `None` when no
    /// concept matched at all.
    fn score(&self, text: &PoseText<'_>, expansion: &QueryExpansion) -> Option<f32> {
        if expansion.is_empty() {
            return None;
        }
        let mut coverage = 0.0f32;
        let mut confidences = Vec::with_capacity(expansion.concepts.len());
        for concept in &expansion.concepts {
            let best = concept
                .terms
                .iter()
                .map(|term| (text.field_strength(&term.text) * term.weight, term.weight))
                .filter(|(strength, _)| *strength > 0.0)
                .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
            if let Some((strength, confidence)) = best {
                coverage += strength;
                confidences.push(confidence);
            }
        }
        if confidences.is_empty() {
            return None;
        }
        let text_strength = coverage / expansion.concepts.len() as f32;
        let synonym_strength = mean(confidences.into_iter());
        Some(self.cfg.text_weight * text_strength + self.cfg.synonym_weight * synonym_strength)
    }
}

/// Score desc, then views desc, then newest, then id for a total order.
fn compare_scored(a: &(f32, &PoseRecord), b: &(f32, &PoseRecord)) -> Ordering {
    b.0.partial_cmp(&a.0)
        .unwrap_or(Ordering::Equal)
        .then(b.1.view_count.cmp(&a.1.view_count))
        .then(b.1.created_at.cmp(&a.1.created_at))
        .then(a.1.id.cmp(&b.1.id))
}

fn vocabulary_of(poses: &[PoseRecord]) -> HashSet<String> {
    let mut vocabulary = HashSet::new();
    for pose in poses {
        for word in pose
            .tags
            .iter()
            .chain(pose.props.iter())
            .chain(pose.scene_category.iter())
            .chain(pose.angle.iter())
        {
            let word = word.trim().to_lowercase();
            if !word.is_empty() {
                vocabulary.insert(word);
            }
        }
    }
    vocabulary
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32, 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0x20000..=0x2A6DF)
}

/// Greedy longest-match segmentation of one token. Runs of unknown text
/// become their own segments; a lone unknown character between known terms
/// is dropped as noise.
fn segment(token: &str, longest: usize, known: &impl Fn(&str) -> bool) -> Vec<String> {
    if !token.chars().any(is_cjk) {
        return vec![token.to_string()];
    }
    let chars: Vec<char> = token.chars().collect();
    let mut segments = Vec::new();
    let mut pending = String::new();
    let mut matched_any = false;
    let mut i = 0;

    while i < chars.len() {
        let max_len = longest.min(chars.len() - i);
        let hit = (1..=max_len).rev().find_map(|len| {
            let candidate: String = chars[i..i + len].iter().collect();
            known(&candidate).then_some((candidate, len))
        });
        match hit {
            Some((term, len)) => {
                flush(&mut pending, &mut segments);
                segments.push(term);
                matched_any = true;
                i += len;
            }
            None => {
                pending.push(chars[i]);
                i += 1;
            }
        }
    }
    flush(&mut pending, &mut segments);

    if !matched_any {
        return vec![token.to_string()];
    }
    segments
}

fn flush(pending: &mut String, segments: &mut Vec<String>) {
    if pending.chars().count() > 1 {
        segments.push(std::mem::take(pending));
    } else {
        pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryPoseStore;
    use crate::types::{PoseId, PoseStatus};
    use chrono::{TimeZone, Utc};

    fn pose(id: PoseId, title: &str, category: &str, tags: &[&str], views: u64) -> PoseRecord {
        PoseRecord {
            id,
            title: title.to_string(),
            description: None,
            oss_url: format!("oss://poses/{id}.jpg"),
            thumbnail_url: None,
            scene_category: Some(category.to_string()),
            angle: None,
            props: Vec::new(),
            shooting_tips: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            view_count: views,
            search_count: 0,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            status: PoseStatus::Active,
        }
    }

    fn searcher(poses: Vec<PoseRecord>) -> LexicalSearcher {
        LexicalSearcher::new(
            LexicalConfig::default(),
            Arc::new(SynonymTable::builtin()),
            Arc::new(InMemoryPoseStore::from_records(poses)),
        )
    }

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize_query("  Coffee，咖啡厅!!  拍照 "), "coffee 咖啡厅 拍照");
        assert_eq!(normalize_query("?!"), "");
    }

    #[test]
    fn segment_splits_on_known_terms() {
        let known = |t: &str| matches!(t, "咖啡厅" | "拍照" | "咖啡");
        assert_eq!(segment("咖啡厅拍照", 3, &known), vec!["咖啡厅", "拍照"]);
        assert_eq!(segment("窗边的咖啡", 3, &known), vec!["窗边的", "咖啡"]);
        assert_eq!(segment("海边", 3, &known), vec!["海边"]);
        assert_eq!(segment("coffee", 3, &known), vec!["coffee"]);
    }

    #[test]
    fn expansion_adds_synonyms_above_minimum() {
        let s = searcher(Vec::new());
        let expansion = s.expand("咖啡厅拍照", &HashSet::new());
        let labels: Vec<&str> = expansion.concepts.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["咖啡厅", "拍照"]);
        let cafe: Vec<&str> = expansion.concepts[0].terms.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(cafe, vec!["咖啡厅", "咖啡馆", "咖啡店"]);
    }

    #[tokio::test]
    async fn synonym_match_ranks_below_direct_match() {
        let s = searcher(vec![
            pose(1, "咖啡馆窗边", "咖啡厅", &[], 0),
            pose(2, "咖啡厅看书", "室内", &[], 0),
            pose(3, "海边奔跑", "户外", &[], 0),
        ]);
        let outcome = s.search("咖啡厅", None, 10).await.unwrap();
        // pose 1 matches through its category as well as the title synonym.
        assert_eq!(outcome.pose_ids(), vec![2, 1]);
        assert_eq!(outcome.mode_used, ModeUsed::Lexical);
        assert!(outcome.results[0].similarity > outcome.results[1].similarity);
    }

    #[tokio::test]
    async fn ties_break_by_views_then_recency() {
        let mut older = pose(5, "户外站姿", "户外", &[], 10);
        older.created_at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let s = searcher(vec![
            older,
            pose(6, "户外站姿", "户外", &[], 10),
            pose(7, "户外站姿", "户外", &[], 50),
        ]);
        let outcome = s.search("户外站姿", None, 10).await.unwrap();
        assert_eq!(outcome.pose_ids(), vec![7, 6, 5]);
    }

    #[tokio::test]
    async fn category_filter_restricts_results() {
        let s = searcher(vec![
            pose(1, "坐姿", "咖啡厅", &[], 0),
            pose(2, "坐姿", "户外", &[], 0),
        ]);
        let outcome = s.search("坐姿", Some("户外"), 10).await.unwrap();
        assert_eq!(outcome.pose_ids(), vec![2]);
    }

    #[tokio::test]
    async fn tags_match_as_substrings() {
        let s = searcher(vec![pose(1, "无题", "室内", &["复古风格"], 0)]);
        let outcome = s.search("复古", None, 10).await.unwrap();
        assert_eq!(outcome.pose_ids(), vec![1]);
    }

    #[tokio::test]
    async fn no_match_is_marginal_with_explanation() {
        let s = searcher(vec![pose(1, "海边", "户外", &[], 0)]);
        let outcome = s.search("雪山", None, 10).await.unwrap();
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.quality, Quality::Marginal);
        assert!(outcome.explanation.is_some());
    }

    #[tokio::test]
    async fn punctuation_only_query_is_invalid() {
        let s = searcher(Vec::new());
        assert!(s.search("？！", None, 10).await.unwrap_err().is_invalid_query());
        assert!(s.search("咖啡", None, 0).await.unwrap_err().is_invalid_query());
    }
}
