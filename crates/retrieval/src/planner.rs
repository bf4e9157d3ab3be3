//! Adaptive retrieval planner.
//!
//! Decides how many candidates to pull from the index, which similarity
//! floor to accept and whether to widen the pool. Planning is synchronous
//! and CPU-bound: every widening is one call into the in-memory snapshot, and
//! widenings within a request run strictly in sequence.

use std::cmp::Ordering;

use hashbrown::{HashMap, HashSet};
use index::{CandidateMatch, IndexSnapshot, PoseId};
use tracing::debug;

use crate::config::PlannerConfig;
use crate::types::{mean, score_range, Quality, SearchMode, Tier};
use crate::SearchError;

/// Parameters of one planning call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanRequest {
    /// Results wanted; for paginated plans this is the page size.
    pub target_count: usize,
    pub min_similarity: f32,
    pub mode: SearchMode,
    /// Apply the adaptive floor `max(min_similarity, mean * ratio)`.
    pub adaptive: bool,
    /// Extra candidates to collect beyond what the mode needs, used when
    /// earlier candidates turned out to reference dead records.
    pub padding: usize,
}

impl PlanRequest {
    pub fn new(target_count: usize, min_similarity: f32, mode: SearchMode) -> Self {
        Self {
            target_count,
            min_similarity,
            mode,
            adaptive: false,
            padding: 0,
        }
    }

    pub fn with_adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        if !self.min_similarity.is_finite() || !(-1.0..=1.0).contains(&self.min_similarity) {
            return Err(SearchError::invalid("min_similarity must be within [-1, 1]"));
        }
        match self.mode {
            SearchMode::Paginated { page, page_size } => {
                if page == 0 {
                    return Err(SearchError::invalid("page must be >= 1"));
                }
                if page_size == 0 {
                    return Err(SearchError::invalid("page_size must be >= 1"));
                }
            }
            SearchMode::Dynamic | SearchMode::MultiTier => {
                if self.target_count == 0 {
                    return Err(SearchError::invalid("target_count must be >= 1"));
                }
            }
        }
        Ok(())
    }
}

/// A candidate that survived deduplication and the similarity floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedCandidate {
    pub internal_id: usize,
    pub pose_id: PoseId,
    pub similarity: f32,
    pub tier: Option<Tier>,
}

/// Offset bookkeeping for a paginated plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: usize,
    pub page_size: usize,
    pub offset: usize,
}

impl PageWindow {
    pub(crate) fn new(page: usize, page_size: usize) -> Self {
        Self {
            page,
            page_size,
            offset: (page - 1).saturating_mul(page_size),
        }
    }

    /// Candidates needed to fill this page and know whether another exists.
    pub fn span(&self) -> usize {
        self.offset.saturating_add(self.page_size).saturating_add(1)
    }
}

/// Quality verdict plus the human-readable reason when it is not `GOOD`.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    pub quality: Quality,
    pub warning: Option<String>,
}

/// Output of the planner, before identifiers are resolved to records.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Ranked candidates. For paginated plans this is the whole prefix up to
    /// the end of the page (plus one), not just the page itself.
    pub candidates: Vec<PlannedCandidate>,
    /// Raw candidates examined by the largest search call.
    pub total_considered: usize,
    pub widenings: u32,
    /// True when the index cannot yield more candidates above the floor.
    pub exhausted: bool,
    /// The snapshot's per-search cap, when it cut collection short while
    /// more qualifying rows may exist beyond it.
    pub capped_at: Option<usize>,
    /// Floor actually applied, after any adaptive raise.
    pub floor: f32,
    /// How many results the quality check expects.
    pub expected: usize,
    pub window: Option<PageWindow>,
    pub report: QualityReport,
}

impl Plan {
    fn degraded(expected: usize, window: Option<PageWindow>, floor: f32, reason: &str) -> Self {
        Self {
            candidates: Vec::new(),
            total_considered: 0,
            widenings: 0,
            exhausted: true,
            capped_at: None,
            floor,
            expected,
            window,
            report: QualityReport {
                quality: Quality::Degraded,
                warning: Some(reason.to_string()),
            },
        }
    }

    pub fn quality(&self) -> Quality {
        self.report.quality
    }
}

struct Collected {
    accepted: Vec<PlannedCandidate>,
    considered: usize,
    widenings: u32,
    exhausted: bool,
    capped: bool,
}

#[derive(Debug, Clone)]
pub struct RetrievalPlanner {
    cfg: PlannerConfig,
}

impl RetrievalPlanner {
    pub fn new(cfg: PlannerConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.cfg
    }

    /// Plan one retrieval against `snapshot`.
    ///
    /// An empty `query` (embedder produced nothing) short-circuits to a
    /// `DEGRADED` plan; invalid counts or floors are rejected.
    pub fn plan(
        &self,
        snapshot: &IndexSnapshot,
        query: &[f32],
        req: &PlanRequest,
    ) -> Result<Plan, SearchError> {
        req.validate()?;
        let window = match req.mode {
            SearchMode::Paginated { page, page_size } => Some(PageWindow::new(page, page_size)),
            _ => None,
        };
        let expected = self.expected_count(req);
        if query.is_empty() {
            return Ok(Plan::degraded(
                expected,
                window,
                req.min_similarity,
                "query embedding is empty",
            ));
        }

        let plan = match (req.mode, window) {
            (SearchMode::Paginated { .. }, Some(window)) => {
                self.plan_paginated(snapshot, query, req, window, expected)?
            }
            (SearchMode::MultiTier, _) => self.plan_multi_tier(snapshot, query, req, expected)?,
            _ => self.plan_dynamic(snapshot, query, req, expected)?,
        };
        debug!(
            mode = req.mode.as_str(),
            candidates = plan.candidates.len(),
            considered = plan.total_considered,
            widenings = plan.widenings,
            floor = plan.floor,
            quality = plan.quality().as_str(),
            "planned retrieval"
        );
        Ok(plan)
    }

    /// Results the quality check expects for `req`. Pages after the first
    /// are allowed to be short.
    pub fn expected_count(&self, req: &PlanRequest) -> usize {
        match req.mode {
            SearchMode::Paginated { page: 1, page_size } => page_size,
            SearchMode::Paginated { .. } => 0,
            _ => req.target_count,
        }
    }

    /// Grade a result set: nothing is `DEGRADED`; a low mean or a material
    /// shortfall against `expected` is `MARGINAL`.
    pub fn assess(&self, scores: &[f32], expected: usize) -> QualityReport {
        if scores.is_empty() {
            return QualityReport {
                quality: Quality::Degraded,
                warning: Some("no candidates cleared the similarity floor".into()),
            };
        }
        let avg = mean(scores.iter().copied());
        let (lo, hi) = score_range(scores.iter().copied());
        if avg < self.cfg.quality_mean_threshold {
            return QualityReport {
                quality: Quality::Marginal,
                warning: Some(format!(
                    "low similarity: average {avg:.3} (range {lo:.3}-{hi:.3}) is below {:.2}",
                    self.cfg.quality_mean_threshold
                )),
            };
        }
        if (scores.len() as f32) < expected as f32 * self.cfg.shortfall_ratio {
            return QualityReport {
                quality: Quality::Marginal,
                warning: Some(format!(
                    "only {} of {expected} requested results are relevant",
                    scores.len()
                )),
            };
        }
        QualityReport {
            quality: Quality::Good,
            warning: None,
        }
    }

    fn plan_dynamic(
        &self,
        snapshot: &IndexSnapshot,
        query: &[f32],
        req: &PlanRequest,
        expected: usize,
    ) -> Result<Plan, SearchError> {
        let wanted = req.target_count.saturating_add(req.padding);
        let collected = self.collect(snapshot, query, wanted, req.min_similarity)?;
        let mut accepted = collected.accepted;
        accepted.truncate(wanted);
        let floor = self.apply_adaptive(&mut accepted, req);
        let mut plan = self.finish(accepted, collected.considered, collected.widenings, collected.exhausted, floor, expected, None);
        plan.capped_at = collected.capped.then(|| snapshot.result_cap());
        Ok(plan)
    }

    fn plan_multi_tier(
        &self,
        snapshot: &IndexSnapshot,
        query: &[f32],
        req: &PlanRequest,
        expected: usize,
    ) -> Result<Plan, SearchError> {
        let wanted = req.target_count.saturating_add(req.padding);
        let strict_floor = (req.min_similarity + self.cfg.multi_tier_strict_boost).min(1.0);

        let strict = self.collect(snapshot, query, wanted, strict_floor)?;
        let mut merged: Vec<PlannedCandidate> = strict
            .accepted
            .into_iter()
            .take(wanted)
            .map(|c| PlannedCandidate {
                tier: Some(Tier::Strict),
                ..c
            })
            .collect();
        let mut considered = strict.considered;
        let mut widenings = strict.widenings;
        let mut exhausted = strict.exhausted;
        let mut capped = strict.capped;

        if merged.len() < wanted {
            let relaxed = self.collect(snapshot, query, wanted, req.min_similarity)?;
            let seen: HashSet<PoseId> = merged.iter().map(|c| c.pose_id).collect();
            for candidate in relaxed.accepted {
                if merged.len() >= wanted {
                    break;
                }
                if seen.contains(&candidate.pose_id) {
                    continue;
                }
                let tier = if candidate.similarity >= strict_floor {
                    Tier::Strict
                } else {
                    Tier::Relaxed
                };
                merged.push(PlannedCandidate {
                    tier: Some(tier),
                    ..candidate
                });
            }
            merged.sort_by(compare_candidates);
            considered = considered.max(relaxed.considered);
            widenings += relaxed.widenings;
            exhausted = relaxed.exhausted;
            capped = relaxed.capped;
        }

        let floor = self.apply_adaptive(&mut merged, req);
        let mut plan = self.finish(merged, considered, widenings, exhausted, floor, expected, None);
        plan.capped_at = capped.then(|| snapshot.result_cap());
        Ok(plan)
    }

    fn plan_paginated(
        &self,
        snapshot: &IndexSnapshot,
        query: &[f32],
        req: &PlanRequest,
        window: PageWindow,
        expected: usize,
    ) -> Result<Plan, SearchError> {
        let wanted = window.span().saturating_add(req.padding);
        let cap = snapshot.result_cap();
        let limit = wanted.min(cap);
        let raw = snapshot.search(query, limit)?;
        let considered = raw.len();
        // A short answer only means the index ran dry when the cap did not
        // cut the request.
        let exhausted = raw.len() < limit || raw.last().is_some_and(|c| c.similarity < req.min_similarity);
        let capped_at = (wanted > cap && !exhausted).then_some(cap);
        let mut accepted = accept(snapshot, &raw, req.min_similarity);
        accepted.truncate(wanted);

        if accepted.is_empty() {
            let mut plan = Plan::degraded(expected, Some(window), req.min_similarity, "no candidates cleared the similarity floor");
            plan.total_considered = considered;
            return Ok(plan);
        }

        let page_scores: Vec<f32> = accepted
            .iter()
            .skip(window.offset)
            .take(window.page_size)
            .map(|c| c.similarity)
            .collect();
        let report = if page_scores.is_empty() {
            QualityReport {
                quality: Quality::Marginal,
                warning: Some(past_last_page(window, capped_at)),
            }
        } else {
            self.assess(&page_scores, expected)
        };

        Ok(Plan {
            candidates: accepted,
            total_considered: considered,
            widenings: 0,
            exhausted,
            capped_at,
            floor: req.min_similarity,
            expected,
            window: Some(window),
            report,
        })
    }

    /// Search with a doubling pool until `wanted` candidates clear `floor`,
    /// the index runs dry, scores fall below the floor, or the ceiling or
    /// widening budget is reached.
    fn collect(
        &self,
        snapshot: &IndexSnapshot,
        query: &[f32],
        wanted: usize,
        floor: f32,
    ) -> Result<Collected, SearchError> {
        let cap = snapshot.result_cap().max(1);
        let ceiling = self.cfg.pool_ceiling.max(wanted).min(cap);
        let mut pool = wanted
            .saturating_mul(self.cfg.initial_pool_factor)
            .clamp(1, ceiling);
        let mut widenings = 0;

        loop {
            let raw = snapshot.search(query, pool)?;
            let index_exhausted = raw.len() < pool;
            let below_floor = raw.last().is_some_and(|c| c.similarity < floor);
            let accepted = accept(snapshot, &raw, floor);

            let done = accepted.len() >= wanted
                || index_exhausted
                || below_floor
                || pool >= ceiling
                || widenings >= self.cfg.max_widenings;
            if done {
                let exhausted = index_exhausted || below_floor;
                return Ok(Collected {
                    capped: !exhausted && accepted.len() < wanted && pool >= cap,
                    accepted,
                    considered: raw.len(),
                    widenings,
                    exhausted,
                });
            }

            pool = pool.saturating_mul(2).min(ceiling);
            widenings += 1;
            debug!(
                accepted = accepted.len(),
                wanted,
                next_pool = pool,
                widenings,
                "widening candidate pool"
            );
        }
    }

    fn apply_adaptive(&self, accepted: &mut Vec<PlannedCandidate>, req: &PlanRequest) -> f32 {
        if !req.adaptive || accepted.is_empty() {
            return req.min_similarity;
        }
        let avg = mean(accepted.iter().map(|c| c.similarity));
        let floor = req.min_similarity.max(avg * self.cfg.adaptive_floor_ratio);
        accepted.retain(|c| c.similarity >= floor);
        floor
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        candidates: Vec<PlannedCandidate>,
        considered: usize,
        widenings: u32,
        exhausted: bool,
        floor: f32,
        expected: usize,
        window: Option<PageWindow>,
    ) -> Plan {
        let scores: Vec<f32> = candidates.iter().map(|c| c.similarity).collect();
        let report = self.assess(&scores, expected);
        Plan {
            candidates,
            total_considered: considered,
            widenings,
            exhausted,
            capped_at: None,
            floor,
            expected,
            window,
            report,
        }
    }
}

/// Warning for a page that starts after the last reachable result.
pub(crate) fn past_last_page(window: PageWindow, capped_at: Option<usize>) -> String {
    match capped_at {
        Some(cap) => format!(
            "page {} starts beyond the first {cap} ranked results, which is as deep as paging goes; narrow the query",
            window.page
        ),
        None => format!("page {} is past the last result", window.page),
    }
}

impl Default for RetrievalPlanner {
    fn default() -> Self {
        Self::new(PlannerConfig::default())
    }
}

/// Resolve, deduplicate (highest score wins) and floor-filter raw hits.
fn accept(snapshot: &IndexSnapshot, raw: &[CandidateMatch], floor: f32) -> Vec<PlannedCandidate> {
    let mut best: HashMap<PoseId, PlannedCandidate> = HashMap::with_capacity(raw.len());
    for hit in raw {
        if !hit.similarity.is_finite() || hit.similarity < floor {
            continue;
        }
        let Some(pose_id) = snapshot.pose_id(hit.internal_id) else {
            continue;
        };
        let candidate = PlannedCandidate {
            internal_id: hit.internal_id,
            pose_id,
            similarity: hit.similarity,
            tier: None,
        };
        best.entry(pose_id)
            .and_modify(|existing| {
                if candidate.similarity > existing.similarity {
                    *existing = candidate;
                }
            })
            .or_insert(candidate);
    }
    let mut accepted: Vec<PlannedCandidate> = best.into_values().collect();
    accepted.sort_by(compare_candidates);
    accepted
}

fn compare_candidates(a: &PlannedCandidate, b: &PlannedCandidate) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then(a.internal_id.cmp(&b.internal_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use index::ann::AnnConfig;

    /// Rows whose similarity to `[1, 0]` is exactly `1 - i / n`-ish and
    /// strictly decreasing with the row number.
    fn fan(n: usize) -> IndexSnapshot {
        let rows = (0..n).map(|i| {
            let angle = (i as f32 / n as f32) * std::f32::consts::FRAC_PI_2 * 1.9;
            (i as PoseId + 100, vec![angle.cos(), angle.sin()])
        });
        IndexSnapshot::build(2, rows, AnnConfig::default()).unwrap()
    }

    const QUERY: [f32; 2] = [1.0, 0.0];

    #[test]
    fn dynamic_returns_target_sorted() {
        let snapshot = fan(200);
        let planner = RetrievalPlanner::default();
        let plan = planner
            .plan(&snapshot, &QUERY, &PlanRequest::new(20, 0.3, SearchMode::Dynamic))
            .unwrap();

        assert_eq!(plan.candidates.len(), 20);
        assert!(plan
            .candidates
            .windows(2)
            .all(|w| w[0].similarity >= w[1].similarity));
        assert_eq!(plan.quality(), Quality::Good);
        assert_eq!(plan.widenings, 0);
    }

    #[test]
    fn dynamic_widens_until_target_reached() {
        // Duplicate pose ids halve the useful candidates per call.
        let rows = (0..200).map(|i| {
            let angle = i as f32 * 0.001;
            ((i / 4) as PoseId, vec![angle.cos(), angle.sin()])
        });
        let snapshot = IndexSnapshot::build(2, rows, AnnConfig::default()).unwrap();
        let plan = RetrievalPlanner::default()
            .plan(&snapshot, &QUERY, &PlanRequest::new(10, 0.3, SearchMode::Dynamic))
            .unwrap();

        assert_eq!(plan.candidates.len(), 10);
        assert!(plan.widenings >= 1);
        let ids: HashSet<PoseId> = plan.candidates.iter().map(|c| c.pose_id).collect();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn widening_stops_at_budget() {
        let cfg = PlannerConfig {
            max_widenings: 1,
            ..Default::default()
        };
        let rows = (0..100).map(|i| (7, vec![1.0, i as f32 * 0.001]));
        let snapshot = IndexSnapshot::build(2, rows, AnnConfig::default()).unwrap();
        let plan = RetrievalPlanner::new(cfg)
            .plan(&snapshot, &QUERY, &PlanRequest::new(5, 0.3, SearchMode::Dynamic))
            .unwrap();

        assert_eq!(plan.widenings, 1);
        assert_eq!(plan.candidates.len(), 1);
        assert_eq!(plan.quality(), Quality::Marginal);
    }

    #[test]
    fn stops_when_scores_fall_below_floor() {
        let snapshot = fan(200);
        let plan = RetrievalPlanner::default()
            .plan(&snapshot, &QUERY, &PlanRequest::new(150, 0.9, SearchMode::Dynamic))
            .unwrap();

        assert!(plan.exhausted);
        assert_eq!(plan.widenings, 0);
        assert!(plan.candidates.iter().all(|c| c.similarity >= 0.9));
        assert_eq!(plan.quality(), Quality::Marginal);
    }

    #[test]
    fn duplicate_internal_ids_keep_highest_score() {
        let snapshot = fan(10);
        let raw = vec![
            CandidateMatch { internal_id: 3, similarity: 0.5 },
            CandidateMatch { internal_id: 3, similarity: 0.8 },
            CandidateMatch { internal_id: 1, similarity: 0.6 },
        ];
        let accepted = accept(&snapshot, &raw, 0.0);
        assert_eq!(accepted.len(), 2);
        assert_eq!(accepted[0].internal_id, 3);
        assert!((accepted[0].similarity - 0.8).abs() < 1e-6);
    }

    #[test]
    fn empty_vector_is_degraded() {
        let plan = RetrievalPlanner::default()
            .plan(&fan(10), &[], &PlanRequest::new(5, 0.3, SearchMode::Dynamic))
            .unwrap();
        assert_eq!(plan.quality(), Quality::Degraded);
        assert!(plan.candidates.is_empty());
    }

    #[test]
    fn non_positive_target_is_invalid() {
        let err = RetrievalPlanner::default()
            .plan(&fan(10), &QUERY, &PlanRequest::new(0, 0.3, SearchMode::Dynamic))
            .unwrap_err();
        assert!(err.is_invalid_query());

        let err = RetrievalPlanner::default()
            .plan(
                &fan(10),
                &QUERY,
                &PlanRequest::new(1, 0.3, SearchMode::Paginated { page: 0, page_size: 10 }),
            )
            .unwrap_err();
        assert!(err.is_invalid_query());
    }

    #[test]
    fn nothing_above_floor_is_degraded() {
        let plan = RetrievalPlanner::default()
            .plan(&fan(50), &[0.0, -1.0], &PlanRequest::new(5, 0.3, SearchMode::Dynamic))
            .unwrap();
        assert_eq!(plan.quality(), Quality::Degraded);
    }

    #[test]
    fn paginated_pages_match_dynamic_prefix() {
        let snapshot = fan(200);
        let planner = RetrievalPlanner::default();
        let dynamic = planner
            .plan(&snapshot, &QUERY, &PlanRequest::new(20, 0.3, SearchMode::Dynamic))
            .unwrap();

        let page = |n| {
            let plan = planner
                .plan(
                    &snapshot,
                    &QUERY,
                    &PlanRequest::new(10, 0.3, SearchMode::Paginated { page: n, page_size: 10 }),
                )
                .unwrap();
            let window = plan.window.unwrap();
            plan.candidates
                .iter()
                .skip(window.offset)
                .take(window.page_size)
                .map(|c| c.pose_id)
                .collect::<Vec<_>>()
        };
        let mut both = page(1);
        both.extend(page(2));
        let expected: Vec<PoseId> = dynamic.candidates.iter().map(|c| c.pose_id).collect();
        assert_eq!(both, expected);
    }

    #[test]
    fn page_past_the_end_is_marginal_not_degraded() {
        let plan = RetrievalPlanner::default()
            .plan(
                &fan(30),
                &QUERY,
                &PlanRequest::new(10, 0.3, SearchMode::Paginated { page: 9, page_size: 10 }),
            )
            .unwrap();
        assert_eq!(plan.quality(), Quality::Marginal);
        assert!(plan.exhausted);
        assert_eq!(plan.capped_at, None);
    }

    #[test]
    fn result_cap_is_not_mistaken_for_the_end_of_the_index() {
        let rows = (0..80).map(|i| (i as PoseId, vec![1.0, i as f32 * 0.001]));
        let snapshot =
            IndexSnapshot::build(2, rows, AnnConfig::default().with_max_results(50)).unwrap();
        let planner = RetrievalPlanner::default();
        let page = |n| {
            planner
                .plan(
                    &snapshot,
                    &QUERY,
                    &PlanRequest::new(10, 0.3, SearchMode::Paginated { page: n, page_size: 10 }),
                )
                .unwrap()
        };

        let early = page(2);
        assert_eq!(early.capped_at, None);
        assert!(!early.exhausted);

        let last_reachable = page(5);
        assert_eq!(last_reachable.candidates.len(), 50);
        assert!(!last_reachable.exhausted);
        assert_eq!(last_reachable.capped_at, Some(50));
        assert_eq!(last_reachable.quality(), Quality::Good);

        let beyond = page(7);
        assert!(!beyond.exhausted);
        assert_eq!(beyond.capped_at, Some(50));
        assert_eq!(beyond.quality(), Quality::Marginal);
        let warning = beyond.report.warning.unwrap();
        assert!(warning.contains("first 50"), "{warning}");
    }

    #[test]
    fn dynamic_collection_stops_at_result_cap() {
        let rows = (0..80).map(|i| (i as PoseId, vec![1.0, i as f32 * 0.001]));
        let snapshot =
            IndexSnapshot::build(2, rows, AnnConfig::default().with_max_results(5)).unwrap();
        let plan = RetrievalPlanner::default()
            .plan(&snapshot, &QUERY, &PlanRequest::new(10, 0.3, SearchMode::Dynamic))
            .unwrap();

        assert_eq!(plan.candidates.len(), 5);
        assert!(!plan.exhausted);
        assert_eq!(plan.capped_at, Some(5));
        assert_eq!(plan.widenings, 0);
    }

    #[test]
    fn multi_tier_marks_strict_then_relaxed() {
        let snapshot = fan(200);
        let plan = RetrievalPlanner::default()
            .plan(&snapshot, &QUERY, &PlanRequest::new(150, 0.3, SearchMode::MultiTier))
            .unwrap();

        let strict = plan
            .candidates
            .iter()
            .filter(|c| c.tier == Some(Tier::Strict))
            .count();
        let relaxed = plan
            .candidates
            .iter()
            .filter(|c| c.tier == Some(Tier::Relaxed))
            .count();
        assert!(strict > 0);
        assert!(relaxed > 0);
        let first_relaxed = plan
            .candidates
            .iter()
            .position(|c| c.tier == Some(Tier::Relaxed))
            .unwrap();
        assert!(plan.candidates[..first_relaxed]
            .iter()
            .all(|c| c.tier == Some(Tier::Strict)));
        assert!(plan.candidates[first_relaxed..]
            .iter()
            .all(|c| c.similarity < 0.5 && c.similarity >= 0.3));
    }

    #[test]
    fn adaptive_floor_raises_threshold() {
        let snapshot = fan(200);
        let req = PlanRequest::new(150, 0.0, SearchMode::Dynamic).with_adaptive(true);
        let plan = RetrievalPlanner::default()
            .plan(&snapshot, &QUERY, &req)
            .unwrap();
        assert!(plan.floor > 0.0);
        assert!(plan.candidates.iter().all(|c| c.similarity >= plan.floor));
    }

    #[test]
    fn assess_grades_mean_and_shortfall() {
        let planner = RetrievalPlanner::default();
        assert_eq!(planner.assess(&[0.9, 0.8], 2).quality, Quality::Good);
        assert_eq!(planner.assess(&[0.35, 0.4], 2).quality, Quality::Marginal);
        assert_eq!(planner.assess(&[0.9], 10).quality, Quality::Marginal);
        assert_eq!(planner.assess(&[], 10).quality, Quality::Degraded);
    }
}
