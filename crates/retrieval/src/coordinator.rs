//! Degradation coordinator.
//!
//! Each search walks an explicit state machine:
//!
//! ```text
//! Start -> HealthCheck -> VectorAttempt -> Materialize -> Done
//!                      \              \              \
//!                       LexicalOnly    RetryLexical <--+-> Done
//! ```
//!
//! The vector path (embed, plan, materialize) runs under one deadline. Any
//! failure on it, including a `DEGRADED` plan, moves to `RetryLexical`, and
//! the lexical path always ends in `Done`. The only error a caller can see is
//! [`SearchError::InvalidQuery`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use index::{IndexSnapshot, IndexStore};
use semantic::QueryEmbedder;
use tokio::time::{timeout, timeout_at};
use tracing::{debug, info, warn};

use crate::config::{
    CoordinatorConfig, HealthConfig, HistoryConfig, LexicalConfig, PlannerConfig, SuggestConfig,
};
use crate::health::{HealthMonitor, HealthStatus};
use crate::history::{HistoryEntry, PopularQuery, SearchHistory};
use crate::intent::{IntentAnalyzer, KeywordIntentAnalyzer, SearchIntent};
use crate::lexical::{normalize_query, LexicalSearcher};
use crate::materializer::{Materialized, ResultMaterializer};
use crate::metrics::{metrics_recorder, FallbackReason};
use crate::planner::{past_last_page, PageWindow, Plan, PlanRequest, QualityReport, RetrievalPlanner};
use crate::rerank::{restrict_to_recalled, IdentityReranker, Reranker};
use crate::store::{CategoryCount, PoseStore};
use crate::suggest::{SuggestionCandidate, SuggestionRanker};
use crate::synonyms::SynonymTable;
use crate::types::{renumber, ModeUsed, PageInfo, Quality, SearchMode, SearchOutcome, SearchResult};
use crate::SearchError;


/// One search as the coordinator receives it.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    /// Results wanted for dynamic and multi-tier searches.
    pub target_count: usize,
    /// Falls back to the planner's `default_min_similarity`.
    pub min_similarity: Option<f32>,
    pub adaptive: bool,
    /// Pass vector results through the reranker. Paginated searches ignore
    /// it so pages stay slices of one ranking.
    pub rerank: bool,
    /// Restrict results to one scene category.
    pub category: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, target_count: usize) -> Self {
        Self {
            query: query.into(),
            mode: SearchMode::Dynamic,
            target_count,
            min_similarity: None,
            adaptive: false,
            rerank: false,
            category: None,
        }
    }

    pub fn paginated(query: impl Into<String>, page: usize, page_size: usize) -> Self {
        Self::new(query, page_size).with_mode(SearchMode::Paginated { page, page_size })
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = Some(min_similarity);
        self
    }

    pub fn with_adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }

    pub fn with_rerank(mut self, rerank: bool) -> Self {
        self.rerank = rerank;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Result of an intent-driven search.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentSearch {
    pub intent: SearchIntent,
    pub explanation: String,
    pub outcome: SearchOutcome,
}

/// Vector state carried from `VectorAttempt` into `Materialize`.
struct VectorAttempt {
    snapshot: Arc<IndexSnapshot>,
    vector: Vec<f32>,
    plan_req: PlanRequest,
    plan: Plan,
    deadline: tokio::time::Instant,
}

enum Step {
    HealthCheck,
    VectorAttempt,
    Materialize(Box<VectorAttempt>),
    RetryLexical {
        reason: FallbackReason,
        explanation: String,
    },
    LexicalOnly {
        explanation: String,
    },
    Done(SearchOutcome),
}

/// Validated request with defaults applied.
struct Prepared {
    query: String,
    plan_req: PlanRequest,
    rerank: bool,
    category: Option<String>,
}

impl Prepared {
    /// Results a full answer needs: the target, or the page prefix plus one
    /// lookahead row.
    fn needed(&self) -> usize {
        match self.window() {
            Some(window) => window.span(),
            None => self.plan_req.target_count,
        }
    }

    fn window(&self) -> Option<PageWindow> {
        match self.plan_req.mode {
            SearchMode::Paginated { page, page_size } => Some(PageWindow::new(page, page_size)),
            _ => None,
        }
    }
}

pub struct SearchCoordinator {
    cfg: CoordinatorConfig,
    planner: RetrievalPlanner,
    embedder: Arc<dyn QueryEmbedder>,
    index: Arc<IndexStore>,
    store: Arc<dyn PoseStore>,
    materializer: ResultMaterializer,
    lexical: LexicalSearcher,
    reranker: Arc<dyn Reranker>,
    suggester: SuggestionRanker,
    health: Arc<HealthMonitor>,
    history: Arc<SearchHistory>,
    refresh_in_flight: Arc<AtomicBool>,
}

impl SearchCoordinator {
    pub fn builder(
        embedder: Arc<dyn QueryEmbedder>,
        index: Arc<IndexStore>,
        store: Arc<dyn PoseStore>,
    ) -> SearchCoordinatorBuilder {
        SearchCoordinatorBuilder {
            embedder,
            index,
            store,
            synonyms: None,
            reranker: None,
            planner: PlannerConfig::default(),
            coordinator: CoordinatorConfig::default(),
            lexical: LexicalConfig::default(),
            suggest: SuggestConfig::default(),
            health: HealthConfig::default(),
            history: HistoryConfig::default(),
        }
    }

    /// Run one search. Backend failures never surface here; they lower the
    /// outcome's quality and set its explanation.
    pub async fn search(&self, req: &SearchRequest) -> Result<SearchOutcome, SearchError> {
        let started = Instant::now();
        let prepared = self.prepare(req)?;

        // Start
        let mut step = Step::HealthCheck;
        let mut outcome = loop {
            step = match step {
                Step::HealthCheck => self.health_check(),
                Step::VectorAttempt => self.vector_attempt(&prepared).await,
                Step::Materialize(attempt) => self.materialize(&prepared, *attempt).await,
                Step::RetryLexical {
                    reason,
                    explanation,
                } => {
                    self.note_fallback(reason, &explanation);
                    Step::Done(self.lexical_outcome(&prepared, explanation).await)
                }
                Step::LexicalOnly { explanation } => {
                    self.note_fallback(FallbackReason::ServiceUnavailable, &explanation);
                    Step::Done(self.lexical_outcome(&prepared, explanation).await)
                }
                Step::Done(outcome) => break outcome,
            };
        };

        let elapsed = started.elapsed();
        outcome.elapsed_ms = elapsed.as_millis() as u64;
        self.history.record(
            HistoryEntry::new(
                &prepared.query,
                outcome.results.len(),
                outcome.elapsed_ms,
                outcome.mode_used,
            )
            .with_category(prepared.category.clone()),
        );
        if let Some(recorder) = metrics_recorder() {
            recorder.record_search(elapsed, outcome.mode_used, outcome.quality, outcome.results.len());
        }
        debug!(
            mode_used = outcome.mode_used.as_str(),
            quality = outcome.quality.as_str(),
            results = outcome.results.len(),
            elapsed_ms = outcome.elapsed_ms,
            "search finished"
        );
        Ok(outcome)
    }

    /// Lexical search only, with no history or health side effects.
    pub async fn search_lexical(
        &self,
        query: &str,
        category: Option<&str>,
        limit: usize,
    ) -> Result<SearchOutcome, SearchError> {
        self.lexical.search(query, category, limit).await
    }

    /// One page of keyword results, served without the vector path. Store
    /// failures and timeouts come back as an empty `DEGRADED` outcome; the
    /// search is recorded in history like any other.
    pub async fn search_keywords(
        &self,
        query: &str,
        category: Option<&str>,
        page: usize,
        per_page: usize,
    ) -> Result<SearchOutcome, SearchError> {
        let started = Instant::now();
        if page == 0 {
            return Err(SearchError::invalid("page must be >= 1"));
        }
        if per_page == 0 {
            return Err(SearchError::invalid("per_page must be >= 1"));
        }
        let window = PageWindow::new(page, per_page);
        let category = category.map(str::trim).filter(|c| !c.is_empty());

        let searched = timeout(
            self.cfg.lexical_timeout(),
            self.lexical.search(query, category, window.span()),
        )
        .await;
        let mut outcome = match searched {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) if err.is_invalid_query() => return Err(err),
            Ok(Err(err)) => {
                warn!(error = %err, "keyword search failed");
                SearchOutcome::empty(format!("keyword search failed: {err}"))
            }
            Err(_) => {
                warn!(timeout_ms = self.cfg.lexical_timeout_ms, "keyword search timed out");
                SearchOutcome::empty("keyword search timed out")
            }
        };

        let (page_results, info) = slice_page(std::mem::take(&mut outcome.results), window);
        outcome.results = page_results;
        outcome.page = Some(info);
        if outcome.results.is_empty() && outcome.quality != Quality::Degraded && page > 1 {
            outcome.quality = Quality::Marginal;
            outcome.explanation = Some(past_last_page(window, None));
        }

        let elapsed = started.elapsed();
        outcome.elapsed_ms = elapsed.as_millis() as u64;
        self.history.record(
            HistoryEntry::new(query.trim(), outcome.results.len(), outcome.elapsed_ms, outcome.mode_used)
                .with_category(category.map(str::to_string)),
        );
        if let Some(recorder) = metrics_recorder() {
            recorder.record_search(elapsed, outcome.mode_used, outcome.quality, outcome.results.len());
        }
        Ok(outcome)
    }

    /// Interpret `query` with `analyzer` and run the lexical path filtered by
    /// the detected scene. An empty filtered result is retried unfiltered; a
    /// failing analyzer is replaced by keyword analysis.
    pub async fn search_with_intent(
        &self,
        analyzer: &dyn IntentAnalyzer,
        query: &str,
        limit: usize,
    ) -> Result<IntentSearch, SearchError> {
        let started = Instant::now();
        let intent = match analyzer.analyze(query).await {
            Ok(intent) => intent,
            Err(err) if err.is_invalid_query() => return Err(err),
            Err(err) => {
                warn!(error = %err, "intent analyzer failed, using keyword analysis");
                KeywordIntentAnalyzer.analyze_text(query)
            }
        };
        let mut explanation = intent.explanation();

        let mut outcome = self
            .lexical
            .search(query, intent.scene_category.as_deref(), limit)
            .await;
        if intent.scene_category.is_some() && outcome.as_ref().is_ok_and(|o| o.results.is_empty()) {
            explanation.push_str("; no match in that scene, searched all scenes");
            outcome = self.lexical.search(query, None, limit).await;
        }
        let mut outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) if err.is_invalid_query() => return Err(err),
            Err(err) => SearchOutcome::empty(format!("keyword search failed: {err}")),
        };
        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        self.history.record(
            HistoryEntry::new(query, outcome.results.len(), outcome.elapsed_ms, outcome.mode_used)
                .with_category(intent.scene_category.clone()),
        );
        Ok(IntentSearch {
            intent,
            explanation,
            outcome,
        })
    }

    pub async fn suggest(&self, prefix: &str, limit: usize) -> Vec<SuggestionCandidate> {
        self.suggester.suggest(prefix, limit).await
    }

    pub fn popular(&self, limit: usize) -> Vec<PopularQuery> {
        self.history.popular(limit)
    }

    pub async fn categories(&self) -> Result<Vec<CategoryCount>, SearchError> {
        Ok(self.store.category_counts().await?)
    }

    /// Cached health; never runs a live check.
    pub fn status(&self) -> HealthStatus {
        self.health.status()
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn index(&self) -> &Arc<IndexStore> {
        &self.index
    }

    pub fn history(&self) -> &Arc<SearchHistory> {
        &self.history
    }

    pub fn planner(&self) -> &RetrievalPlanner {
        &self.planner
    }

    fn prepare(&self, req: &SearchRequest) -> Result<Prepared, SearchError> {
        let query = req.query.trim();
        if query.is_empty() {
            return Err(SearchError::invalid("query must not be empty"));
        }
        if normalize_query(query).is_empty() {
            return Err(SearchError::invalid("query has no searchable characters"));
        }
        let min_similarity = req
            .min_similarity
            .unwrap_or(self.planner.config().default_min_similarity);
        let plan_req =
            PlanRequest::new(req.target_count, min_similarity, req.mode).with_adaptive(req.adaptive);
        plan_req.validate()?;
        Ok(Prepared {
            query: query.to_string(),
            plan_req,
            rerank: req.rerank && !matches!(req.mode, SearchMode::Paginated { .. }),
            category: req
                .category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        })
    }

    fn health_check(&self) -> Step {
        if self.health.is_stale() {
            self.spawn_refresh();
        }
        if self.health.should_attempt() {
            return Step::VectorAttempt;
        }
        let status = self.health.status();
        Step::LexicalOnly {
            explanation: status.message(),
        }
    }

    async fn vector_attempt(&self, prepared: &Prepared) -> Step {
        let deadline = tokio::time::Instant::now() + self.cfg.vector_timeout();
        let snapshot = match self.index.snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => return self.vector_failed(FallbackReason::IndexUnavailable, err.into()),
        };

        let embed_started = Instant::now();
        let embedded = timeout_at(deadline, self.embedder.embed(&prepared.query)).await;
        let vector = match embedded {
            Ok(Ok(vector)) => {
                self.record_embedding(embed_started, true);
                vector
            }
            Ok(Err(err)) => {
                self.record_embedding(embed_started, false);
                return self.vector_failed(
                    FallbackReason::EmbeddingFailed,
                    SearchError::EmbeddingUnavailable(err.to_string()),
                );
            }
            Err(_) => {
                self.record_embedding(embed_started, false);
                return self.vector_failed(
                    FallbackReason::Timeout,
                    SearchError::Timeout(self.cfg.vector_timeout()),
                );
            }
        };

        let plan = match self.planner.plan(&snapshot, &vector, &prepared.plan_req) {
            Ok(plan) => plan,
            Err(err) => return self.vector_failed(FallbackReason::IndexUnavailable, err),
        };
        if plan.quality() == Quality::Degraded {
            let reason = plan
                .report
                .warning
                .clone()
                .unwrap_or_else(|| "no relevant candidates".into());
            return Step::RetryLexical {
                reason: FallbackReason::NoCandidates,
                explanation: format!("vector search found nothing usable: {reason}"),
            };
        }
        Step::Materialize(Box::new(VectorAttempt {
            snapshot,
            vector,
            plan_req: prepared.plan_req,
            plan,
            deadline,
        }))
    }

    /// Resolve candidates, re-planning with padding while dead records leave
    /// the result short and the index still has more to give.
    async fn materialize(&self, prepared: &Prepared, attempt: VectorAttempt) -> Step {
        let VectorAttempt {
            snapshot,
            vector,
            plan_req,
            mut plan,
            deadline,
        } = attempt;
        let needed = prepared.needed();
        let mut padding = 0usize;
        let mut round = 0u32;

        let resolved = loop {
            let mut materialized =
                match timeout_at(deadline, self.materializer.materialize(&plan.candidates)).await {
                    Ok(Ok(materialized)) => materialized,
                    Ok(Err(err)) => return self.vector_failed(FallbackReason::MetadataFailed, err),
                    Err(_) => {
                        return self.vector_failed(
                            FallbackReason::Timeout,
                            SearchError::Timeout(self.cfg.vector_timeout()),
                        )
                    }
                };
            if let Some(category) = &prepared.category {
                let before = materialized.results.len();
                materialized.results.retain(|r| in_category(r, category));
                materialized.dropped += before - materialized.results.len();
                renumber(&mut materialized.results);
            }

            let short = materialized.results.len() < needed;
            if !short
                || plan.exhausted
                || plan.capped_at.is_some()
                || materialized.dropped == 0
                || round >= self.planner.config().max_rematerialize_rounds
            {
                break materialized;
            }
            round += 1;
            // Scale the pool by the observed live ratio.
            let total = plan.candidates.len().max(1);
            let live = materialized.results.len();
            let estimate = if live == 0 {
                total.saturating_mul(2)
            } else {
                needed.saturating_mul(total).div_ceil(live)
            };
            padding = estimate.saturating_sub(needed).max(padding + 1);
            debug!(round, padding, "re-planning after dropped candidates");
            plan = match self
                .planner
                .plan(&snapshot, &vector, &plan_req.with_padding(padding))
            {
                Ok(plan) => plan,
                Err(err) => return self.vector_failed(FallbackReason::IndexUnavailable, err),
            };
        };

        if resolved.results.is_empty() {
            return Step::RetryLexical {
                reason: FallbackReason::NoCandidates,
                explanation: "vector candidates referenced no live poses".into(),
            };
        }
        let mut resolved = resolved;
        if prepared.rerank {
            resolved.results = self
                .apply_reranker(&prepared.query, resolved.results, deadline)
                .await;
        }
        self.health.report_success();
        Step::Done(self.vector_outcome(prepared, &plan, resolved))
    }

    fn vector_outcome(&self, prepared: &Prepared, plan: &Plan, resolved: Materialized) -> SearchOutcome {
        let (results, page) = match prepared.window() {
            Some(window) => {
                let (page_results, info) = slice_page(resolved.results, window);
                (page_results, Some(info))
            }
            None => {
                let mut results = resolved.results;
                results.truncate(prepared.plan_req.target_count);
                (results, None)
            }
        };
        let mut report = match (page, prepared.window()) {
            (Some(_), Some(window)) if results.is_empty() => QualityReport {
                quality: Quality::Marginal,
                warning: Some(past_last_page(window, plan.capped_at)),
            },
            _ => {
                let scores: Vec<f32> = results.iter().map(|r| r.similarity).collect();
                self.planner.assess(&scores, plan.expected)
            }
        };
        if let (Some(info), Some(cap)) = (page, plan.capped_at) {
            if !info.has_more && !results.is_empty() {
                let note = format!("paging stops at the first {cap} ranked results; more matches exist");
                report.warning = Some(match report.warning.take() {
                    Some(warning) => format!("{warning}; {note}"),
                    None => note,
                });
            }
        }
        SearchOutcome {
            results,
            total_considered: plan.total_considered,
            quality: report.quality,
            mode_used: ModeUsed::Vector,
            elapsed_ms: 0,
            explanation: report.warning,
            page,
        }
    }

    async fn lexical_outcome(&self, prepared: &Prepared, explanation: String) -> SearchOutcome {
        let window = prepared.window();
        let limit = prepared.needed();
        let searched = timeout(
            self.cfg.lexical_timeout(),
            self.lexical
                .search(&prepared.query, prepared.category.as_deref(), limit),
        )
        .await;

        match searched {
            Ok(Ok(mut outcome)) => {
                outcome.explanation = Some(match outcome.explanation.take() {
                    Some(detail) => format!("{explanation}; keyword search used instead ({detail})"),
                    None => format!("{explanation}; keyword search used instead"),
                });
                if let Some(window) = window {
                    let (page_results, info) = slice_page(std::mem::take(&mut outcome.results), window);
                    outcome.results = page_results;
                    outcome.page = Some(info);
                }
                outcome
            }
            Ok(Err(err)) => {
                warn!(error = %err, "lexical fallback failed");
                SearchOutcome::empty(format!("{explanation}; keyword search failed: {err}"))
            }
            Err(_) => {
                warn!(timeout_ms = self.cfg.lexical_timeout_ms, "lexical fallback timed out");
                SearchOutcome::empty(format!("{explanation}; keyword search timed out"))
            }
        }
    }

    /// Reorder recalled results; any reranker failure keeps the similarity
    /// order.
    async fn apply_reranker(
        &self,
        query: &str,
        results: Vec<SearchResult>,
        deadline: tokio::time::Instant,
    ) -> Vec<SearchResult> {
        let recalled = results.clone();
        match timeout_at(deadline, self.reranker.rerank(query, results)).await {
            Ok(Ok(reordered)) => match restrict_to_recalled(&recalled, reordered) {
                Some(kept) => kept,
                None => {
                    warn!("reranker kept no recalled poses, using similarity order");
                    recalled
                }
            },
            Ok(Err(err)) => {
                warn!(error = %err, "reranker failed, using similarity order");
                recalled
            }
            Err(_) => {
                warn!("reranker ran past the search deadline, using similarity order");
                recalled
            }
        }
    }

    fn vector_failed(&self, reason: FallbackReason, err: SearchError) -> Step {
        warn!(error = %err, reason = reason.as_str(), "vector attempt failed");
        self.health.report_failure(&err);
        Step::RetryLexical {
            reason,
            explanation: format!("vector search unavailable: {err}"),
        }
    }

    fn note_fallback(&self, reason: FallbackReason, explanation: &str) {
        info!(reason = reason.as_str(), explanation, "falling back to keyword search");
        if let Some(recorder) = metrics_recorder() {
            recorder.record_fallback(reason);
        }
    }

    fn record_embedding(&self, started: Instant, ok: bool) {
        if let Some(recorder) = metrics_recorder() {
            recorder.record_embedding(started.elapsed(), ok);
        }
    }

    /// Check in the background; at most one spawned refresh at a time.
    fn spawn_refresh(&self) {
        if self
            .refresh_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let health = Arc::clone(&self.health);
        let in_flight = Arc::clone(&self.refresh_in_flight);
        tokio::spawn(async move {
            health.refresh().await;
            in_flight.store(false, Ordering::Release);
        });
    }
}

fn in_category(result: &SearchResult, category: &str) -> bool {
    result
        .pose
        .scene_category
        .as_deref()
        .is_some_and(|c| c.eq_ignore_ascii_case(category))
}

/// Cut one page out of a ranked prefix that includes one lookahead row.
fn slice_page(prefix: Vec<SearchResult>, window: PageWindow) -> (Vec<SearchResult>, PageInfo) {
    let available = prefix.len();
    let mut page: Vec<SearchResult> = prefix
        .into_iter()
        .skip(window.offset)
        .take(window.page_size)
        .collect();
    renumber(&mut page);
    for result in &mut page {
        result.rank += window.offset;
    }
    let info = PageInfo {
        page: window.page,
        page_size: window.page_size,
        total: available.min(window.offset.saturating_add(window.page_size)),
        has_more: available > window.offset.saturating_add(window.page_size),
    };
    (page, info)
}

pub struct SearchCoordinatorBuilder {
    embedder: Arc<dyn QueryEmbedder>,
    index: Arc<IndexStore>,
    store: Arc<dyn PoseStore>,
    synonyms: Option<Arc<SynonymTable>>,
    reranker: Option<Arc<dyn Reranker>>,
    planner: PlannerConfig,
    coordinator: CoordinatorConfig,
    lexical: LexicalConfig,
    suggest: SuggestConfig,
    health: HealthConfig,
    history: HistoryConfig,
}

impl SearchCoordinatorBuilder {
    pub fn with_synonyms(mut self, synonyms: Arc<SynonymTable>) -> Self {
        self.synonyms = Some(synonyms);
        self
    }

    /// Second-stage ordering for searches that ask for it; defaults to
    /// [`IdentityReranker`].
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_planner(mut self, cfg: PlannerConfig) -> Self {
        self.planner = cfg;
        self
    }

    pub fn with_coordinator(mut self, cfg: CoordinatorConfig) -> Self {
        self.coordinator = cfg;
        self
    }

    pub fn with_lexical(mut self, cfg: LexicalConfig) -> Self {
        self.lexical = cfg;
        self
    }

    pub fn with_suggest(mut self, cfg: SuggestConfig) -> Self {
        self.suggest = cfg;
        self
    }

    pub fn with_health(mut self, cfg: HealthConfig) -> Self {
        self.health = cfg;
        self
    }

    pub fn with_history(mut self, cfg: HistoryConfig) -> Self {
        self.history = cfg;
        self
    }

    /// Validate the configuration and wire every component. Synonyms come
    /// from, in order: [`with_synonyms`](Self::with_synonyms), the lexical
    /// `synonyms_path`, the built-in table.
    pub fn build(self) -> Result<SearchCoordinator, SearchError> {
        self.planner.validate()?;
        let synonyms = match (self.synonyms, &self.lexical.synonyms_path) {
            (Some(table), _) => table,
            (None, Some(path)) => Arc::new(SynonymTable::load_json(path)?),
            (None, None) => Arc::new(SynonymTable::builtin()),
        };
        let history = Arc::new(SearchHistory::new(self.history));
        let health = Arc::new(HealthMonitor::new(
            self.health,
            Arc::clone(&self.embedder),
            Arc::clone(&self.index),
        ));
        Ok(SearchCoordinator {
            cfg: self.coordinator,
            planner: RetrievalPlanner::new(self.planner),
            materializer: ResultMaterializer::new(Arc::clone(&self.store)),
            lexical: LexicalSearcher::new(self.lexical, Arc::clone(&synonyms), Arc::clone(&self.store)),
            reranker: self
                .reranker
                .unwrap_or_else(|| Arc::new(IdentityReranker)),
            suggester: SuggestionRanker::new(
                self.suggest,
                Arc::clone(&history),
                Arc::clone(&self.store),
                synonyms,
            ),
            embedder: self.embedder,
            index: self.index,
            store: self.store,
            health,
            history,
            refresh_in_flight: Arc::new(AtomicBool::new(false)),
        })
    }
}
