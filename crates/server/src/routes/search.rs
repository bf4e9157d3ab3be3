//! Search endpoints: vector search, the standalone keyword search and the AI
//! search surface.
//!
//! Every search answers `200` unless the request itself is malformed. When
//! the vector path is down the envelope says so through
//! `service_available=false` and a `message`, and still carries whatever the
//! keyword fallback found.

use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use retrieval::{
    HealthStatus, ModeUsed, PageInfo, PoseRecord, Quality, SearchIntent, SearchMode,
    SearchOutcome, SearchRequest, SearchResult, Tier,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Body of `POST /search/vector`
#[derive(Debug, Deserialize)]
pub struct VectorSearchBody {
    pub query: String,

    #[serde(default = "default_count")]
    pub top_k: usize,

    /// Apply the adaptive quality floor after collection
    #[serde(default)]
    pub use_adaptive: bool,

    #[serde(default)]
    pub min_similarity: Option<f32>,

    /// Restrict results to one scene category
    #[serde(default)]
    pub category: Option<String>,
}

/// Body of `POST /search/vector/enhanced`
#[derive(Debug, Deserialize)]
pub struct EnhancedSearchBody {
    pub query: String,

    /// `dynamic`, `paginated` or `multi_tier`
    #[serde(default = "default_search_mode")]
    pub search_mode: String,

    #[serde(default = "default_count")]
    pub target_count: usize,

    #[serde(default)]
    pub min_similarity: Option<f32>,

    #[serde(default = "default_true")]
    pub use_enhanced: bool,

    /// Only read in `paginated` mode
    #[serde(default = "default_page")]
    pub page: usize,

    #[serde(default = "default_count")]
    pub page_size: usize,

    #[serde(default)]
    pub category: Option<String>,
}

/// Body of `POST /search/vector/paginated`
#[derive(Debug, Deserialize)]
pub struct PaginatedSearchBody {
    pub query: String,

    #[serde(default = "default_page")]
    pub page: usize,

    #[serde(default = "default_count")]
    pub page_size: usize,

    #[serde(default)]
    pub min_similarity: Option<f32>,

    #[serde(default)]
    pub category: Option<String>,
}

/// Query string of `GET /search`
#[derive(Debug, Deserialize)]
pub struct KeywordSearchParams {
    #[serde(default)]
    pub q: String,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default = "default_page")]
    pub page: usize,

    #[serde(default = "default_per_page")]
    pub per_page: usize,
}

/// Body of `POST /search/ai-database`
#[derive(Debug, Deserialize)]
pub struct AiSearchBody {
    pub query: String,

    #[serde(default = "default_ai_results")]
    pub max_results: usize,
}

/// A pose as returned to clients: the record plus its score and position.
#[derive(Debug, Serialize)]
pub struct PoseHit {
    #[serde(flatten)]
    pub pose: PoseRecord,
    pub similarity: f32,
    pub rank: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
}

impl From<SearchResult> for PoseHit {
    fn from(result: SearchResult) -> Self {
        Self {
            pose: result.pose,
            similarity: result.similarity,
            rank: result.rank,
            tier: result.tier,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchInfo {
    pub found_results: usize,
    pub total_considered: usize,
    pub avg_similarity: f32,
    /// `[min, max]` of the returned scores
    pub similarity_range: [f32; 2],
    pub quality: Quality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_warning: Option<String>,
}

/// Response envelope shared by every search endpoint
#[derive(Debug, Serialize)]
pub struct SearchEnvelope {
    pub poses: Vec<PoseHit>,
    /// `true` when the path the endpoint serves produced the answer: the
    /// vector path for vector searches, the catalog for keyword searches
    pub service_available: bool,
    pub mode_used: ModeUsed,
    pub query_time_ms: u64,
    pub search_info: SearchInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// `page`, `page_size`, `total`, `has_more` on paginated searches
    #[serde(flatten)]
    pub page: Option<PageInfo>,
}

impl From<SearchOutcome> for SearchEnvelope {
    fn from(outcome: SearchOutcome) -> Self {
        let service_available = outcome.mode_used == ModeUsed::Vector;
        let (low, high) = outcome.similarity_range();
        let search_info = SearchInfo {
            found_results: outcome.results.len(),
            total_considered: outcome.total_considered,
            avg_similarity: outcome.avg_similarity(),
            similarity_range: [low, high],
            quality: outcome.quality,
            quality_warning: outcome.explanation.clone(),
        };
        Self {
            poses: outcome.results.into_iter().map(PoseHit::from).collect(),
            service_available,
            mode_used: outcome.mode_used,
            query_time_ms: outcome.elapsed_ms,
            search_info,
            message: if service_available {
                None
            } else {
                outcome.explanation
            },
            page: outcome.page,
        }
    }
}

impl SearchEnvelope {
    /// Envelope for `GET /search`, where keyword matching is the intended
    /// path and only a failed catalog read counts as unavailable.
    pub fn keyword(outcome: SearchOutcome) -> Self {
        let available = outcome.quality != Quality::Degraded;
        let mut envelope = Self::from(outcome);
        envelope.service_available = available;
        if available {
            envelope.message = None;
        }
        envelope
    }
}

/// `GET /search/vector/status` body
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub message: String,
    #[serde(flatten)]
    pub status: HealthStatus,
}

/// `POST /search/ai-database` body
#[derive(Debug, Serialize)]
pub struct AiSearchResponse {
    pub poses: Vec<PoseHit>,
    pub ai_explanation: String,
    pub search_intent: SearchIntent,
    pub query_time_ms: u64,
    pub total: usize,
    pub quality: Quality,
}

fn default_count() -> usize {
    10
}

fn default_page() -> usize {
    1
}

fn default_per_page() -> usize {
    20
}

const MAX_PER_PAGE: usize = 100;

fn default_ai_results() -> usize {
    20
}

fn default_search_mode() -> String {
    "dynamic".to_string()
}

fn default_true() -> bool {
    true
}

/// Plain vector search with degradation.
pub async fn vector_search(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<VectorSearchBody>, JsonRejection>,
) -> ServerResult<Json<SearchEnvelope>> {
    let Json(body) = payload?;
    let mut request = SearchRequest::new(body.query, state.clamp_count(body.top_k))
        .with_adaptive(body.use_adaptive);
    if let Some(min_similarity) = body.min_similarity {
        request = request.with_min_similarity(min_similarity);
    }
    if let Some(category) = body.category {
        request = request.with_category(category);
    }
    run(&state, request).await
}

/// Search with an explicit retrieval strategy.
pub async fn enhanced_search(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<EnhancedSearchBody>, JsonRejection>,
) -> ServerResult<Json<SearchEnvelope>> {
    let Json(body) = payload?;
    let mode = parse_mode(&body.search_mode, body.page, state.clamp_count(body.page_size))?;
    let target_count = match mode {
        SearchMode::Paginated { page_size, .. } => page_size,
        _ => state.clamp_count(body.target_count),
    };
    let mut request = SearchRequest::new(body.query, target_count)
        .with_mode(mode)
        .with_adaptive(body.use_enhanced)
        .with_rerank(body.use_enhanced);
    if let Some(min_similarity) = body.min_similarity {
        request = request.with_min_similarity(min_similarity);
    }
    if let Some(category) = body.category {
        request = request.with_category(category);
    }
    run(&state, request).await
}

/// One page of a dynamic search; pages never overlap.
pub async fn paginated_search(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<PaginatedSearchBody>, JsonRejection>,
) -> ServerResult<Json<SearchEnvelope>> {
    let Json(body) = payload?;
    let mut request =
        SearchRequest::paginated(body.query, body.page, state.clamp_count(body.page_size));
    if let Some(min_similarity) = body.min_similarity {
        request = request.with_min_similarity(min_similarity);
    }
    if let Some(category) = body.category {
        request = request.with_category(category);
    }
    run(&state, request).await
}

/// Keyword search over the catalog with synonym expansion, paged.
pub async fn keyword_search(
    State(state): State<Arc<ServerState>>,
    params: Result<Query<KeywordSearchParams>, QueryRejection>,
) -> ServerResult<Json<SearchEnvelope>> {
    let Query(params) = params?;
    let per_page = state.clamp_count(params.per_page).min(MAX_PER_PAGE);
    let outcome = state
        .coordinator()
        .search_keywords(&params.q, params.category.as_deref(), params.page, per_page)
        .await?;
    if outcome.quality == Quality::Degraded {
        tracing::warn!(
            query = %params.q,
            explanation = outcome.explanation.as_deref().unwrap_or_default(),
            "keyword search degraded"
        );
    }
    Ok(Json(SearchEnvelope::keyword(outcome)))
}

/// Cached availability; never embeds.
pub async fn vector_status(State(state): State<Arc<ServerState>>) -> Json<StatusResponse> {
    let status = state.coordinator().status();
    Json(StatusResponse {
        message: status.message(),
        status,
    })
}

/// Interpret the query, then search the catalog with what was recognised.
pub async fn ai_database_search(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<AiSearchBody>, JsonRejection>,
) -> ServerResult<Json<AiSearchResponse>> {
    let Json(body) = payload?;
    let found = state
        .coordinator()
        .search_with_intent(
            state.intent.as_ref(),
            &body.query,
            state.clamp_count(body.max_results),
        )
        .await?;

    tracing::info!(
        query = %body.query,
        scene = ?found.intent.scene_category,
        results = found.outcome.results.len(),
        "ai database search"
    );

    Ok(Json(AiSearchResponse {
        total: found.outcome.results.len(),
        quality: found.outcome.quality,
        query_time_ms: found.outcome.elapsed_ms,
        poses: found.outcome.results.into_iter().map(PoseHit::from).collect(),
        ai_explanation: found.explanation,
        search_intent: found.intent,
    }))
}

async fn run(state: &ServerState, request: SearchRequest) -> ServerResult<Json<SearchEnvelope>> {
    let outcome = state.coordinator().search(&request).await?;
    if outcome.mode_used != ModeUsed::Vector {
        tracing::warn!(
            query = %request.query,
            mode = request.mode.as_str(),
            explanation = outcome.explanation.as_deref().unwrap_or_default(),
            "vector search degraded"
        );
    }
    Ok(Json(SearchEnvelope::from(outcome)))
}

fn parse_mode(name: &str, page: usize, page_size: usize) -> ServerResult<SearchMode> {
    match name.trim().to_ascii_lowercase().as_str() {
        "dynamic" => Ok(SearchMode::Dynamic),
        "paginated" => Ok(SearchMode::Paginated { page, page_size }),
        "multi_tier" | "multi-tier" => Ok(SearchMode::MultiTier),
        other => Err(ServerError::InvalidQuery(format!(
            "unknown search_mode '{other}', expected dynamic, paginated or multi_tier"
        ))),
    }
}
