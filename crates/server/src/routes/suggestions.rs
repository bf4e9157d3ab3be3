use crate::error::ServerResult;
use crate::state::ServerState;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use retrieval::{CategoryCount, PopularQuery, SuggestionCandidate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct SuggestionParams {
    #[serde(default)]
    pub prefix: String,

    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct PopularParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    pub categories: Vec<CategoryCount>,
    pub service_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_limit() -> usize {
    10
}

/// Autocomplete: `[{text, type, weight}]`, best first.
pub async fn suggestions(
    State(state): State<Arc<ServerState>>,
    params: Result<Query<SuggestionParams>, QueryRejection>,
) -> ServerResult<Json<Vec<SuggestionCandidate>>> {
    let Query(params) = params?;
    let limit = state.clamp_count(params.limit);
    Ok(Json(state.coordinator().suggest(&params.prefix, limit).await))
}

/// Most frequent queries of the recent window.
pub async fn popular(
    State(state): State<Arc<ServerState>>,
    params: Result<Query<PopularParams>, QueryRejection>,
) -> ServerResult<Json<Vec<PopularQuery>>> {
    let Query(params) = params?;
    Ok(Json(state.coordinator().popular(state.clamp_count(params.limit))))
}

/// Scene categories with live pose counts.
pub async fn categories(State(state): State<Arc<ServerState>>) -> Json<CategoriesResponse> {
    match state.coordinator().categories().await {
        Ok(categories) => Json(CategoriesResponse {
            categories,
            service_available: true,
            message: None,
        }),
        Err(err) => {
            tracing::warn!(error = %err, "category lookup failed");
            Json(CategoriesResponse {
                categories: Vec::new(),
                service_available: false,
                message: Some(err.to_string()),
            })
        }
    }
}
