use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub status: &'static str,
    pub generation: u64,
    pub index_size: usize,
    pub vector_available: bool,
}

/// Rebuild the index from its file and swap it in.
///
/// Decoding runs on the blocking pool; searches keep using the previous
/// snapshot until the swap and after a failed reload.
pub async fn reload_index(State(state): State<Arc<ServerState>>) -> ServerResult<Json<ReloadResponse>> {
    let engine = Arc::clone(&state.engine);
    let generation = tokio::task::spawn_blocking(move || engine.reload_index())
        .await
        .map_err(|err| ServerError::Internal(format!("reload task failed: {err}")))??;

    let vector_available = state.coordinator().health().refresh().await;
    let status = state.coordinator().status();
    tracing::info!(generation, index_size = status.index_size, "index reloaded via admin route");

    Ok(Json(ReloadResponse {
        status: "reloaded",
        generation,
        index_size: status.index_size,
        vector_available,
    }))
}
