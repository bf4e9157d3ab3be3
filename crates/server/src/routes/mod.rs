//! API route handlers
//!
//! - `search`: keyword search, vector search (plain, enhanced, paginated),
//!   status and AI search
//! - `suggestions`: autocomplete, popular queries and categories
//! - `health`: liveness, readiness and metrics
//! - `admin`: index hot reload, mounted only when enabled

pub mod admin;
pub mod health;
pub mod search;
pub mod suggestions;

use crate::error::ServerError;
use crate::state::ServerMetadata;
use axum::Json;
use serde_json::json;

/// API version and base info
///
/// ```json
/// {
///   "name": "PoseLens Server",
///   "version": "0.1.0",
///   "uptime_seconds": 42,
///   "endpoints": ["..."]
/// }
/// ```
pub async fn api_info() -> Json<serde_json::Value> {
    let metadata = ServerMetadata {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: health::uptime_seconds(),
    };
    Json(json!({
        "name": "PoseLens Server",
        "version": metadata.version,
        "uptime_seconds": metadata.uptime_seconds,
        "endpoints": [
            "/search",
            "/search/vector",
            "/search/vector/enhanced",
            "/search/vector/paginated",
            "/search/vector/status",
            "/search/ai-database",
            "/search/suggestions",
            "/search/popular",
            "/categories",
            "/health",
            "/ready",
            "/metrics"
        ]
    }))
}

/// 404 Not Found handler
///
/// Returns a standardized error response for undefined routes.
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
