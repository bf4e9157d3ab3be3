//! PoseLens Server - HTTP REST API for semantic pose retrieval
//!
//! Exposes the retrieval engine over axum. Searches never fail because a
//! backend is down: the envelope reports `service_available=false`, explains
//! why, and carries the keyword fallback's results. Only malformed requests
//! are rejected.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! - `GET /search` - Keyword search with synonyms, category filter and paging
//! - `POST /search/vector` - Vector search with degradation
//! - `POST /search/vector/enhanced` - Dynamic, paginated or multi-tier search
//! - `POST /search/vector/paginated` - One page of results
//! - `GET /search/vector/status` - Cached vector search availability
//! - `POST /search/ai-database` - Intent-driven catalog search
//! - `GET /search/suggestions` - Autocomplete
//! - `GET /search/popular` - Frequent recent queries
//! - `GET /categories` - Scene categories with counts
//! - `GET /health`, `GET /ready`, `GET /metrics` - Health checks and Prometheus metrics
//! - `POST /admin/index/reload` - Index hot reload (when `admin_enabled`)
//!
//! Configuration comes from an optional `server.{toml,yaml,json}` file and
//! `POSELENS_SERVER__*` environment variables; see [`ServerConfig`].

pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, spawn_health_refresh, start_server};
pub use state::ServerState;
