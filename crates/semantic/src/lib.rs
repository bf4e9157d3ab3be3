//! Query embedding for pose retrieval.
//!
//! Turns free-text queries into fixed-dimension vectors that can be compared
//! against the embedding index. Two implementations ship:
//!
//! - **API mode**: calls an OpenAI-compatible embeddings endpoint, guarded by
//!   a circuit breaker and retry-with-backoff (see [`resilience`]).
//! - **Stub mode**: deterministic hash-derived vectors for tests and offline
//!   development.
//!
//! Callers depend on the [`QueryEmbedder`] trait; the retrieval engine wraps
//! every call in its own timeout, so an embedder is allowed to be slow or to
//! fail outright.
//!
//! ## Quick example
//!
//! ```
//! use semantic::{build_embedder, EmbedderConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let embedder = build_embedder(&EmbedderConfig::stub(16)).unwrap();
//! let vector = embedder.embed("海边 站姿").await.unwrap();
//! assert_eq!(vector.len(), 16);
//! # }
//! ```
//!
//! ## Env vars to know
//!
//! - `OPENAI_API_KEY` - bearer token for the default provider (the variable
//!   name is configurable through `api_key_env`).

pub mod config;
pub mod error;
pub mod resilience;

mod api;
mod normalize;
mod serde_millis;
mod stub;

use std::sync::Arc;

use async_trait::async_trait;

pub use api::ApiEmbedder;
pub use config::{EmbedderConfig, EmbedderMode};
pub use error::SemanticError;
pub use normalize::l2_normalize_in_place;
pub use stub::StubEmbedder;

/// Turns query text into a vector comparable with the index.
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SemanticError>;

    /// Length of every vector this embedder returns.
    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Build the embedder selected by `cfg.mode`.
pub fn build_embedder(cfg: &EmbedderConfig) -> Result<Arc<dyn QueryEmbedder>, SemanticError> {
    cfg.validate()?;
    let embedder: Arc<dyn QueryEmbedder> = match cfg.mode {
        EmbedderMode::Api => Arc::new(ApiEmbedder::new(cfg.clone())?),
        EmbedderMode::Stub => Arc::new(StubEmbedder::new(cfg.dimension).with_normalize(cfg.normalize)),
    };
    tracing::info!(
        mode = ?cfg.mode,
        model = embedder.model_name(),
        dimension = embedder.dimension(),
        "query embedder ready"
    );
    Ok(embedder)
}
