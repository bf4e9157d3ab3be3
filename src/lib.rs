//! Workspace umbrella crate for PoseLens semantic pose retrieval.
//!
//! [`Engine`] loads an [`EngineConfig`], opens the embedding index and the
//! pose catalog, builds the query embedder and hands back a ready
//! [`SearchCoordinator`]. The member crates stay usable on their own; this
//! crate only wires them together and re-exports the types callers need.
//!
//! ```
//! use poselens::{Engine, EngineConfig, ModeUsed, SearchRequest};
//! use semantic::EmbedderConfig;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), poselens::EngineError> {
//! let mut config = EngineConfig::default();
//! config.embedder = EmbedderConfig::stub(32);
//!
//! let engine = Engine::builder(config).build()?;
//! assert!(!engine.is_ready());
//!
//! let outcome = engine
//!     .coordinator()
//!     .search(&SearchRequest::new("海边 拍照", 10))
//!     .await
//!     .unwrap();
//! assert_eq!(outcome.mode_used, ModeUsed::Lexical);
//! # Ok(())
//! # }
//! ```

pub mod config;

use std::sync::Arc;

use index::{IndexError, IndexStore};
use semantic::{build_embedder, QueryEmbedder, SemanticError};
use thiserror::Error;
use tracing::{error, info};

pub use crate::config::{CatalogSection, ConfigLoadError, EngineConfig, IndexSection};
pub use retrieval::{
    set_search_metrics, FallbackReason, HealthStatus, IdentityReranker, InMemoryPoseStore,
    IntentAnalyzer, IntentSearch, KeywordIntentAnalyzer, ModeUsed, PageInfo, PoseId, PoseRecord,
    PoseStatus, PoseStore, Quality, Reranker, SearchCoordinator, SearchError, SearchIntent, SearchMetrics, SearchMode,
    SearchOutcome, SearchRequest, SearchResult, StoreError, SuggestionCandidate, SuggestionSource,
    Tier,
};

/// Errors raised while assembling or maintaining an [`Engine`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigLoadError),
    #[error("embedder error: {0}")]
    Embedder(#[from] SemanticError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("pose catalog error: {0}")]
    Catalog(#[from] StoreError),
    #[error("search setup error: {0}")]
    Search(#[from] SearchError),
}

/// A fully wired retrieval engine.
pub struct Engine {
    config: EngineConfig,
    index: Arc<IndexStore>,
    catalog: Arc<dyn PoseStore>,
    coordinator: Arc<SearchCoordinator>,
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            embedder: None,
            catalog: None,
            index: None,
            reranker: None,
        }
    }

    /// Load `path` as YAML and build with every component from config.
    pub fn from_config_file(path: impl AsRef<std::path::Path>) -> Result<Self, EngineError> {
        Self::builder(EngineConfig::from_file(path)?).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<SearchCoordinator> {
        &self.coordinator
    }

    pub fn index(&self) -> &Arc<IndexStore> {
        &self.index
    }

    pub fn catalog(&self) -> &Arc<dyn PoseStore> {
        &self.catalog
    }

    /// Ready means an index is published; without one only keyword search
    /// can answer.
    pub fn is_ready(&self) -> bool {
        self.index.is_loaded()
    }

    /// Rebuild the index from `index.path` and swap it in. Blocks while the
    /// file is decoded; the previous snapshot keeps serving on failure.
    pub fn reload_index(&self) -> Result<u64, EngineError> {
        let path = self
            .config
            .index
            .path
            .as_deref()
            .ok_or_else(|| ConfigLoadError::MissingField("index.path".to_string()))?;
        let generation = self.index.reload_from(path, self.config.index.ann)?;
        info!(generation, path = %path.display(), "index reloaded");
        Ok(generation)
    }
}

/// Assembles an [`Engine`]. Components not supplied explicitly are built
/// from the [`EngineConfig`].
pub struct EngineBuilder {
    config: EngineConfig,
    embedder: Option<Arc<dyn QueryEmbedder>>,
    catalog: Option<Arc<dyn PoseStore>>,
    index: Option<Arc<IndexStore>>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl EngineBuilder {
    pub fn with_embedder(mut self, embedder: Arc<dyn QueryEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn PoseStore>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_index(mut self, index: Arc<IndexStore>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// A missing or unreadable index file is logged and leaves the engine
    /// unready; every other failure is returned.
    pub fn build(self) -> Result<Engine, EngineError> {
        let config = self.config;
        config.validate()?;

        let embedder = match self.embedder {
            Some(embedder) => embedder,
            None => build_embedder(&config.embedder)?,
        };
        let catalog: Arc<dyn PoseStore> = match (self.catalog, &config.catalog.path) {
            (Some(catalog), _) => catalog,
            (None, Some(path)) => Arc::new(InMemoryPoseStore::load_json(path)?),
            (None, None) => Arc::new(InMemoryPoseStore::new()),
        };
        let index = match (self.index, &config.index.path) {
            (Some(index), _) => index,
            (None, Some(path)) => match IndexStore::open(path, config.index.ann) {
                Ok(store) => Arc::new(store),
                Err(err) => {
                    error!(path = %path.display(), error = %err, "index failed to load; serving keyword search only");
                    Arc::new(IndexStore::empty())
                }
            },
            (None, None) => Arc::new(IndexStore::empty()),
        };

        let mut coordinator = SearchCoordinator::builder(
            embedder,
            Arc::clone(&index),
            Arc::clone(&catalog),
        );
        if let Some(reranker) = self.reranker {
            coordinator = coordinator.with_reranker(reranker);
        }
        let coordinator = coordinator
            .with_planner(config.planner.clone())
            .with_coordinator(config.coordinator.clone())
            .with_lexical(config.lexical.clone())
            .with_suggest(config.suggest.clone())
            .with_health(config.health.clone())
            .with_history(config.history.clone())
            .build()?;

        info!(
            index_loaded = index.is_loaded(),
            model = config.embedder.model_name.as_str(),
            "engine ready"
        );
        Ok(Engine {
            config,
            index,
            catalog,
            coordinator: Arc::new(coordinator),
        })
    }
}
