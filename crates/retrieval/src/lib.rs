//! Adaptive pose retrieval.
//!
//! Sits between a query and the pose catalog:
//!
//! 1. [`SearchCoordinator`] consults the cached [`HealthMonitor`] verdict and
//!    picks the vector or lexical path.
//! 2. On the vector path the query is embedded, [`RetrievalPlanner`] widens
//!    the candidate pool against the live index snapshot, and
//!    [`ResultMaterializer`] resolves the survivors to pose records. Requests
//!    that ask for it are reordered by a [`Reranker`].
//! 3. Anything that goes wrong on the way, from an embedder timeout to a
//!    plan with no candidates, lands in [`LexicalSearcher`], the
//!    synonym-expanded keyword scan.
//!
//! Callers always receive a [`SearchOutcome`]; only a malformed request is
//! rejected with [`SearchError::InvalidQuery`].
//!
//! ```
//! use std::sync::Arc;
//!
//! use index::IndexStore;
//! use retrieval::{InMemoryPoseStore, ModeUsed, SearchCoordinator, SearchRequest};
//! use semantic::StubEmbedder;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let embedder = Arc::new(StubEmbedder::new(8));
//! let index = Arc::new(IndexStore::empty());
//! let store = Arc::new(InMemoryPoseStore::new());
//! let coordinator = SearchCoordinator::builder(embedder, index, store).build().unwrap();
//!
//! // No index is loaded, so the search degrades to keyword matching.
//! let outcome = coordinator.search(&SearchRequest::new("海边", 10)).await.unwrap();
//! assert_eq!(outcome.mode_used, ModeUsed::Lexical);
//! assert!(outcome.explanation.is_some());
//! # }
//! ```
//!
//! ## Metrics
//!
//! Install a [`SearchMetrics`] implementation via [`set_search_metrics`] to
//! observe search latency, fallbacks, embedding calls and health checks.

pub mod config;
pub mod coordinator;
pub mod health;
pub mod history;
pub mod intent;
pub mod lexical;
pub mod metrics;
pub mod planner;
pub mod rerank;
pub mod store;
pub mod suggest;
pub mod synonyms;
pub mod types;

mod error;
mod materializer;

pub use crate::config::{
    CoordinatorConfig, HealthConfig, HistoryConfig, LexicalConfig, PlannerConfig, SuggestConfig,
};
pub use crate::coordinator::{IntentSearch, SearchCoordinator, SearchCoordinatorBuilder, SearchRequest};
pub use crate::error::{SearchError, StoreError};
pub use crate::health::{HealthMonitor, HealthStatus};
pub use crate::history::{HistoryEntry, PopularQuery, SearchHistory};
pub use crate::intent::{IntentAnalyzer, KeywordIntentAnalyzer, SearchIntent};
pub use crate::lexical::{normalize_query, LexicalSearcher};
pub use crate::materializer::{Materialized, ResultMaterializer};
pub use crate::metrics::{set_search_metrics, FallbackReason, SearchMetrics};
pub use crate::planner::{Plan, PlanRequest, PlannedCandidate, RetrievalPlanner};
pub use crate::rerank::{IdentityReranker, Reranker};
pub use crate::store::{CategoryCount, InMemoryPoseStore, PoseStore, TagUsage};
pub use crate::suggest::{SuggestionCandidate, SuggestionRanker, SuggestionSource};
pub use crate::synonyms::{SynonymEdge, SynonymTable};
pub use crate::types::{
    ModeUsed, PageInfo, PoseId, PoseRecord, PoseStatus, Quality, SearchMode, SearchOutcome,
    SearchResult, Tier,
};
