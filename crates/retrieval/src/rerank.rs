//! Second-stage ordering of recalled vector results.
//!
//! [`Reranker`] is the seam for a model that judges recalled poses against
//! the query (an LLM, a cross-encoder). The bundled [`IdentityReranker`]
//! keeps the similarity order.

use async_trait::async_trait;
use hashbrown::HashSet;

use crate::types::{renumber, PoseId, SearchResult};
use crate::SearchError;

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Reorder `results` for `query`. Results may be dropped; poses that were
    /// not recalled are ignored by the caller.
    async fn rerank(
        &self,
        query: &str,
        results: Vec<SearchResult>,
    ) -> Result<Vec<SearchResult>, SearchError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityReranker;

#[async_trait]
impl Reranker for IdentityReranker {
    async fn rerank(
        &self,
        _query: &str,
        results: Vec<SearchResult>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        Ok(results)
    }
}

/// Keep the first occurrence of every recalled pose in `reordered`, then
/// renumber. Returns `None` when nothing recalled survived.
pub(crate) fn restrict_to_recalled(
    recalled: &[SearchResult],
    reordered: Vec<SearchResult>,
) -> Option<Vec<SearchResult>> {
    let mut allowed: HashSet<PoseId> = recalled.iter().map(|r| r.pose_id).collect();
    let mut kept: Vec<SearchResult> = reordered
        .into_iter()
        .filter(|r| allowed.remove(&r.pose_id))
        .collect();
    if kept.is_empty() {
        return None;
    }
    renumber(&mut kept);
    Some(kept)
}
