use std::sync::Arc;

use hashbrown::HashMap;

use crate::planner::PlannedCandidate;
use crate::store::PoseStore;
use crate::types::{PoseId, PoseRecord, SearchResult};
use crate::SearchError;

/// Output of one materialization pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Materialized {
    /// Results in candidate order, ranks starting at 1.
    pub results: Vec<SearchResult>,
    /// Candidates whose pose was missing, hidden or pending.
    pub dropped: usize,
}

/// Resolves planned candidates into full pose records with one batch lookup.
#[derive(Clone)]
pub struct ResultMaterializer {
    store: Arc<dyn PoseStore>,
}

impl ResultMaterializer {
    pub fn new(store: Arc<dyn PoseStore>) -> Self {
        Self { store }
    }

    /// Preserves candidate order. Candidates without a live record are
    /// dropped silently; topping the count back up is the planner's job.
    pub async fn materialize(
        &self,
        candidates: &[PlannedCandidate],
    ) -> Result<Materialized, SearchError> {
        if candidates.is_empty() {
            return Ok(Materialized {
                results: Vec::new(),
                dropped: 0,
            });
        }

        let ids: Vec<PoseId> = candidates.iter().map(|c| c.pose_id).collect();
        let records = self.store.fetch_many(&ids).await.map_err(|err| {
            tracing::warn!(error = %err, requested = ids.len(), "pose lookup failed");
            SearchError::from(err)
        })?;
        let mut by_id: HashMap<PoseId, PoseRecord> = records
            .into_iter()
            .filter(|pose| pose.is_live())
            .map(|pose| (pose.id, pose))
            .collect();

        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            // `remove` also guards against a pose appearing twice.
            if let Some(pose) = by_id.remove(&candidate.pose_id) {
                results.push(SearchResult {
                    pose_id: candidate.pose_id,
                    similarity: candidate.similarity,
                    rank: results.len() + 1,
                    tier: candidate.tier,
                    pose,
                });
            }
        }
        let dropped = candidates.len() - results.len();
        if dropped > 0 {
            tracing::debug!(dropped, kept = results.len(), "dropped candidates without live records");
        }
        Ok(Materialized { results, dropped })
    }
}
