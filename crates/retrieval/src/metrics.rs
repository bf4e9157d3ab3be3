//! Process-wide observer for search telemetry.

use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use crate::types::{ModeUsed, Quality};

/// Why the coordinator left the vector path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    ServiceUnavailable,
    EmbeddingFailed,
    IndexUnavailable,
    MetadataFailed,
    Timeout,
    NoCandidates,
}

impl FallbackReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackReason::ServiceUnavailable => "service_unavailable",
            FallbackReason::EmbeddingFailed => "embedding_failed",
            FallbackReason::IndexUnavailable => "index_unavailable",
            FallbackReason::MetadataFailed => "metadata_failed",
            FallbackReason::Timeout => "timeout",
            FallbackReason::NoCandidates => "no_candidates",
        }
    }
}

/// Metrics observer for retrieval.
pub trait SearchMetrics: Send + Sync {
    fn record_search(&self, latency: Duration, mode: ModeUsed, quality: Quality, results: usize);
    fn record_fallback(&self, reason: FallbackReason);
    fn record_embedding(&self, latency: Duration, ok: bool);
    fn record_health_check(&self, available: bool);
}

/// Install or clear the global search metrics recorder.
pub fn set_search_metrics(recorder: Option<Arc<dyn SearchMetrics>>) {
    let mut guard = metrics_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn SearchMetrics>>> {
    static METRICS: OnceLock<RwLock<Option<Arc<dyn SearchMetrics>>>> = OnceLock::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

pub(crate) fn metrics_recorder() -> Option<Arc<dyn SearchMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}
