//! Prometheus export of search telemetry.

use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use retrieval::{FallbackReason, ModeUsed, Quality, SearchMetrics};

static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the process-wide Prometheus recorder, once. Later calls return
/// the handle from the first.
pub fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    let handle = PROMETHEUS.get_or_try_init(|| PrometheusBuilder::new().install_recorder())?;
    Ok(handle.clone())
}

/// Forwards retrieval events to the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusSearchMetrics;

impl SearchMetrics for PrometheusSearchMetrics {
    fn record_search(&self, latency: Duration, mode: ModeUsed, quality: Quality, results: usize) {
        counter!(
            "poselens_searches_total",
            "mode" => mode.as_str(),
            "quality" => quality.as_str()
        )
        .increment(1);
        histogram!("poselens_search_duration_seconds", "mode" => mode.as_str())
            .record(latency.as_secs_f64());
        histogram!("poselens_search_results").record(results as f64);
    }

    fn record_fallback(&self, reason: FallbackReason) {
        counter!("poselens_fallbacks_total", "reason" => reason.as_str()).increment(1);
    }

    fn record_embedding(&self, latency: Duration, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        counter!("poselens_embeddings_total", "outcome" => outcome).increment(1);
        histogram!("poselens_embedding_duration_seconds").record(latency.as_secs_f64());
    }

    fn record_health_check(&self, available: bool) {
        gauge!("poselens_vector_available").set(if available { 1.0 } else { 0.0 });
        counter!("poselens_health_checks_total").increment(1);
    }
}
