//! Cached availability of the vector path.
//!
//! Searches read the cached flag and never wait on a live check. Checks run from
//! [`HealthMonitor::refresh`], either on the server's interval or spawned by
//! the coordinator when the cache goes stale. Concurrent refreshes coalesce
//! into the one already in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use index::IndexStore;
use semantic::QueryEmbedder;
use serde::Serialize;

use crate::config::HealthConfig;
use crate::metrics::metrics_recorder;
use crate::SearchError;

#[derive(Debug, Default)]
struct State {
    /// Starts `true`: an unchecked service is tried optimistically.
    available: bool,
    consecutive_failures: u32,
    checked_at: Option<Instant>,
    last_checked: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Snapshot of the monitor for status endpoints. Building it never runs a live check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub available: bool,
    pub stale: bool,
    pub consecutive_failures: u32,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub index_loaded: bool,
    pub index_size: usize,
    pub dimension: usize,
    pub generation: u64,
    pub model: String,
}

impl HealthStatus {
    pub fn message(&self) -> String {
        if !self.index_loaded {
            return "vector search unavailable: index not loaded".into();
        }
        match (&self.available, &self.last_error) {
            (true, _) => format!("vector search available ({} poses indexed)", self.index_size),
            (false, Some(err)) => format!("vector search unavailable: {err}"),
            (false, None) => "vector search unavailable".into(),
        }
    }
}

pub struct HealthMonitor {
    cfg: HealthConfig,
    embedder: Arc<dyn QueryEmbedder>,
    index: Arc<IndexStore>,
    state: Mutex<State>,
    refresh_gate: tokio::sync::Mutex<()>,
    checks: AtomicU64,
}

impl HealthMonitor {
    pub fn new(cfg: HealthConfig, embedder: Arc<dyn QueryEmbedder>, index: Arc<IndexStore>) -> Self {
        Self {
            cfg,
            embedder,
            index,
            state: Mutex::new(State {
                available: true,
                ..State::default()
            }),
            refresh_gate: tokio::sync::Mutex::new(()),
            checks: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.cfg
    }

    /// Cached flag; false whenever no index is loaded.
    pub fn is_available(&self) -> bool {
        self.lock().available && self.index.is_loaded()
    }

    /// True when no live check has completed within the TTL.
    pub fn is_stale(&self) -> bool {
        self.lock()
            .checked_at
            .map_or(true, |at| at.elapsed() > self.cfg.ttl())
    }

    /// Whether a search should try the vector path: available, or stale and
    /// therefore tried optimistically under the coordinator's timeout.
    pub fn should_attempt(&self) -> bool {
        if !self.index.is_loaded() {
            return false;
        }
        let state = self.lock();
        let stale = state
            .checked_at
            .map_or(true, |at| at.elapsed() > self.cfg.ttl());
        state.available || stale
    }

    /// Run a bounded live check and update the cache. Returns the new flag.
    pub async fn refresh(&self) -> bool {
        let observed = self.checks.load(Ordering::Acquire);
        let _gate = self.refresh_gate.lock().await;
        if self.checks.load(Ordering::Acquire) != observed {
            // Another caller checked while we waited.
            return self.is_available();
        }

        let outcome = match tokio::time::timeout(self.cfg.check_timeout(), self.live_check()).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::Timeout(self.cfg.check_timeout())),
        };
        let available = {
            let mut state = self.lock();
            state.checked_at = Some(Instant::now());
            state.last_checked = Some(Utc::now());
            match &outcome {
                Ok(()) => {
                    state.available = true;
                    state.consecutive_failures = 0;
                    state.last_error = None;
                }
                Err(err) => self.note_failure(&mut state, err.to_string()),
            }
            state.available
        };
        self.checks.fetch_add(1, Ordering::Release);

        if let Err(err) = &outcome {
            tracing::warn!(error = %err, available, "health check failed");
        } else {
            tracing::debug!("health check succeeded");
        }
        if let Some(recorder) = metrics_recorder() {
            recorder.record_health_check(available);
        }
        available && self.index.is_loaded()
    }

    /// A vector attempt succeeded. Clears the failure streak but does not
    /// lift an unavailable verdict; only a live check does that.
    pub fn report_success(&self) {
        let mut state = self.lock();
        if state.available {
            state.consecutive_failures = 0;
        }
    }

    /// A vector attempt failed; counts toward the failure threshold.
    pub fn report_failure(&self, error: &SearchError) {
        let mut state = self.lock();
        self.note_failure(&mut state, error.to_string());
    }

    pub fn status(&self) -> HealthStatus {
        let snapshot = self.index.snapshot().ok();
        let state = self.lock();
        let stale = state
            .checked_at
            .map_or(true, |at| at.elapsed() > self.cfg.ttl());
        HealthStatus {
            available: state.available && snapshot.is_some(),
            stale,
            consecutive_failures: state.consecutive_failures,
            last_checked: state.last_checked,
            last_error: state.last_error.clone(),
            index_loaded: snapshot.is_some(),
            index_size: snapshot.as_ref().map_or(0, |s| s.len()),
            dimension: snapshot.as_ref().map_or(0, |s| s.dimension()),
            generation: snapshot.as_ref().map_or(0, |s| s.generation()),
            model: self.embedder.model_name().to_string(),
        }
    }

    async fn live_check(&self) -> Result<(), SearchError> {
        let vector = self.embedder.embed(&self.cfg.check_text).await?;
        let snapshot = self.index.snapshot()?;
        snapshot.search(&vector, 1)?;
        Ok(())
    }

    fn note_failure(&self, state: &mut State, error: String) {
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_error = Some(error);
        if state.consecutive_failures >= self.cfg.failure_threshold.max(1) {
            if state.available {
                tracing::warn!(
                    failures = state.consecutive_failures,
                    "vector search marked unavailable"
                );
            }
            state.available = false;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use index::ann::AnnConfig;
    use index::IndexSnapshot;
    use semantic::{SemanticError, StubEmbedder};
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;

    struct Switchable {
        inner: StubEmbedder,
        failing: AtomicBool,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Switchable {
        fn new(delay: Duration) -> Self {
            Self {
                inner: StubEmbedder::new(4),
                failing: AtomicBool::new(false),
                delay,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl QueryEmbedder for Switchable {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, SemanticError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(SemanticError::Request("HTTP error 503".into()));
            }
            self.inner.embed(text).await
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "switchable"
        }
    }

    fn loaded_index() -> Arc<IndexStore> {
        let rows = (0..8).map(|i| (i as i64, vec![1.0, i as f32, 0.5, 0.0]));
        let snapshot = IndexSnapshot::build(4, rows, AnnConfig::default()).unwrap();
        Arc::new(IndexStore::with_snapshot(snapshot))
    }

    #[tokio::test]
    async fn three_failures_mark_unavailable_until_successful_refresh() {
        let embedder = Arc::new(Switchable::new(Duration::ZERO));
        let monitor = HealthMonitor::new(HealthConfig::default(), embedder.clone(), loaded_index());
        assert!(monitor.refresh().await);

        embedder.failing.store(true, Ordering::SeqCst);
        assert!(monitor.refresh().await);
        assert!(monitor.refresh().await);
        assert!(monitor.is_available());
        assert!(!monitor.refresh().await);
        assert!(!monitor.is_available());

        // Vector successes do not lift the verdict.
        monitor.report_success();
        assert!(!monitor.is_available());

        embedder.failing.store(false, Ordering::SeqCst);
        assert!(monitor.refresh().await);
        assert!(monitor.is_available());
        assert_eq!(monitor.status().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn reported_failures_count_toward_threshold() {
        let embedder = Arc::new(Switchable::new(Duration::ZERO));
        let monitor = HealthMonitor::new(HealthConfig::default(), embedder, loaded_index());
        for _ in 0..3 {
            monitor.report_failure(&SearchError::Timeout(Duration::from_millis(5)));
        }
        assert!(!monitor.is_available());
        // Never checked, so still stale and worth one optimistic attempt.
        assert!(monitor.should_attempt());
    }

    #[tokio::test]
    async fn concurrent_refreshes_share_one_check() {
        let embedder = Arc::new(Switchable::new(Duration::from_millis(50)));
        let monitor = HealthMonitor::new(HealthConfig::default(), embedder.clone(), loaded_index());
        let (a, b, c) = tokio::join!(monitor.refresh(), monitor.refresh(), monitor.refresh());
        assert!(a && b && c);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_check_times_out_as_failure() {
        let embedder = Arc::new(Switchable::new(Duration::from_millis(200)));
        let cfg = HealthConfig {
            check_timeout_ms: 10,
            failure_threshold: 1,
            ..Default::default()
        };
        let monitor = HealthMonitor::new(cfg, embedder, loaded_index());
        assert!(!monitor.refresh().await);
        assert!(monitor.status().last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn missing_index_is_never_available() {
        let embedder = Arc::new(Switchable::new(Duration::ZERO));
        let monitor = HealthMonitor::new(HealthConfig::default(), embedder, Arc::new(IndexStore::empty()));
        assert!(!monitor.is_available());
        assert!(!monitor.should_attempt());
        let status = monitor.status();
        assert!(!status.index_loaded);
        assert!(status.message().contains("index not loaded"));
    }
}
