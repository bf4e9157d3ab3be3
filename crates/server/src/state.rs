use crate::config::ServerConfig;
use crate::error::ServerResult;
use metrics_exporter_prometheus::PrometheusHandle;
use poselens::Engine;
use retrieval::{IntentAnalyzer, KeywordIntentAnalyzer, SearchCoordinator};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Index, catalog and coordinator (shared across requests)
    pub engine: Arc<Engine>,

    /// Query interpreter behind `/search/ai-database`
    pub intent: Arc<dyn IntentAnalyzer>,

    /// Renders `/metrics`; `None` when metrics are disabled
    pub prometheus: Option<PrometheusHandle>,
}

impl ServerState {
    /// Build the engine described by `config`.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let engine = Engine::builder(config.engine()?).build()?;
        Ok(Self::with_engine(config, Arc::new(engine)))
    }

    pub fn with_engine(config: ServerConfig, engine: Arc<Engine>) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            intent: Arc::new(KeywordIntentAnalyzer::new()),
            prometheus: None,
        }
    }

    pub fn with_intent(mut self, intent: Arc<dyn IntentAnalyzer>) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    pub fn coordinator(&self) -> &SearchCoordinator {
        self.engine.coordinator()
    }

    /// Clamp a caller-supplied result count to the configured maximum.
    pub fn clamp_count(&self, requested: usize) -> usize {
        requested.min(self.config.max_results)
    }
}

/// Server metadata for health checks
#[derive(Debug, serde::Serialize)]
pub struct ServerMetadata {
    pub version: String,
    pub uptime_seconds: u64,
}
