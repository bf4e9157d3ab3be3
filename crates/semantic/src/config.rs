use serde::{Deserialize, Serialize};

use crate::resilience::{CircuitBreakerConfig, RetryConfig};

/// Which embedder implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderMode {
    /// Remote OpenAI-compatible embeddings endpoint.
    #[default]
    Api,
    /// Deterministic hash-derived vectors; no network.
    Stub,
}

/// Runtime configuration for the query embedder.
///
/// # Example
/// ```
/// use semantic::{EmbedderConfig, EmbedderMode};
///
/// let cfg = EmbedderConfig {
///     mode: EmbedderMode::Stub,
///     dimension: 8,
///     ..Default::default()
/// };
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbedderConfig {
    pub mode: EmbedderMode,
    /// Model name sent to the provider and reported by status endpoints.
    pub model_name: String,
    /// Expected vector length; must match the loaded index.
    pub dimension: usize,
    /// Embeddings endpoint when [`mode`](Self::mode) is `api`.
    pub api_url: Option<String>,
    /// Environment variable holding the bearer token.
    pub api_key_env: Option<String>,
    /// Per-request HTTP timeout in milliseconds.
    pub timeout_ms: u64,
    /// Normalize vectors to unit length (required for cosine scoring).
    pub normalize: bool,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            mode: EmbedderMode::Api,
            model_name: "text-embedding-3-small".into(),
            dimension: 1536,
            api_url: Some("https://api.openai.com/v1/embeddings".into()),
            api_key_env: Some("OPENAI_API_KEY".into()),
            timeout_ms: 2_500,
            normalize: true,
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl EmbedderConfig {
    /// A stub configuration of the given dimension.
    pub fn stub(dimension: usize) -> Self {
        Self {
            mode: EmbedderMode::Stub,
            model_name: "stub".into(),
            dimension,
            api_url: None,
            api_key_env: None,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), crate::SemanticError> {
        if self.dimension == 0 {
            return Err(crate::SemanticError::InvalidConfig(
                "dimension must be non-zero".into(),
            ));
        }
        if self.mode == EmbedderMode::Api
            && self.api_url.as_deref().map_or(true, |url| url.trim().is_empty())
        {
            return Err(crate::SemanticError::InvalidConfig(
                "api_url is required for api mode".into(),
            ));
        }
        Ok(())
    }
}
