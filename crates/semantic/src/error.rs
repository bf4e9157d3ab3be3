use thiserror::Error;

/// Errors surfaced by a [`QueryEmbedder`](crate::QueryEmbedder).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SemanticError {
    /// Configuration is inconsistent (e.g., api mode without an endpoint).
    #[error("invalid embedder config: {0}")]
    InvalidConfig(String),
    /// Nothing to embed.
    #[error("query text is empty")]
    EmptyInput,
    /// Transport failure or non-success HTTP status from the provider.
    #[error("embedding request failed: {0}")]
    Request(String),
    /// The provider answered but the body was not a usable embedding.
    #[error("malformed embedding response: {0}")]
    Response(String),
    /// The returned vector does not match the configured dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    Dimension { expected: usize, got: usize },
    /// The circuit breaker is open; the provider is not being called.
    #[error("circuit breaker open for provider '{0}'")]
    CircuitOpen(String),
}

impl SemanticError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SemanticError::Request(message) => crate::resilience::is_retryable_error(message),
            _ => false,
        }
    }
}
