use std::time::Duration;

use index::IndexError;
use semantic::SemanticError;
use thiserror::Error;

/// Failures inside the retrieval engine.
///
/// Only [`SearchError::InvalidQuery`] ever leaves the
/// [`SearchCoordinator`](crate::SearchCoordinator); everything else is folded
/// into a lower-quality [`SearchOutcome`](crate::SearchOutcome).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SearchError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),
    #[error("metadata lookup failed: {0}")]
    MetadataLookupFailure(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl SearchError {
    pub fn invalid(message: impl Into<String>) -> Self {
        SearchError::InvalidQuery(message.into())
    }

    pub fn is_invalid_query(&self) -> bool {
        matches!(self, SearchError::InvalidQuery(_))
    }
}

impl From<SemanticError> for SearchError {
    fn from(err: SemanticError) -> Self {
        match err {
            SemanticError::EmptyInput => SearchError::InvalidQuery(err.to_string()),
            other => SearchError::EmbeddingUnavailable(other.to_string()),
        }
    }
}

impl From<IndexError> for SearchError {
    fn from(err: IndexError) -> Self {
        SearchError::IndexUnavailable(err.to_string())
    }
}

impl From<StoreError> for SearchError {
    fn from(err: StoreError) -> Self {
        SearchError::MetadataLookupFailure(err.to_string())
    }
}

/// Errors raised by a [`PoseStore`](crate::PoseStore).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("pose store io error: {0}")]
    Io(String),
    #[error("pose store parse error: {0}")]
    Parse(String),
    #[error("pose store unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Parse(err.to_string())
    }
}
