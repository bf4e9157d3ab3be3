//! # Pose Index
//!
//! Memory-resident embedding index for pose retrieval. An index is built
//! offline, persisted as a compressed [`IndexFile`], loaded once at startup
//! into an immutable [`IndexSnapshot`] and published through an
//! [`IndexStore`]. Searching never takes a lock on the index data; only
//! the pointer swap on reload is synchronised.
//!
//! ## Key Concepts
//!
//! - **Internal id**: the row position of a vector inside a snapshot. It is
//!   what the similarity primitive returns.
//! - **Pose id**: the identifier of the pose record a row was embedded from,
//!   resolved with [`IndexSnapshot::pose_id`].
//! - **Generation**: a monotonically increasing counter assigned when a
//!   snapshot is published; it lets callers tell which index served them.
//!
//! ## Example Usage
//!
//! ```
//! use index::{IndexConfig, IndexSnapshot, IndexStore};
//!
//! let rows = vec![(7_i64, vec![1.0, 0.0]), (9_i64, vec![0.0, 1.0])];
//! let snapshot = IndexSnapshot::build(2, rows, IndexConfig::default().ann).unwrap();
//! let store = IndexStore::with_snapshot(snapshot);
//!
//! let current = store.snapshot().unwrap();
//! let hits = current.search(&[1.0, 0.1], 1).unwrap();
//! assert_eq!(current.pose_id(hits[0].internal_id), Some(7));
//! ```

pub mod ann;
mod codec;
mod snapshot;
mod store;

use bincode::error::{DecodeError, EncodeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ann::{AnnConfig, AnnError};

pub use codec::{CompressionCodec, CompressionConfig, IndexEntry, IndexFile};
pub use snapshot::IndexSnapshot;
pub use store::IndexStore;

/// Bump this value whenever the on-disk [`IndexFile`] layout changes.
pub const INDEX_SCHEMA_VERSION: u16 = 1;

/// Identifier of a pose record in the metadata store.
pub type PoseId = i64;

/// One raw hit from the similarity search primitive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateMatch {
    pub internal_id: usize,
    /// `1 - cosine distance`; higher is more relevant.
    pub similarity: f32,
}

/// Index configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub ann: AnnConfig,
    pub compression: CompressionConfig,
}

impl IndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ann(mut self, ann: AnnConfig) -> Self {
        self.ann = ann;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }
}

/// Custom error type
#[derive(Error, Debug, Clone)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Serialization encode error: {0}")]
    Encode(String),
    #[error("Serialization decode error: {0}")]
    Decode(String),
    #[error("Unsupported index schema version {0}")]
    UnsupportedSchema(u16),
    #[error("Corrupt index file: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Ann(#[from] AnnError),
    #[error("No index has been loaded")]
    NotLoaded,
}

impl From<EncodeError> for IndexError {
    fn from(e: EncodeError) -> Self {
        IndexError::Encode(e.to_string())
    }
}

impl From<DecodeError> for IndexError {
    fn from(e: DecodeError) -> Self {
        IndexError::Decode(e.to_string())
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::Io(e.to_string())
    }
}
