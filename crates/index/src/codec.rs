//! On-disk format of a persisted embedding index.
//!
//! A file is a bincode-encoded [`IndexFile`], optionally wrapped in a zstd
//! frame. Readers sniff the zstd magic so either flavour loads regardless of
//! the compression the writer was configured with.

use std::fs;
use std::io::Write;
use std::path::Path;

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use zstd::{decode_all, encode_all};

use crate::{IndexError, PoseId, INDEX_SCHEMA_VERSION};

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// One persisted row: its internal id and embedding.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IndexEntry {
    pub internal_id: u32,
    pub vector: Vec<f32>,
}

/// Serialized form of an index snapshot.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IndexFile {
    /// Bumped whenever this layout changes.
    pub schema_version: u16,
    pub dimension: u32,
    /// Rows ordered by `internal_id`, which must run `0..entries.len()`.
    pub entries: Vec<IndexEntry>,
    /// `id_map[internal_id]` is the pose the row was embedded from.
    pub id_map: Vec<PoseId>,
}

impl IndexFile {
    pub fn new(dimension: usize) -> Self {
        Self {
            schema_version: INDEX_SCHEMA_VERSION,
            dimension: dimension as u32,
            entries: Vec::new(),
            id_map: Vec::new(),
        }
    }

    /// Append a row for `pose_id`.
    pub fn push(&mut self, pose_id: PoseId, vector: Vec<f32>) {
        let internal_id = self.entries.len() as u32;
        self.entries.push(IndexEntry {
            internal_id,
            vector,
        });
        self.id_map.push(pose_id);
    }

    /// Structural checks run before a file is turned into a live snapshot.
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.schema_version != INDEX_SCHEMA_VERSION {
            return Err(IndexError::UnsupportedSchema(self.schema_version));
        }
        if self.dimension == 0 {
            return Err(IndexError::Corrupt("dimension must be non-zero".into()));
        }
        if self.entries.len() != self.id_map.len() {
            return Err(IndexError::Corrupt(format!(
                "{} entries but {} id_map rows",
                self.entries.len(),
                self.id_map.len()
            )));
        }
        for (position, entry) in self.entries.iter().enumerate() {
            if entry.internal_id as usize != position {
                return Err(IndexError::Corrupt(format!(
                    "entry at position {position} carries internal id {}",
                    entry.internal_id
                )));
            }
            if entry.vector.len() != self.dimension as usize {
                return Err(IndexError::Corrupt(format!(
                    "entry {position} has dimension {}, expected {}",
                    entry.vector.len(),
                    self.dimension
                )));
            }
        }
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self, IndexError> {
        let bytes = fs::read(path)?;
        Self::decode(&bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, IndexError> {
        let raw = if bytes.starts_with(&ZSTD_MAGIC) {
            decode_all(bytes)?
        } else {
            bytes.to_vec()
        };
        let (file, _): (IndexFile, usize) = decode_from_slice(&raw, standard())?;
        file.validate()?;
        Ok(file)
    }

    pub fn encode(&self, compression: &CompressionConfig) -> Result<Vec<u8>, IndexError> {
        let encoded = encode_to_vec(self, standard())?;
        compression.compress(&encoded)
    }

    /// Write to a sibling temp file, then rename, so readers never see a
    /// half-written index.
    pub fn write_to(&self, path: &Path, compression: &CompressionConfig) -> Result<(), IndexError> {
        let payload = self.encode(compression)?;
        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Compression codec options for index files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionCodec {
    /// No compression (useful for debugging).
    None,
    /// Zstd compression (default, good balance of speed and ratio).
    #[default]
    Zstd,
}

/// Compression behavior configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub codec: CompressionCodec,
    /// Compression level (1-22 for Zstd, where higher = better compression but slower).
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn with_codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = codec;
        self
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, IndexError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(encode_all(data, self.level)?),
        }
    }
}
