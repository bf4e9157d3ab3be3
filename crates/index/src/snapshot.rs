use std::path::Path;

use crate::ann::{AnnConfig, AnnIndex};
use crate::codec::{CompressionConfig, IndexFile};
use crate::{CandidateMatch, IndexError, PoseId};

/// An immutable, fully built embedding index.
///
/// Snapshots are never mutated after construction; a reload builds a new
/// snapshot and publishes it through [`IndexStore`](crate::IndexStore).
pub struct IndexSnapshot {
    generation: u64,
    ann: AnnIndex,
    id_map: Vec<PoseId>,
}

impl IndexSnapshot {
    /// Build a snapshot from `(pose_id, vector)` rows. Row order defines the
    /// internal ids.
    pub fn build<I>(dimension: usize, rows: I, ann_cfg: AnnConfig) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = (PoseId, Vec<f32>)>,
    {
        let mut ann = AnnIndex::new(dimension, ann_cfg);
        let mut id_map = Vec::new();
        for (pose_id, vector) in rows {
            ann.insert(vector)?;
            id_map.push(pose_id);
        }
        ann.build();
        Ok(Self {
            generation: 0,
            ann,
            id_map,
        })
    }

    /// Turn a decoded, validated [`IndexFile`] into a snapshot.
    pub fn from_file(file: IndexFile, ann_cfg: AnnConfig) -> Result<Self, IndexError> {
        file.validate()?;
        let IndexFile {
            dimension,
            entries,
            id_map,
            ..
        } = file;
        Self::build(
            dimension as usize,
            id_map
                .into_iter()
                .zip(entries.into_iter().map(|entry| entry.vector)),
            ann_cfg,
        )
    }

    /// Load and build a snapshot from disk.
    pub fn load(path: &Path, ann_cfg: AnnConfig) -> Result<Self, IndexError> {
        let file = IndexFile::read_from(path)?;
        let snapshot = Self::from_file(file, ann_cfg)?;
        log::info!(
            "loaded embedding index from {} ({} rows, dim {})",
            path.display(),
            snapshot.len(),
            snapshot.dimension()
        );
        Ok(snapshot)
    }

    /// Persist the rows of this snapshot.
    pub fn write_to(&self, path: &Path, compression: &CompressionConfig) -> Result<(), IndexError> {
        self.to_file().write_to(path, compression)
    }

    pub fn to_file(&self) -> IndexFile {
        let mut file = IndexFile::new(self.dimension());
        for (internal_id, pose_id) in self.id_map.iter().enumerate() {
            if let Some(vector) = self.ann.vector(internal_id) {
                file.push(*pose_id, vector.to_vec());
            }
        }
        file
    }

    /// Similarity search primitive: up to `k` candidates ordered by
    /// descending similarity (`1 - cosine distance`, in `[-1, 1]`).
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<CandidateMatch>, IndexError> {
        let hits = self.ann.search(query, k)?;
        Ok(hits
            .into_iter()
            .map(|hit| CandidateMatch {
                internal_id: hit.internal_id,
                similarity: 1.0 - hit.distance,
            })
            .collect())
    }

    /// Pose a row was embedded from.
    pub fn pose_id(&self, internal_id: usize) -> Option<PoseId> {
        self.id_map.get(internal_id).copied()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub fn dimension(&self) -> usize {
        self.ann.dimension()
    }

    /// Per-call cap on [`search`](Self::search). Rows ranked past it cannot
    /// be reached by any single search.
    pub fn result_cap(&self) -> usize {
        self.ann.max_results()
    }

    pub fn len(&self) -> usize {
        self.id_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_map.is_empty()
    }
}

impl std::fmt::Debug for IndexSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSnapshot")
            .field("generation", &self.generation)
            .field("rows", &self.len())
            .field("dimension", &self.dimension())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn rows() -> Vec<(PoseId, Vec<f32>)> {
        vec![
            (10, vec![1.0, 0.0, 0.0]),
            (20, vec![0.8, 0.6, 0.0]),
            (30, vec![0.0, 0.0, 1.0]),
        ]
    }

    #[test]
    fn search_returns_descending_similarity() {
        let snapshot = IndexSnapshot::build(3, rows(), AnnConfig::default()).unwrap();
        let hits = snapshot.search(&[1.0, 0.0, 0.0], 3).unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].internal_id, 0);
        assert!((hits[0].similarity - 1.0).abs() < 1e-5);
        assert!((hits[1].similarity - 0.8).abs() < 1e-5);
        assert!(hits[2].similarity.abs() < 1e-5);
        assert_eq!(snapshot.pose_id(hits[1].internal_id), Some(20));
    }

    #[test]
    fn write_then_load_preserves_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("poses.idx");
        let snapshot = IndexSnapshot::build(3, rows(), AnnConfig::default()).unwrap();
        snapshot
            .write_to(&path, &CompressionConfig::default())
            .unwrap();

        let loaded = IndexSnapshot::load(&path, AnnConfig::default()).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.dimension(), 3);
        assert_eq!(loaded.pose_id(2), Some(30));
        assert_eq!(loaded.to_file(), snapshot.to_file());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let result = IndexSnapshot::load(&dir.path().join("absent.idx"), AnnConfig::default());
        assert!(matches!(result, Err(IndexError::Io(_))));
    }

    #[test]
    fn query_dimension_mismatch_is_reported() {
        let snapshot = IndexSnapshot::build(3, rows(), AnnConfig::default()).unwrap();
        assert!(matches!(
            snapshot.search(&[1.0, 0.0], 1),
            Err(IndexError::Ann(_))
        ));
    }
}
