use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::ann::AnnConfig;
use crate::{IndexError, IndexSnapshot};

/// Holder of the currently published [`IndexSnapshot`].
///
/// Readers take an `Arc` to the current snapshot and search it without any
/// lock held; the lock only guards the pointer itself. A reload builds the
/// replacement off to the side and swaps the pointer, so in-flight readers
/// finish against the snapshot they started with and the old one is freed
/// when the last of them drops its `Arc`.
pub struct IndexStore {
    current: RwLock<Option<Arc<IndexSnapshot>>>,
    generations: AtomicU64,
}

impl IndexStore {
    /// A store with nothing published yet.
    pub fn empty() -> Self {
        Self {
            current: RwLock::new(None),
            generations: AtomicU64::new(0),
        }
    }

    pub fn with_snapshot(snapshot: IndexSnapshot) -> Self {
        let store = Self::empty();
        store.publish(snapshot);
        store
    }

    /// Load the index at `path`; the only fatal startup condition.
    pub fn open(path: &Path, ann_cfg: AnnConfig) -> Result<Self, IndexError> {
        Ok(Self::with_snapshot(IndexSnapshot::load(path, ann_cfg)?))
    }

    /// Current snapshot, or [`IndexError::NotLoaded`].
    pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>, IndexError> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone().ok_or(IndexError::NotLoaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_ok()
    }

    /// Publish `snapshot` and return the generation assigned to it.
    pub fn publish(&self, mut snapshot: IndexSnapshot) -> u64 {
        let generation = self.generations.fetch_add(1, Ordering::AcqRel) + 1;
        snapshot.set_generation(generation);
        let next = Arc::new(snapshot);
        let previous = {
            let mut guard = self
                .current
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.replace(next)
        };
        log::info!(
            "published index generation {generation} (replaced {})",
            previous
                .as_ref()
                .map(|old| old.generation().to_string())
                .unwrap_or_else(|| "nothing".into())
        );
        generation
    }

    /// Rebuild from `path` and swap it in. On failure the current snapshot
    /// stays published.
    pub fn reload_from(&self, path: &Path, ann_cfg: AnnConfig) -> Result<u64, IndexError> {
        match IndexSnapshot::load(path, ann_cfg) {
            Ok(snapshot) => Ok(self.publish(snapshot)),
            Err(err) => {
                log::warn!("index reload from {} failed: {err}", path.display());
                Err(err)
            }
        }
    }
}

impl Default for IndexStore {
    fn default() -> Self {
        Self::empty()
    }
}
