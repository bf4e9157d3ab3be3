//! Access to pose metadata.
//!
//! The relational store that owns pose records lives outside this crate;
//! [`PoseStore`] is the seam it plugs into. [`InMemoryPoseStore`] is the
//! bundled implementation, loaded from a JSON catalog export.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Serialize;

use crate::types::{PoseId, PoseRecord};
use crate::StoreError;

/// Usage count of one tag across live poses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagUsage {
    pub name: String,
    pub usage_count: u64,
}

/// Number of live poses in one scene category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: u64,
}

#[async_trait]
pub trait PoseStore: Send + Sync {
    /// Batch lookup of live poses. Unknown, hidden or pending ids are simply
    /// absent from the result; order is unspecified.
    async fn fetch_many(&self, ids: &[PoseId]) -> Result<Vec<PoseRecord>, StoreError>;

    /// Every live pose, used by the lexical scan and facet queries.
    async fn all_active(&self) -> Result<Vec<PoseRecord>, StoreError>;

    /// Tags across live poses, most used first, ties by name.
    async fn tag_usage(&self) -> Result<Vec<TagUsage>, StoreError> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for pose in self.all_active().await? {
            for tag in pose.tags {
                let tag = tag.trim();
                if !tag.is_empty() {
                    *counts.entry(tag.to_string()).or_default() += 1;
                }
            }
        }
        let mut usage: Vec<TagUsage> = counts
            .into_iter()
            .map(|(name, usage_count)| TagUsage { name, usage_count })
            .collect();
        usage.sort_by(|a, b| b.usage_count.cmp(&a.usage_count).then(a.name.cmp(&b.name)));
        Ok(usage)
    }

    /// Scene categories with live pose counts, largest first.
    async fn category_counts(&self) -> Result<Vec<CategoryCount>, StoreError> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for pose in self.all_active().await? {
            if let Some(category) = pose.scene_category.filter(|c| !c.trim().is_empty()) {
                *counts.entry(category).or_default() += 1;
            }
        }
        let mut categories: Vec<CategoryCount> = counts
            .into_iter()
            .map(|(name, count)| CategoryCount { name, count })
            .collect();
        categories.sort_by(|a, b| b.count.cmp(&a.count).then(a.name.cmp(&b.name)));
        Ok(categories)
    }
}

/// Pose catalog held in memory.
#[derive(Debug, Default)]
pub struct InMemoryPoseStore {
    poses: RwLock<BTreeMap<PoseId, PoseRecord>>,
}

impl InMemoryPoseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = PoseRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.upsert(record);
        }
        store
    }

    /// Load a JSON array of pose records.
    pub fn load_json(path: &Path) -> Result<Self, StoreError> {
        let bytes = std::fs::read(path)?;
        let records: Vec<PoseRecord> = serde_json::from_slice(&bytes)?;
        tracing::info!(path = %path.display(), poses = records.len(), "loaded pose catalog");
        Ok(Self::from_records(records))
    }

    pub fn upsert(&self, record: PoseRecord) {
        self.write().insert(record.id, record);
    }

    pub fn remove(&self, id: PoseId) -> Option<PoseRecord> {
        self.write().remove(&id)
    }

    pub fn get(&self, id: PoseId) -> Option<PoseRecord> {
        self.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<PoseId, PoseRecord>> {
        self.poses
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<PoseId, PoseRecord>> {
        self.poses
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PoseStore for InMemoryPoseStore {
    async fn fetch_many(&self, ids: &[PoseId]) -> Result<Vec<PoseRecord>, StoreError> {
        let poses = self.read();
        Ok(ids
            .iter()
            .filter_map(|id| poses.get(id))
            .filter(|pose| pose.is_live())
            .cloned()
            .collect())
    }

    async fn all_active(&self) -> Result<Vec<PoseRecord>, StoreError> {
        Ok(self
            .read()
            .values()
            .filter(|pose| pose.is_live())
            .cloned()
            .collect())
    }
}
