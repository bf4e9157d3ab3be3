use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::StoreError;

/// `term` and `synonym` are interchangeable with confidence `weight` in (0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynonymEdge {
    pub term: String,
    pub synonym: String,
    pub weight: f32,
}

const BUILTIN_EDGES: &[(&str, &str, f32)] = &[
    ("写真", "拍照", 0.9),
    ("写真", "摄影", 0.85),
    ("写真", "人像", 0.7),
    ("美女", "女生", 0.9),
    ("美女", "女孩", 0.85),
    ("美女", "女性", 0.7),
    ("室内", "屋内", 0.9),
    ("室内", "房间内", 0.8),
    ("户外", "室外", 0.95),
    ("户外", "外景", 0.8),
    ("咖啡厅", "咖啡馆", 0.95),
    ("咖啡厅", "咖啡店", 0.9),
    ("坐姿", "坐着", 0.9),
    ("坐姿", "坐下", 0.8),
    ("站姿", "站着", 0.9),
    ("站姿", "站立", 0.9),
];

/// Read-only synonym graph. Edges are stored in both directions.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    adjacency: BTreeMap<String, Vec<(String, f32)>>,
}

impl SynonymTable {
    pub fn builtin() -> Self {
        Self::from_edges(BUILTIN_EDGES.iter().map(|(term, synonym, weight)| SynonymEdge {
            term: (*term).to_string(),
            synonym: (*synonym).to_string(),
            weight: *weight,
        }))
    }

    /// Edges with a weight outside (0, 1] or a blank side are skipped.
    pub fn from_edges(edges: impl IntoIterator<Item = SynonymEdge>) -> Self {
        let mut adjacency: BTreeMap<String, Vec<(String, f32)>> = BTreeMap::new();
        for edge in edges {
            let term = edge.term.trim().to_lowercase();
            let synonym = edge.synonym.trim().to_lowercase();
            if term.is_empty() || synonym.is_empty() || term == synonym {
                continue;
            }
            if !(edge.weight > 0.0 && edge.weight <= 1.0) {
                tracing::warn!(term = %term, synonym = %synonym, weight = edge.weight, "skipping synonym edge with bad weight");
                continue;
            }
            link(&mut adjacency, &term, &synonym, edge.weight);
            link(&mut adjacency, &synonym, &term, edge.weight);
        }
        for neighbours in adjacency.values_mut() {
            neighbours.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });
        }
        Self { adjacency }
    }

    /// Load a JSON array of [`SynonymEdge`]s.
    pub fn load_json(path: &Path) -> Result<Self, StoreError> {
        let bytes = std::fs::read(path)?;
        let edges: Vec<SynonymEdge> = serde_json::from_slice(&bytes)?;
        let table = Self::from_edges(edges);
        tracing::info!(path = %path.display(), terms = table.len(), "loaded synonym table");
        Ok(table)
    }

    /// Synonyms of `term` with weight at least `min_weight`, strongest first.
    pub fn expand(&self, term: &str, min_weight: f32) -> Vec<(&str, f32)> {
        self.adjacency
            .get(term)
            .map(|neighbours| {
                neighbours
                    .iter()
                    .filter(|(_, weight)| *weight >= min_weight)
                    .map(|(synonym, weight)| (synonym.as_str(), *weight))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.adjacency.contains_key(term)
    }

    /// Every known term with its strongest edge weight.
    pub fn terms(&self) -> impl Iterator<Item = (&str, f32)> + '_ {
        self.adjacency.iter().map(|(term, neighbours)| {
            let best = neighbours.first().map(|(_, w)| *w).unwrap_or(0.0);
            (term.as_str(), best)
        })
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }
}

fn link(adjacency: &mut BTreeMap<String, Vec<(String, f32)>>, from: &str, to: &str, weight: f32) {
    let neighbours = adjacency.entry(from.to_string()).or_default();
    match neighbours.iter_mut().find(|(existing, _)| existing == to) {
        Some(entry) => entry.1 = entry.1.max(weight),
        None => neighbours.push((to.to_string(), weight)),
    }
}
