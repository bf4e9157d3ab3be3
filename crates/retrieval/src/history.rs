use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use hashbrown::HashMap;
use serde::Serialize;

use crate::config::HistoryConfig;
use crate::lexical::normalize_query;
use crate::types::ModeUsed;

/// One completed search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub query: String,
    pub normalized_query: String,
    pub results_count: usize,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub mode_used: ModeUsed,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(query: &str, results_count: usize, response_time_ms: u64, mode_used: ModeUsed) -> Self {
        Self {
            query: query.trim().to_string(),
            normalized_query: normalize_query(query),
            results_count,
            response_time_ms,
            category: None,
            mode_used,
            created_at: Utc::now(),
        }
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopularQuery {
    pub query: String,
    pub count: u64,
}

/// Bounded in-memory log of recent searches.
#[derive(Debug)]
pub struct SearchHistory {
    cfg: HistoryConfig,
    entries: Mutex<VecDeque<HistoryEntry>>,
}

impl SearchHistory {
    pub fn new(cfg: HistoryConfig) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(cfg.capacity.min(1024))),
            cfg,
        }
    }

    /// Append an entry, evicting the oldest beyond capacity. Blank queries
    /// are ignored.
    pub fn record(&self, entry: HistoryEntry) {
        if entry.normalized_query.is_empty() || self.cfg.capacity == 0 {
            return;
        }
        let mut entries = self.lock();
        while entries.len() >= self.cfg.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Most frequent queries within the configured window, most searched
    /// first, ties by query text.
    pub fn popular(&self, limit: usize) -> Vec<PopularQuery> {
        self.popular_since(Utc::now() - Duration::days(self.cfg.popular_window_days), limit)
    }

    pub fn popular_since(&self, since: DateTime<Utc>, limit: usize) -> Vec<PopularQuery> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for entry in self.lock().iter().filter(|e| e.created_at >= since) {
            *counts.entry(entry.normalized_query.clone()).or_default() += 1;
        }
        let mut popular: Vec<PopularQuery> = counts
            .into_iter()
            .map(|(query, count)| PopularQuery { query, count })
            .collect();
        popular.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.query.cmp(&b.query)));
        popular.truncate(limit);
        popular
    }

    /// Distinct normalized queries with every timestamp they were searched at.
    pub fn occurrences(&self) -> HashMap<String, Vec<DateTime<Utc>>> {
        let mut seen: HashMap<String, Vec<DateTime<Utc>>> = HashMap::new();
        for entry in self.lock().iter() {
            seen.entry(entry.normalized_query.clone())
                .or_default()
                .push(entry.created_at);
        }
        seen
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<HistoryEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SearchHistory {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_evicts_oldest() {
        let history = SearchHistory::new(HistoryConfig {
            capacity: 2,
            ..Default::default()
        });
        for q in ["a", "b", "c"] {
            history.record(HistoryEntry::new(q, 1, 5, ModeUsed::Vector));
        }
        assert_eq!(history.len(), 2);
        assert!(!history.occurrences().contains_key("a"));
    }

    #[test]
    fn popular_counts_normalized_queries_in_window() {
        let history = SearchHistory::default();
        let now = Utc::now();
        history.record(HistoryEntry::new("咖啡厅 拍照", 3, 10, ModeUsed::Vector).at(now));
        history.record(HistoryEntry::new("咖啡厅，拍照!", 3, 10, ModeUsed::Lexical).at(now));
        history.record(HistoryEntry::new("户外", 3, 10, ModeUsed::Vector).at(now));
        history.record(HistoryEntry::new("户外", 3, 10, ModeUsed::Vector).at(now - Duration::days(30)));
        history.record(HistoryEntry::new("站姿", 3, 10, ModeUsed::Vector).at(now));

        let popular = history.popular(2);
        assert_eq!(
            popular,
            vec![
                PopularQuery { query: "咖啡厅 拍照".into(), count: 2 },
                PopularQuery { query: "户外".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn blank_queries_are_not_recorded() {
        let history = SearchHistory::default();
        history.record(HistoryEntry::new("  ?? ", 0, 1, ModeUsed::Lexical));
        assert!(history.is_empty());
    }
}
