//! Query interpretation for the AI search surface.
//!
//! [`IntentAnalyzer`] is the seam for an LLM-backed interpreter; the bundled
//! [`KeywordIntentAnalyzer`] recognises the catalog's scene, angle and tag
//! vocabulary by substring.

use async_trait::async_trait;
use serde::Serialize;

use crate::lexical::normalize_query;
use crate::SearchError;

/// Structured reading of a free-text query.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SearchIntent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle: Option<String>,
    pub mood_tags: Vec<String>,
    pub pose_tags: Vec<String>,
    pub style_tags: Vec<String>,
    pub prop_tags: Vec<String>,
    /// Query text used for matching.
    pub keywords: Vec<String>,
}

impl SearchIntent {
    pub fn has_filters(&self) -> bool {
        self.scene_category.is_some()
            || self.angle.is_some()
            || !self.mood_tags.is_empty()
            || !self.pose_tags.is_empty()
            || !self.style_tags.is_empty()
            || !self.prop_tags.is_empty()
    }

    /// Human-readable summary of what was recognised.
    pub fn explanation(&self) -> String {
        let mut parts = Vec::new();
        if let Some(scene) = &self.scene_category {
            parts.push(format!("scene {scene}"));
        }
        if let Some(angle) = &self.angle {
            parts.push(format!("angle {angle}"));
        }
        for (label, tags) in [
            ("mood", &self.mood_tags),
            ("pose", &self.pose_tags),
            ("style", &self.style_tags),
            ("props", &self.prop_tags),
        ] {
            if !tags.is_empty() {
                parts.push(format!("{label} {}", tags.join("/")));
            }
        }
        if parts.is_empty() {
            format!("matched by keywords: {}", self.keywords.join(" "))
        } else {
            format!("recognised {}", parts.join(", "))
        }
    }
}

#[async_trait]
pub trait IntentAnalyzer: Send + Sync {
    async fn analyze(&self, query: &str) -> Result<SearchIntent, SearchError>;
}

/// Alias -> canonical scene category.
const SCENE_ALIASES: &[(&str, &str)] = &[
    ("室内", "室内"),
    ("家居", "室内"),
    ("工作室", "室内"),
    ("房间", "室内"),
    ("户外", "户外"),
    ("室外", "户外"),
    ("公园", "户外"),
    ("街道", "户外"),
    ("自然", "户外"),
    ("咖啡厅", "咖啡厅"),
    ("咖啡馆", "咖啡厅"),
    ("茶室", "咖啡厅"),
    ("餐厅", "咖啡厅"),
    ("商场", "商场"),
    ("购物中心", "商场"),
    ("商店", "商场"),
    ("学校", "学校"),
    ("校园", "学校"),
    ("教室", "学校"),
    ("图书馆", "学校"),
    ("办公室", "办公室"),
    ("公司", "办公室"),
    ("海边", "海边"),
    ("海滩", "海边"),
    ("沙滩", "海边"),
    ("森林", "森林"),
    ("树林", "森林"),
    ("城市", "城市"),
    ("都市", "城市"),
    ("街景", "城市"),
];

const ANGLE_ALIASES: &[(&str, &str)] = &[
    ("正面", "正面"),
    ("正脸", "正面"),
    ("侧面", "侧面"),
    ("侧身", "侧面"),
    ("侧脸", "侧面"),
    ("背面", "背面"),
    ("背影", "背面"),
    ("俯视", "俯视"),
    ("俯拍", "俯视"),
    ("仰视", "仰视"),
    ("仰拍", "仰视"),
    ("斜角", "斜角"),
    ("斜拍", "斜角"),
];

const MOOD_KEYWORDS: &[&str] = &["清新", "文艺", "性感", "可爱", "优雅", "温柔", "活泼", "安静", "俏皮"];
const POSE_KEYWORDS: &[&str] = &["坐姿", "站立", "站姿", "躺下", "行走", "倚靠", "蹲着"];
const STYLE_KEYWORDS: &[&str] = &["日系", "韩系", "复古", "现代", "简约", "欧美"];
const PROP_KEYWORDS: &[&str] = &["咖啡", "书", "花", "帽子", "眼镜", "包"];

#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordIntentAnalyzer;

impl KeywordIntentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze_text(&self, query: &str) -> SearchIntent {
        let normalized = normalize_query(query);
        SearchIntent {
            scene_category: longest_alias(&normalized, SCENE_ALIASES),
            angle: longest_alias(&normalized, ANGLE_ALIASES),
            mood_tags: contained(&normalized, MOOD_KEYWORDS),
            pose_tags: contained(&normalized, POSE_KEYWORDS),
            style_tags: contained(&normalized, STYLE_KEYWORDS),
            prop_tags: contained(&normalized, PROP_KEYWORDS),
            keywords: vec![normalized],
        }
    }
}

#[async_trait]
impl IntentAnalyzer for KeywordIntentAnalyzer {
    async fn analyze(&self, query: &str) -> Result<SearchIntent, SearchError> {
        let intent = self.analyze_text(query);
        if intent.keywords.iter().all(|k| k.is_empty()) {
            return Err(SearchError::invalid("query is empty after normalization"));
        }
        Ok(intent)
    }
}

fn longest_alias(text: &str, aliases: &[(&str, &str)]) -> Option<String> {
    aliases
        .iter()
        .filter(|(alias, _)| text.contains(alias))
        .max_by_key(|(alias, _)| alias.chars().count())
        .map(|(_, canonical)| (*canonical).to_string())
}

fn contained(text: &str, keywords: &[&str]) -> Vec<String> {
    keywords
        .iter()
        .filter(|k| text.contains(*k))
        .map(|k| (*k).to_string())
        .collect()
}
