//! YAML configuration for a PoseLens engine.
//!
//! One file configures every component the [`Engine`](crate::Engine) wires
//! together. All sections are optional and fall back to their defaults, so an
//! empty file is a valid configuration.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//!
//! index:
//!   path: "data/poses.idx"
//!   ann:
//!     m: 16
//!     ef_search: 64
//!
//! catalog:
//!   path: "data/poses.json"
//!
//! embedder:
//!   mode: "api"
//!   model_name: "text-embedding-3-small"
//!   dimension: 1536
//!   api_url: "https://api.openai.com/v1/embeddings"
//!   api_key_env: "OPENAI_API_KEY"
//!
//! planner:
//!   default_min_similarity: 0.3
//!   max_widenings: 4
//!
//! coordinator:
//!   vector_timeout_ms: 3000
//!   lexical_timeout_ms: 2000
//!
//! health:
//!   ttl_secs: 30
//!   failure_threshold: 3
//!
//! lexical:
//!   synonyms_path: "data/synonyms.json"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use index::ann::AnnConfig;
use index::CompressionConfig;
use retrieval::{
    CoordinatorConfig, HealthConfig, HistoryConfig, LexicalConfig, PlannerConfig, SuggestConfig,
};
use semantic::EmbedderConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),

    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Configuration format version
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub index: IndexSection,

    #[serde(default)]
    pub catalog: CatalogSection,

    #[serde(default = "default_embedder")]
    pub embedder: EmbedderConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub lexical: LexicalConfig,

    #[serde(default)]
    pub suggest: SuggestConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub history: HistoryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            name: None,
            index: IndexSection::default(),
            catalog: CatalogSection::default(),
            embedder: default_embedder(),
            planner: PlannerConfig::default(),
            coordinator: CoordinatorConfig::default(),
            lexical: LexicalConfig::default(),
            suggest: SuggestConfig::default(),
            health: HealthConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigLoadError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.index.validate()?;
        self.embedder
            .validate()
            .map_err(|err| ConfigLoadError::Validation(format!("embedder: {err}")))?;
        self.planner
            .validate()
            .map_err(|err| ConfigLoadError::Validation(format!("planner: {err}")))?;
        if self.coordinator.vector_timeout_ms == 0 || self.coordinator.lexical_timeout_ms == 0 {
            return Err(ConfigLoadError::Validation(
                "coordinator timeouts must be >= 1ms".to_string(),
            ));
        }
        if self.health.failure_threshold == 0 {
            return Err(ConfigLoadError::Validation(
                "health.failure_threshold must be >= 1".to_string(),
            ));
        }
        if self.history.capacity == 0 {
            return Err(ConfigLoadError::Validation(
                "history.capacity must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the embedding index lives and how it is searched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    /// Index file produced by the offline builder. Without one the engine
    /// starts in keyword-only mode and reports itself not ready.
    pub path: Option<PathBuf>,
    pub ann: AnnConfig,
    pub compression: CompressionConfig,
}

impl IndexSection {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.ann.max_results == 0 {
            return Err(ConfigLoadError::Validation(
                "index.ann.max_results must be >= 1".to_string(),
            ));
        }
        if self.ann.m == 0 {
            return Err(ConfigLoadError::Validation(
                "index.ann.m must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pose catalog: a JSON array of pose records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    pub path: Option<PathBuf>,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_embedder() -> EmbedderConfig {
    EmbedderConfig::default()
}
