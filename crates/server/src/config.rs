use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum request body size in MB
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Engine YAML file; engine defaults apply when unset
    #[serde(default)]
    pub engine_config: Option<PathBuf>,

    /// Overrides `index.path` from the engine config
    #[serde(default)]
    pub index_path: Option<PathBuf>,

    /// Overrides `catalog.path` from the engine config
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,

    /// Overrides `lexical.synonyms_path` from the engine config
    #[serde(default)]
    pub synonyms_path: Option<PathBuf>,

    /// Mount `/admin/*` routes
    #[serde(default)]
    pub admin_enabled: bool,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Metrics endpoint enabled
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Upper bound for `top_k`, `target_count`, `page_size` and `max_results`
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_size_mb(),
            engine_config: None,
            index_path: None,
            catalog_path: None,
            synonyms_path: None,
            admin_enabled: false,
            enable_cors: default_true(),
            log_level: default_log_level(),
            metrics_enabled: default_true(),
            max_results: default_max_results(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `.env`, an optional `server.*` file and
    /// `POSELENS_SERVER__*` environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::with_name("server").required(false))
            // Override with environment variables
            .add_source(config::Environment::with_prefix("POSELENS_SERVER").separator("__"));

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        if config.max_results == 0 {
            anyhow::bail!("max_results must be >= 1");
        }
        Ok(config)
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get max body size in bytes
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }

    /// Engine configuration with this server's path overrides applied.
    pub fn engine(&self) -> anyhow::Result<poselens::EngineConfig> {
        let mut engine = match &self.engine_config {
            Some(path) => poselens::EngineConfig::from_file(path)?,
            None => poselens::EngineConfig::default(),
        };
        if let Some(path) = &self.index_path {
            engine.index.path = Some(path.clone());
        }
        if let Some(path) = &self.catalog_path {
            engine.catalog.path = Some(path.clone());
        }
        if let Some(path) = &self.synonyms_path {
            engine.lexical.synonyms_path = Some(path.clone());
        }
        Ok(engine)
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_body_size_mb() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_results() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.max_results, 100);
        assert!(cfg.enable_cors);
        assert!(cfg.metrics_enabled);
        assert!(!cfg.admin_enabled);
    }

    #[test]
    fn test_socket_addr() {
        let cfg = ServerConfig::default();
        let addr = cfg.socket_addr().unwrap();
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_path_overrides_apply_to_engine() {
        let cfg = ServerConfig {
            index_path: Some("/data/poses.idx".into()),
            synonyms_path: Some("/data/synonyms.json".into()),
            ..Default::default()
        };
        let engine = cfg.engine().unwrap();
        assert_eq!(engine.index.path, Some(PathBuf::from("/data/poses.idx")));
        assert_eq!(
            engine.lexical.synonyms_path,
            Some(PathBuf::from("/data/synonyms.json"))
        );
        assert!(engine.catalog.path.is_none());
    }
}
