use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::srs::types::{DEFAULT_EASE, MIN_EASE};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MentorConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub srs: SrsConfig,
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SrsConfig {
    pub default_ease: f64,
    pub new_items_per_day: usize,
    pub due_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    pub path: String,
    pub dimension: usize,
    pub persist_every: usize,
    pub search_k: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub endpoint: String,
    pub api_key: String,
    pub task_type: String,
    pub timeout_secs: u64,
}

impl Default for MentorConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            srs: SrsConfig::default(),
            index: IndexConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_mentor_dir()
            .join("mentor.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for SrsConfig {
    fn default() -> Self {
        Self {
            default_ease: DEFAULT_EASE,
            new_items_per_day: 50,
            due_limit: 50,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        let path = default_mentor_dir()
            .join("vector_index")
            .join("index.bin")
            .to_string_lossy()
            .into_owned();
        Self {
            path,
            dimension: crate::index::DEFAULT_DIMENSION,
            persist_every: 100,
            search_k: 10,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".into(),
            model: "embedding-001".into(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".into(),
            api_key: String::new(),
            task_type: "RETRIEVAL_DOCUMENT".into(),
            timeout_secs: 30,
        }
    }
}

/// Returns `~/.gre-mentor/`
pub fn default_mentor_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gre-mentor")
}

/// Returns the default config file path: `~/.gre-mentor/config.toml`
pub fn default_config_path() -> PathBuf {
    default_mentor_dir().join("config.toml")
}

impl MentorConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides and validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MentorConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MENTOR_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("MENTOR_INDEX_PATH") {
            self.index.path = val;
        }
        if let Ok(val) = std::env::var("MENTOR_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("MENTOR_EMBEDDING_PROVIDER") {
            self.embedding.provider = val;
        }
        if let Ok(val) = std::env::var("GEMINI_API_KEY") {
            self.embedding.api_key = val;
        }
    }

    /// Reject values the scheduler or index cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.srs.default_ease >= MIN_EASE) {
            bail!(
                "srs.default_ease must be at least {MIN_EASE}, got {}",
                self.srs.default_ease
            );
        }
        if self.index.dimension == 0 {
            bail!("index.dimension must be greater than zero");
        }
        if self.index.persist_every == 0 {
            bail!("index.persist_every must be greater than zero");
        }
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// Resolve the vector index file path, expanding `~` if needed.
    pub fn resolved_index_path(&self) -> PathBuf {
        expand_tilde(&self.index.path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
