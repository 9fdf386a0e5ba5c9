//! Configuration loading.
//!
//! Settings come from an optional TOML file, then from environment
//! variables, then are validated. Every section has defaults suitable for
//! local development, so a missing config file is not an error.
//!
//! | Variable | Setting | Default |
//! |----------|---------|---------|
//! | `POSTGRES_USER` | `db.user` | `postgres` |
//! | `POSTGRES_PASSWORD` | `db.password` | `root` |
//! | `POSTGRES_HOST` | `db.host` | `localhost` |
//! | `POSTGRES_PORT` | `db.port` | `5432` |
//! | `POSTGRES_DB` | `db.database` | `humble_data` |
//! | `MODEL_PATH` | `embedding.cache_dir` | fastembed default |

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use bundle_search_core::models::VECTOR_DIMENSION;
use bundle_search_core::query::{QueryParams, DISTANCE_THRESHOLD, RESULT_LIMIT};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub intent: IntentConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DbConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            user: "postgres".to_string(),
            password: "root".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            database: "humble_data".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Where the local model is downloaded and cached (`MODEL_PATH`).
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    /// Unit-normalise local model output.
    #[serde(default)]
    pub normalize: bool,
}

impl EmbeddingConfig {
    /// Whether every vector this provider returns has length 1.
    ///
    /// Two unit vectors are never more than 2 apart under `<->`.
    pub fn unit_vectors(&self) -> bool {
        self.normalize || self.provider == "ollama"
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            cache_dir: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: 0,
            timeout_secs: default_embedding_timeout(),
            normalize: false,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_model() -> String {
    "paraphrase-multilingual-mpnet-base-v2".to_string()
}
fn default_dims() -> usize {
    VECTOR_DIMENSION
}
fn default_batch_size() -> usize {
    32
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IntentConfig {
    #[serde(default = "default_intent_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Prompt template with a `{{USER_QUERY}}` placeholder. The built-in
    /// prompt is used when unset.
    #[serde(default)]
    pub prompt_path: Option<PathBuf>,
    #[serde(default = "default_intent_timeout")]
    pub timeout_secs: u64,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            model: default_intent_model(),
            max_tokens: default_max_tokens(),
            api_url: default_api_url(),
            prompt_path: None,
            timeout_secs: default_intent_timeout(),
        }
    }
}

fn default_intent_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_api_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_intent_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub distance_threshold: f64,
    pub limit: i64,
    /// Prefix joined with each bundle's relative `url` to build its link.
    pub link_base_url: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            distance_threshold: DISTANCE_THRESHOLD,
            limit: RESULT_LIMIT,
            link_base_url: "https://www.humblebundle.com".to_string(),
        }
    }
}

impl SearchConfig {
    pub fn query_params(&self) -> QueryParams {
        QueryParams {
            distance_threshold: self.distance_threshold,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub data_dir: PathBuf,
    pub file_glob: String,
    pub cache_path: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            file_glob: "bundles-*.jsonl".to_string(),
            cache_path: PathBuf::from("/vector_cache/cache.json"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8501".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Apply environment overrides. `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("POSTGRES_USER") {
            self.db.user = v;
        }
        if let Some(v) = lookup("POSTGRES_PASSWORD") {
            self.db.password = v;
        }
        if let Some(v) = lookup("POSTGRES_HOST") {
            self.db.host = v;
        }
        if let Some(v) = lookup("POSTGRES_PORT") {
            self.db.port = v
                .parse()
                .with_context(|| format!("POSTGRES_PORT is not a valid port: '{}'", v))?;
        }
        if let Some(v) = lookup("POSTGRES_DB") {
            self.db.database = v;
        }
        if let Some(v) = lookup("MODEL_PATH") {
            self.embedding.cache_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding.dims == 0 {
            bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        match self.embedding.provider.as_str() {
            "local" | "ollama" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be local or ollama.",
                other
            ),
        }
        if self.search.distance_threshold <= 0.0 {
            bail!("search.distance_threshold must be > 0");
        }
        if self.embedding.unit_vectors() && self.search.distance_threshold >= 2.0 {
            bail!(
                "search.distance_threshold must be < 2 with unit-length embeddings \
                 (provider '{}', normalize = {}); got {}",
                self.embedding.provider,
                self.embedding.normalize,
                self.search.distance_threshold
            );
        }
        if self.search.limit < 1 {
            bail!("search.limit must be >= 1");
        }
        if self.ingest.file_glob.trim().is_empty() {
            bail!("ingest.file_glob must not be empty");
        }
        Ok(())
    }
}

/// Load configuration from `path` (if it exists) and the process environment.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration TOML without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}
