use crate::processing::{ChunkMethod, ChunkOptions};
use std::collections::HashMap;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Configuration was already installed in the global cache.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Backend used to embed sentences for semantic chunking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Deterministic in-process hashing embeddings.
    Hashing,
    /// Local Ollama runtime.
    Ollama,
    /// No similarity backend; semantic chunking falls back to token windows.
    None,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "ollama" => Ok(Self::Ollama),
            "none" | "off" => Ok(Self::None),
            _ => Err(()),
        }
    }
}

/// Runtime configuration for the summarization pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Provider used when a request does not name one.
    pub default_provider: String,
    /// Default chunking policy applied to every document.
    pub chunk_options: ChunkOptions,
    /// Maximum number of chunk calls in flight for one document.
    pub chunk_concurrency: usize,
    /// Size above which a joined summary is re-chunked and reduced again.
    pub reduce_threshold: usize,
    /// Upper bound on reduction rounds.
    pub reduce_max_depth: usize,
    /// Total provider invocations allowed per chunk (first try included).
    pub max_retries: u32,
    /// Fixed delay between retry attempts.
    pub retry_delay: Duration,
    /// Per-request HTTP timeout applied by every provider adapter.
    pub http_timeout: Duration,
    /// Similarity backend used by semantic chunking.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model passed to the similarity backend.
    pub embedding_model: String,
    /// Dimensionality of hashing embeddings.
    pub embedding_dimension: usize,
    /// Cosine similarity below which semantic chunking opens a new chunk.
    pub semantic_threshold: f32,
    /// Base URL of the local Ollama runtime.
    pub ollama_url: String,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        let chunk_options = ChunkOptions::default();
        Self {
            default_provider: "openai".into(),
            reduce_threshold: chunk_options.max_size,
            chunk_options,
            chunk_concurrency: 1,
            reduce_max_depth: 4,
            max_retries: 3,
            retry_delay: Duration::from_millis(5000),
            http_timeout: Duration::from_secs(120),
            embedding_provider: EmbeddingProvider::Hashing,
            embedding_model: "nomic-embed-text".into(),
            embedding_dimension: 256,
            semantic_threshold: 0.5,
            ollama_url: "http://127.0.0.1:11434".into(),
            server_port: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults for unset keys.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let method = match load_env_optional("CONDENSE_CHUNK_METHOD") {
            Some(value) => value
                .parse::<ChunkMethod>()
                .map_err(|()| ConfigError::InvalidValue("CONDENSE_CHUNK_METHOD".into()))?,
            None => defaults.chunk_options.method,
        };
        let max_size =
            parse_env("CONDENSE_CHUNK_MAX_SIZE")?.unwrap_or(defaults.chunk_options.max_size);
        let overlap =
            parse_env("CONDENSE_CHUNK_OVERLAP")?.unwrap_or(defaults.chunk_options.overlap);
        if max_size == 0 || overlap >= max_size {
            return Err(ConfigError::InvalidValue("CONDENSE_CHUNK_OVERLAP".into()));
        }
        let chunk_options = ChunkOptions {
            method,
            max_size,
            overlap,
            language: load_env_optional("CONDENSE_CHUNK_LANGUAGE")
                .unwrap_or(defaults.chunk_options.language),
            ..defaults.chunk_options
        };

        Ok(Self {
            default_provider: load_env_optional("CONDENSE_DEFAULT_PROVIDER")
                .map(|value| value.to_lowercase())
                .unwrap_or(defaults.default_provider),
            reduce_threshold: parse_env("CONDENSE_REDUCE_THRESHOLD")?.unwrap_or(max_size),
            chunk_options,
            chunk_concurrency: parse_env("CONDENSE_CHUNK_CONCURRENCY")?
                .unwrap_or(defaults.chunk_concurrency)
                .max(1),
            reduce_max_depth: parse_env("CONDENSE_REDUCE_MAX_DEPTH")?
                .unwrap_or(defaults.reduce_max_depth),
            max_retries: parse_env("CONDENSE_MAX_RETRIES")?
                .unwrap_or(defaults.max_retries)
                .max(1),
            retry_delay: parse_env("CONDENSE_RETRY_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            http_timeout: parse_env("CONDENSE_HTTP_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            embedding_provider: match load_env_optional("CONDENSE_EMBEDDING_PROVIDER") {
                Some(value) => value.parse().map_err(|()| {
                    ConfigError::InvalidValue("CONDENSE_EMBEDDING_PROVIDER".into())
                })?,
                None => defaults.embedding_provider,
            },
            embedding_model: load_env_optional("CONDENSE_EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_env("CONDENSE_EMBEDDING_DIMENSION")?
                .unwrap_or(defaults.embedding_dimension),
            semantic_threshold: parse_env("CONDENSE_SEMANTIC_THRESHOLD")?
                .unwrap_or(defaults.semantic_threshold),
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            server_port: parse_env("SERVER_PORT")?,
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Read-only key/value lookup used for credentials, model names, and endpoint overrides.
///
/// Sections used by the pipeline are `api_keys`, `models`, and `endpoints`, each keyed by the
/// lower-case provider name. Empty values are treated as absent by every implementation.
pub trait ConfigStore: Send + Sync {
    /// Look up `key` inside `section`.
    fn get(&self, section: &str, key: &str) -> Option<String>;
}

/// Config store backed by process environment variables.
///
/// `api_keys/openai` maps to `OPENAI_API_KEY`, `models/openai` to `OPENAI_MODEL`,
/// `endpoints/openai` to `OPENAI_BASE_URL`; any other section maps to `<SECTION>_<KEY>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvConfigStore;

impl EnvConfigStore {
    /// Environment variable consulted for a section/key pair.
    pub fn variable_name(section: &str, key: &str) -> String {
        let key = env_token(key);
        match section {
            "api_keys" => format!("{key}_API_KEY"),
            "models" => format!("{key}_MODEL"),
            "endpoints" => format!("{key}_BASE_URL"),
            other => format!("{}_{key}", env_token(other)),
        }
    }
}

fn env_token(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

impl ConfigStore for EnvConfigStore {
    fn get(&self, section: &str, key: &str) -> Option<String> {
        load_env_optional(&Self::variable_name(section, key))
    }
}

/// In-memory config store, mostly useful for embedding the pipeline and for tests.
#[derive(Debug, Default, Clone)]
pub struct MapConfigStore {
    values: HashMap<(String, String), String>,
}

impl MapConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, section: &str, key: &str, value: impl Into<String>) -> Self {
        self.insert(section, key, value);
        self
    }

    /// Insert or replace a value; keys are case-insensitive.
    pub fn insert(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.values
            .insert((section.to_lowercase(), key.to_lowercase()), value.into());
    }
}

impl ConfigStore for MapConfigStore {
    fn get(&self, section: &str, key: &str) -> Option<String> {
        self.values
            .get(&(section.to_lowercase(), key.to_lowercase()))
            .filter(|value| !value.trim().is_empty())
            .cloned()
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, or defaults when initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        default_provider = %config.default_provider,
        chunk_method = ?config.chunk_options.method,
        chunk_max_size = config.chunk_options.max_size,
        chunk_overlap = config.chunk_options.overlap,
        max_retries = config.max_retries,
        embedding_provider = ?config.embedding_provider,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    Ok(get_config())
}
