//! TOML configuration parsing and validation.
//!
//! All settings are carried in an explicit [`Config`] struct passed by
//! reference into component constructors. There is no process-wide
//! configuration state.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            storage: StorageConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

/// Embedding provider selection and cloud API settings.
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"openai"`, `"hf"`, or `"lexical"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Cloud model name (e.g. `"text-embedding-3-small"`).
    #[serde(default = "default_model")]
    pub model: String,
    /// Hugging Face model name for the `hf` provider.
    #[serde(default = "default_hf_model")]
    pub hf_model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            hf_model: default_hf_model(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "lexical".to_string()
}
fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_hf_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Durable storage settings for the persistent dense index.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// SQLite database path for the persisted index.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// What to do when a write-through save fails: `"warn"` keeps serving
    /// from memory, `"fail"` propagates the error.
    #[serde(default = "default_persist_policy")]
    pub on_persist_error: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            on_persist_error: default_persist_policy(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/medrag.sqlite")
}
fn default_persist_policy() -> String {
    "warn".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Default number of results per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    6
}

/// Load a configuration file, validating cross-field constraints.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load the config at `path` when it exists, otherwise fall back to defaults.
///
/// Used by the CLI so that demo runs work without a config file.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        let config = Config::default();
        validate(&config)?;
        Ok(config)
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.chunk_overlap ({}) must be less than chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "openai" | "hf" | "lexical" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be openai, hf, or lexical.",
            other
        ),
    }

    match config.storage.on_persist_error.as_str() {
        "warn" | "fail" => {}
        other => anyhow::bail!(
            "Unknown persist-error policy: '{}'. Must be warn or fail.",
            other
        ),
    }

    Ok(())
}
