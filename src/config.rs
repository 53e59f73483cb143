use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub collections: CollectionsConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingSpaces,
    #[serde(default)]
    pub ingest: IngestConfig,
    pub server: ServerConfig,
}

/// Which backend holds the vector collections.
///
/// An explicit value passed at construction rather than an ambient
/// environment lookup, so tests can build a store without process-wide state.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    Local,
    Cloud,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_mode")]
    pub mode: StoreMode,
    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,
    /// Cloud API key; falls back to the CHROMA_API_KEY environment variable.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default = "default_tenant")]
    pub tenant: String,
    #[serde(default = "default_cloud_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_store_mode() -> StoreMode {
    StoreMode::Local
}
fn default_local_path() -> PathBuf {
    PathBuf::from("data/vectors/mindfield.sqlite")
}
fn default_tenant() -> String {
    "default_tenant".to_string()
}
fn default_cloud_url() -> String {
    "https://api.trychroma.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectionsConfig {
    #[serde(default = "default_orientation_collection")]
    pub orientation: String,
    #[serde(default = "default_texture_collection")]
    pub texture: String,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            orientation: default_orientation_collection(),
            texture: default_texture_collection(),
        }
    }
}

fn default_orientation_collection() -> String {
    "mindfield_compasses_large_v2".to_string()
}
fn default_texture_collection() -> String {
    "mindfield_fragments_v2".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Nearest neighbors requested from each collection per query.
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
    5
}

/// One embedding configuration per hemisphere. The two spaces have
/// different models and dimensionalities and are never interchangeable.
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingSpaces {
    #[serde(default = "default_texture_embedding")]
    pub texture: EmbeddingConfig,
    #[serde(default = "default_orientation_embedding")]
    pub orientation: EmbeddingConfig,
}

impl Default for EmbeddingSpaces {
    fn default() -> Self {
        Self {
            texture: default_texture_embedding(),
            orientation: default_orientation_embedding(),
        }
    }
}

fn default_texture_embedding() -> EmbeddingConfig {
    EmbeddingConfig {
        provider: "local".to_string(),
        model: Some("bge-large-en-v1.5".to_string()),
        dims: Some(1024),
        batch_size: default_batch_size(),
        max_retries: default_max_retries(),
        timeout_secs: default_timeout_secs(),
    }
}

fn default_orientation_embedding() -> EmbeddingConfig {
    EmbeddingConfig {
        provider: "openai".to_string(),
        model: Some("text-embedding-3-large".to_string()),
        dims: Some(3072),
        batch_size: default_batch_size(),
        max_retries: default_max_retries(),
        timeout_secs: default_timeout_secs(),
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,
    #[serde(default = "default_geometry_dir")]
    pub geometry_dir: PathBuf,
    #[serde(default = "default_fragments_out")]
    pub fragments_out: PathBuf,
    #[serde(default = "default_compasses_out")]
    pub compasses_out: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            raw_dir: default_raw_dir(),
            geometry_dir: default_geometry_dir(),
            fragments_out: default_fragments_out(),
            compasses_out: default_compasses_out(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("data/raw_md")
}
fn default_geometry_dir() -> PathBuf {
    PathBuf::from("data/raw_geometry_json")
}
fn default_fragments_out() -> PathBuf {
    PathBuf::from("data/processed/archive.jsonl")
}
fn default_compasses_out() -> PathBuf {
    PathBuf::from("data/processed/abstracts.jsonl")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.store.mode == StoreMode::Cloud && config.store.database.is_none() {
        anyhow::bail!("store.database must be set when store.mode is 'cloud'");
    }

    for (space, embedding) in [
        ("texture", &config.embedding.texture),
        ("orientation", &config.embedding.orientation),
    ] {
        match embedding.provider.as_str() {
            "openai" | "local" => {}
            other => anyhow::bail!(
                "Unknown embedding provider for {}: '{}'. Must be openai or local.",
                space,
                other
            ),
        }
        if embedding.model.is_none() {
            anyhow::bail!("embedding.{}.model must be specified", space);
        }
        if embedding.dims.is_none() || embedding.dims == Some(0) {
            anyhow::bail!("embedding.{}.dims must be > 0", space);
        }
        if embedding.batch_size == 0 {
            anyhow::bail!("embedding.{}.batch_size must be > 0", space);
        }
    }

    Ok(())
}
