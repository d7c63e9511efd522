//! TOML configuration and fail-fast validation.
//!
//! Every section is optional and falls back to the defaults below. Validation
//! runs inside [`load_config`], before any model or network client exists,
//! so a bad value never costs a model download or a connection.
//!
//! Only the *interpreted* pipeline settings feed the configuration
//! fingerprint (see [`Config::fingerprint_input`]); paths, endpoints,
//! timeouts and retry tuning can change freely without invalidating the
//! ingestion ledger.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::embedding;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

fn default_env() -> String {
    "dev".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PathsConfig {
    pub source_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub ledger_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("data/raw/pdfs"),
            runs_dir: PathBuf::from("data/runs"),
            ledger_dir: PathBuf::from("data/ingested"),
        }
    }
}

/// Component version tags. Bumping one re-versions the whole corpus.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub pipeline_version: String,
    pub chunker_version: String,
    pub cleaner_version: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline_version: "v1".to_string(),
            chunker_version: "chars_v1".to_string(),
            cleaner_version: "clean_v1".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_chars: usize,
    pub overlap: usize,
    /// 0 = unlimited.
    pub max_chunks_per_doc: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: 1200,
            overlap: 200,
            max_chunks_per_doc: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_normalize")]
    pub normalize: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            normalize: true,
            batch_size: 32,
            url: None,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_normalize() -> bool {
    true
}
fn default_batch_size() -> usize {
    32
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    /// Model name with the provider default applied.
    pub fn model_name(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| embedding::default_model(&self.provider).to_string())
    }

    /// Vector dimension, from config or the known-model table.
    pub fn resolved_dims(&self) -> Option<usize> {
        self.dims
            .or_else(|| embedding::known_model_dims(&self.model_name()))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    /// Case-insensitive substring filter on the file name; empty = all.
    pub only_match: String,
    /// 0 = all.
    pub max_files: usize,
    pub upsert_batch_size: usize,
    pub follow_symlinks: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: vec!["**/*.pdf".to_string()],
            exclude_globs: Vec::new(),
            only_match: String::new(),
            max_files: 0,
            upsert_batch_size: 64,
            follow_symlinks: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub url: String,
    pub collection: String,
    pub distance: String,
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            collection: "rag_collection".to_string(),
            distance: "cosine".to_string(),
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 8000,
            jitter_ms: 250,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub k_rrf: usize,
    /// Maximum points pulled from the store for hybrid ranking; 0 = the
    /// whole (filtered) collection.
    pub candidate_limit: usize,
    pub page_size: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            k_rrf: crate::fusion::DEFAULT_K_RRF,
            candidate_limit: 0,
            page_size: 128,
        }
    }
}

/// Embedding settings that change what the vectors mean.
#[derive(Debug, Serialize)]
pub struct EmbeddingFingerprint {
    pub provider: String,
    pub model: String,
    pub dims: Option<usize>,
    pub normalize: bool,
    pub batch_size: usize,
}

/// The interpreted configuration hashed into the config fingerprint.
#[derive(Debug, Serialize)]
pub struct FingerprintInput<'a> {
    pub pipeline: &'a PipelineConfig,
    pub chunking: &'a ChunkingConfig,
    pub embedding: EmbeddingFingerprint,
    pub ingest: &'a IngestConfig,
    pub distance: String,
}

const ENVS: &[&str] = &["dev", "staging", "prod", "test"];
const DISTANCES: &[&str] = &["cosine", "dot", "euclid"];
const PROVIDERS: &[&str] = &["openai", "ollama", "local"];

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !ENVS.contains(&self.env.to_lowercase().as_str()) {
            bail!("env must be one of {:?}, got '{}'", ENVS, self.env);
        }

        // Chunking
        if self.chunking.chunk_chars == 0 {
            bail!("chunking.chunk_chars must be > 0");
        }
        if self.chunking.overlap >= self.chunking.chunk_chars {
            bail!(
                "chunking.overlap must be < chunking.chunk_chars (overlap={}, chunk_chars={})",
                self.chunking.overlap,
                self.chunking.chunk_chars
            );
        }

        // Embedding
        if !PROVIDERS.contains(&self.embedding.provider.as_str()) {
            bail!(
                "Unknown embedding provider: '{}'. Must be openai, ollama, or local.",
                self.embedding.provider
            );
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be >= 1");
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }
        if self.embedding.provider != "local" && self.embedding.resolved_dims().is_none() {
            bail!(
                "embedding.dims must be set when provider is '{}'",
                self.embedding.provider
            );
        }

        // Ingest
        if self.ingest.upsert_batch_size == 0 {
            bail!("ingest.upsert_batch_size must be >= 1");
        }
        if self.ingest.include_globs.is_empty() {
            bail!("ingest.include_globs must not be empty");
        }

        // Vector store
        let distance = self.vector_store.distance.to_lowercase();
        if !DISTANCES.contains(&distance.as_str()) {
            bail!(
                "vector_store.distance must be one of {:?}, got '{}'",
                DISTANCES,
                self.vector_store.distance
            );
        }
        if self.vector_store.collection.trim().is_empty() {
            bail!("vector_store.collection must not be empty");
        }

        // Retry
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be >= 1");
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            bail!("retry.max_delay_ms must be >= retry.base_delay_ms");
        }

        // Retrieval
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.retrieval.k_rrf == 0 {
            bail!("retrieval.k_rrf must be >= 1");
        }
        if self.retrieval.page_size == 0 {
            bail!("retrieval.page_size must be >= 1");
        }

        Ok(())
    }

    /// Settings whose change must produce a new corpus version.
    pub fn fingerprint_input(&self) -> FingerprintInput<'_> {
        FingerprintInput {
            pipeline: &self.pipeline,
            chunking: &self.chunking,
            embedding: EmbeddingFingerprint {
                provider: self.embedding.provider.clone(),
                model: self.embedding.model_name(),
                dims: self.embedding.resolved_dims(),
                normalize: self.embedding.normalize,
                batch_size: self.embedding.batch_size,
            },
            ingest: &self.ingest,
            distance: self.vector_store.distance.to_lowercase(),
        }
    }

    /// Configuration fingerprint (see [`crate::identity::config_fingerprint`]).
    pub fn fingerprint(&self) -> Result<String> {
        crate::identity::config_fingerprint(&self.fingerprint_input())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Config::from_toml_str(&content)
}
