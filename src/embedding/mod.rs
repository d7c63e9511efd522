//! Embedding gateway.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`OpenAIEmbedder`]**: calls the OpenAI embeddings API.
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbedder`**: runs models locally via fastembed; no network calls
//!   after the model download.
//!
//! Embedders are constructed explicitly with [`create_embedder`] and passed
//! into the pipeline, so tests can substitute their own implementation.
//!
//! A single [`Embedder::encode`] call is one request. Batching, retries and
//! output validation live in [`encode_batched`], which every caller goes
//! through.
//!
//! # Error classification
//!
//! - HTTP 429 and 5xx, timeouts and connection failures are transient
//! - any other 4xx and unparseable bodies are permanent
//! - a vector count or dimension that disagrees with the request is permanent

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::GatewayError;
use crate::retry::{retry, RetryPolicy};

const SERVICE: &str = "embedding";

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded in every point payload.
    fn model_name(&self) -> &str;
    /// Length of every vector this embedder returns.
    fn dimension(&self) -> usize;
    /// Encode one batch of texts, one vector per input in input order.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError>;
}

/// Default model for a provider when `embedding.model` is unset.
pub fn default_model(provider: &str) -> &'static str {
    match provider {
        "openai" => "text-embedding-3-small",
        "ollama" => "nomic-embed-text",
        _ => "all-minilm-l6-v2",
    }
}

/// Output dimension of well-known models.
pub fn known_model_dims(model: &str) -> Option<usize> {
    let dims = match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
        "text-embedding-3-large" => 3072,
        "nomic-embed-text" | "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "all-minilm-l6-v2" | "bge-small-en-v1.5" | "multilingual-e5-small" => 384,
        "bge-base-en-v1.5" | "multilingual-e5-base" => 768,
        "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
        _ => return None,
    };
    Some(dims)
}

/// Construct the embedder selected by `config.provider`.
///
/// For the `local` provider this loads (and on first use downloads) the
/// model, so call it only after configuration has been validated.
pub async fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Box::new(LocalEmbedder::new(config).await?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires --features local-embeddings-fastembed"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode `texts` in batches of at most `batch_size`, retrying each batch
/// under `policy`.
///
/// Fails permanently if the embedder returns the wrong number of vectors or
/// a vector of the wrong dimension. With `normalize`, every vector is scaled
/// to unit L2 norm so cosine similarity equals the dot product.
pub async fn encode_batched(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
    normalize: bool,
    policy: &RetryPolicy,
) -> Result<Vec<Vec<f32>>, GatewayError> {
    let dimension = embedder.dimension();
    let mut out = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size.max(1)) {
        let vectors = retry(policy, SERVICE, || embedder.encode(batch)).await?;
        if vectors.len() != batch.len() {
            return Err(GatewayError::permanent(
                SERVICE,
                format!(
                    "requested {} embeddings, received {}",
                    batch.len(),
                    vectors.len()
                ),
            ));
        }
        for mut vector in vectors {
            if vector.len() != dimension {
                return Err(GatewayError::permanent(
                    SERVICE,
                    format!(
                        "{} returned dimension {}, expected {}",
                        embedder.model_name(),
                        vector.len(),
                        dimension
                    ),
                ));
            }
            if normalize {
                l2_normalize(&mut vector);
            }
            out.push(vector);
        }
    }

    Ok(out)
}

/// Encode a single query text.
pub async fn embed_query(
    embedder: &dyn Embedder,
    text: &str,
    normalize: bool,
    policy: &RetryPolicy,
) -> Result<Vec<f32>, GatewayError> {
    encode_batched(embedder, &[text.to_string()], 1, normalize, policy)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::permanent(SERVICE, "empty embedding response"))
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn resolved_dims(config: &EmbeddingConfig, provider: &str) -> Result<usize> {
    config.resolved_dims().ok_or_else(|| {
        anyhow::anyhow!("embedding.dims required for {} provider", provider)
    })
}

fn parse_vector(value: &serde_json::Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

// ============ OpenAI ============

/// Embedder backed by `POST https://api.openai.com/v1/embeddings`.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!("OPENAI_API_KEY environment variable not set"),
        };
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            model: config.model_name(),
            dims: resolved_dims(config, "openai")?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dims
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(SERVICE, status, text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::from_reqwest(SERVICE, e))?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, GatewayError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| GatewayError::permanent(SERVICE, "invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let vector = item
            .get("embedding")
            .and_then(parse_vector)
            .ok_or_else(|| GatewayError::permanent(SERVICE, "invalid OpenAI response: bad embedding"))?;
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embedder backed by a local Ollama instance (default `http://localhost:11434`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: url.trim_end_matches('/').to_string(),
            model: config.model_name(),
            dims: resolved_dims(config, "ollama")?,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dims
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(SERVICE, status, text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::from_reqwest(SERVICE, e))?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, GatewayError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            GatewayError::permanent(SERVICE, "invalid Ollama response: missing embeddings array")
        })?;

    embeddings
        .iter()
        .map(|e| {
            parse_vector(e).ok_or_else(|| {
                GatewayError::permanent(SERVICE, "invalid Ollama response: embedding is not an array")
            })
        })
        .collect()
}

// ============ Local (fastembed) ============

/// In-process embedder. The model is loaded once at construction; inference
/// runs on the blocking thread pool.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model: std::sync::Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
    model_name: String,
    dims: usize,
    batch_size: usize,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub async fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config.model_name();
        let fastembed_model = config_to_fastembed_model(&model_name)?;
        let dims = resolved_dims(config, "local")?;

        let model = tokio::task::spawn_blocking(move || {
            fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
            )
            .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))
        })
        .await??;

        Ok(Self {
            model: std::sync::Arc::new(std::sync::Mutex::new(model)),
            model_name,
            dims,
            batch_size: config.batch_size,
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dims
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        let model = std::sync::Arc::clone(&self.model);
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| GatewayError::permanent(SERVICE, "local model lock poisoned"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| GatewayError::permanent(SERVICE, format!("local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| GatewayError::permanent(SERVICE, format!("embedding task failed: {}", e)))?
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}
