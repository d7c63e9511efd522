//! Core data models used throughout the pipeline.
//!
//! Documents, chunks and index points are ephemeral and rebuilt on every run;
//! only the ledger and the run manifest persist.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A source file discovered on disk, identified by the hash of its bytes.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    /// Path relative to the configured source directory.
    pub relative_path: String,
    pub file_name: String,
    pub doc_id: String,
}

/// A window of a document's text; the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub doc_id: String,
    pub index: usize,
    pub text: String,
}

/// Provenance carried by every index point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    pub doc_id: String,
    pub chunk_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub file_name: String,
    pub source_path: String,
    pub corpus_version: String,
    pub config_fingerprint: String,
    pub pipeline_version: String,
    pub chunker_version: String,
    pub cleaner_version: String,
    pub embed_model: String,
}

/// Wire shape of one vector-store point: `{id, vector, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// A point returned from a similarity search.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Option<PointPayload>,
}

/// A point returned from a scroll, optionally with its vector.
#[derive(Debug, Clone)]
pub struct StoredPoint {
    pub id: String,
    pub vector: Option<Vec<f32>>,
    pub payload: Option<PointPayload>,
}

/// One ranked answer to a query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub rank: usize,
    pub chunk_id: String,
    pub doc_id: String,
    pub chunk_index: usize,
    pub file_name: String,
    pub snippet: String,
    /// Cosine similarity against the query embedding.
    pub dense_score: f64,
    /// BM25 score; absent in dense-only mode.
    pub lexical_score: Option<f64>,
    /// Reciprocal rank fusion score; absent in dense-only mode.
    pub fused_score: Option<f64>,
}
