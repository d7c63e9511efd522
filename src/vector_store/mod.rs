//! Vector-store gateway.
//!
//! The [`VectorStore`] trait covers everything the pipeline needs from an
//! index: idempotent collection creation, single-request upsert, similarity
//! search and paginated scroll. Two backends ship with the crate:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`QdrantStore`] | Qdrant over its REST API |
//! | [`InMemoryStore`] | brute-force store for tests and local runs |
//!
//! Batching and retries are not the backend's concern: callers go through
//! [`upsert_batched`] and [`scroll_all`], which apply a [`RetryPolicy`] per
//! request. Point ids are deterministic, so re-sending a batch after a
//! timeout overwrites instead of duplicating.

pub mod memory;
pub mod qdrant;

pub use memory::InMemoryStore;
pub use qdrant::QdrantStore;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::models::{IndexPoint, PointPayload, ScoredPoint, StoredPoint};
use crate::retry::{retry, RetryPolicy};

const SERVICE: &str = "vector_store";

/// Payload filter applied to search and scroll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadFilter {
    pub corpus_version: Option<String>,
}

impl PayloadFilter {
    /// Matches every point.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn corpus_version(version: impl Into<String>) -> Self {
        Self {
            corpus_version: Some(version.into()),
        }
    }

    pub fn matches(&self, payload: Option<&PointPayload>) -> bool {
        match &self.corpus_version {
            None => true,
            Some(v) => payload.is_some_and(|p| &p.corpus_version == v),
        }
    }

    /// Qdrant filter JSON, or `None` when the filter is empty.
    pub fn to_qdrant(&self) -> Option<serde_json::Value> {
        self.corpus_version.as_ref().map(|v| {
            serde_json::json!({
                "must": [{"key": "corpus_version", "match": {"value": v}}]
            })
        })
    }
}

/// One page of a scroll.
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    pub points: Vec<StoredPoint>,
    /// Offset of the next page; `None` once the collection is exhausted.
    pub next_offset: Option<String>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist. Fails permanently if it
    /// exists with a different vector size.
    async fn ensure_collection(&self, dimension: usize) -> Result<(), GatewayError>;

    /// Write `points` in one request, overwriting points with the same id.
    async fn upsert(&self, points: &[IndexPoint]) -> Result<(), GatewayError>;

    /// Top `limit` points by similarity to `vector`, best first.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: &PayloadFilter,
    ) -> Result<Vec<ScoredPoint>, GatewayError>;

    /// Up to `limit` points starting at `offset` (`None` = from the start).
    async fn scroll(
        &self,
        limit: usize,
        offset: Option<&str>,
        filter: &PayloadFilter,
        with_vectors: bool,
    ) -> Result<ScrollPage, GatewayError>;
}

/// Upsert `points` in batches of at most `batch_size`, retrying each batch.
/// Returns the number of points written.
pub async fn upsert_batched(
    store: &dyn VectorStore,
    points: &[IndexPoint],
    batch_size: usize,
    policy: &RetryPolicy,
) -> Result<usize, GatewayError> {
    let mut written = 0;
    for batch in points.chunks(batch_size.max(1)) {
        retry(policy, SERVICE, || store.upsert(batch)).await?;
        written += batch.len();
    }
    Ok(written)
}

/// Scroll through the collection page by page until it is exhausted or
/// `max_points` points have been read (`0` = no cap).
///
/// Hitting the cap while the store still has points is logged as a warning.
pub async fn scroll_all(
    store: &dyn VectorStore,
    filter: &PayloadFilter,
    page_size: usize,
    max_points: usize,
    with_vectors: bool,
    policy: &RetryPolicy,
) -> Result<Vec<StoredPoint>, GatewayError> {
    let cap = if max_points == 0 { usize::MAX } else { max_points };
    let mut points = Vec::new();
    let mut offset: Option<String> = None;

    loop {
        let limit = page_size.max(1).min(cap - points.len());
        let page = retry(policy, SERVICE, || {
            store.scroll(limit, offset.as_deref(), filter, with_vectors)
        })
        .await?;

        let got = page.points.len();
        points.extend(page.points);
        match page.next_offset {
            Some(next) if got > 0 => {
                if points.len() >= cap {
                    tracing::warn!(
                        max_points,
                        corpus_version = ?filter.corpus_version,
                        "scroll_truncated"
                    );
                    break;
                }
                offset = Some(next);
            }
            _ => break,
        }
    }

    points.truncate(cap);
    Ok(points)
}
