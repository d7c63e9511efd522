//! In-memory [`VectorStore`] for tests and local experiments.
//!
//! Points live in a `BTreeMap` keyed by id behind a `std::sync::RwLock`, so
//! scroll order is the id order and offsets are plain ids. Search is
//! brute force over every stored vector.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{PayloadFilter, ScrollPage, VectorStore};
use crate::embedding::cosine_similarity;
use crate::error::GatewayError;
use crate::models::{IndexPoint, ScoredPoint, StoredPoint};

const SERVICE: &str = "vector_store";

pub struct InMemoryStore {
    distance: String,
    dimension: RwLock<Option<usize>>,
    points: RwLock<BTreeMap<String, IndexPoint>>,
}

impl InMemoryStore {
    /// `distance` is one of `cosine`, `dot` or `euclid`.
    pub fn new(distance: &str) -> Self {
        Self {
            distance: distance.to_lowercase(),
            dimension: RwLock::new(None),
            points: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.points.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored point, ordered by id.
    pub fn points(&self) -> Vec<IndexPoint> {
        self.points
            .read()
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default()
    }

    fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.distance.as_str() {
            "dot" => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            // Negated distance keeps "higher is better" for every metric.
            "euclid" => -a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            _ => cosine_similarity(a, b),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new("cosine")
    }
}

fn poisoned() -> GatewayError {
    GatewayError::permanent(SERVICE, "in-memory store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn ensure_collection(&self, dimension: usize) -> Result<(), GatewayError> {
        let mut current = self.dimension.write().map_err(|_| poisoned())?;
        match *current {
            Some(existing) if existing != dimension => Err(GatewayError::permanent(
                SERVICE,
                format!(
                    "collection has vector size {}, requested {}",
                    existing, dimension
                ),
            )),
            Some(_) => Ok(()),
            None => {
                *current = Some(dimension);
                Ok(())
            }
        }
    }

    async fn upsert(&self, points: &[IndexPoint]) -> Result<(), GatewayError> {
        let dimension = self
            .dimension
            .read()
            .map_err(|_| poisoned())?
            .ok_or_else(|| GatewayError::permanent(SERVICE, "collection does not exist"))?;

        if let Some(bad) = points.iter().find(|p| p.vector.len() != dimension) {
            return Err(GatewayError::permanent(
                SERVICE,
                format!(
                    "point {} has dimension {}, collection expects {}",
                    bad.id,
                    bad.vector.len(),
                    dimension
                ),
            ));
        }

        let mut stored = self.points.write().map_err(|_| poisoned())?;
        for p in points {
            stored.insert(p.id.to_string(), p.clone());
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: &PayloadFilter,
    ) -> Result<Vec<ScoredPoint>, GatewayError> {
        let stored = self.points.read().map_err(|_| poisoned())?;
        let mut hits: Vec<ScoredPoint> = stored
            .values()
            .filter(|p| filter.matches(Some(&p.payload)))
            .map(|p| ScoredPoint {
                id: p.id.to_string(),
                score: self.score(vector, &p.vector),
                payload: Some(p.payload.clone()),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scroll(
        &self,
        limit: usize,
        offset: Option<&str>,
        filter: &PayloadFilter,
        with_vectors: bool,
    ) -> Result<ScrollPage, GatewayError> {
        let stored = self.points.read().map_err(|_| poisoned())?;
        let mut matching = stored
            .range(offset.unwrap_or_default().to_string()..)
            .map(|(_, p)| p)
            .filter(|p| filter.matches(Some(&p.payload)));

        let points: Vec<StoredPoint> = matching
            .by_ref()
            .take(limit)
            .map(|p| StoredPoint {
                id: p.id.to_string(),
                vector: with_vectors.then(|| p.vector.clone()),
                payload: Some(p.payload.clone()),
            })
            .collect();
        let next_offset = matching.next().map(|p| p.id.to_string());

        Ok(ScrollPage {
            points,
            next_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::stable_point_id;
    use crate::models::PointPayload;
    use crate::retry::RetryPolicy;
    use crate::vector_store::{scroll_all, upsert_batched};

    fn point(doc: &str, index: usize, cv: &str, vector: Vec<f32>) -> IndexPoint {
        IndexPoint {
            id: stable_point_id(doc, index),
            vector,
            payload: PointPayload {
                doc_id: doc.into(),
                chunk_id: format!("{}-{}", doc, index),
                chunk_index: index,
                text: format!("chunk {} of {}", index, doc),
                file_name: format!("{}.pdf", doc),
                source_path: format!("{}.pdf", doc),
                corpus_version: cv.into(),
                config_fingerprint: "fp".into(),
                pipeline_version: "v1".into(),
                chunker_version: "chars_v1".into(),
                cleaner_version: "clean_v1".into(),
                embed_model: "m".into(),
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let store = InMemoryStore::default();
        store.ensure_collection(2).await.unwrap();
        store.upsert(&[point("a", 0, "cv", vec![1.0, 0.0])]).await.unwrap();
        store.upsert(&[point("a", 0, "cv", vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.points()[0].vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_collection_dimension_enforced() {
        let store = InMemoryStore::default();
        assert!(store.upsert(&[point("a", 0, "cv", vec![1.0])]).await.is_err());
        store.ensure_collection(2).await.unwrap();
        store.ensure_collection(2).await.unwrap();
        assert!(store.ensure_collection(3).await.is_err());
        let err = store.upsert(&[point("a", 0, "cv", vec![1.0])]).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_search_ranks_and_filters() {
        let store = InMemoryStore::default();
        store.ensure_collection(2).await.unwrap();
        store
            .upsert(&[
                point("a", 0, "cv1", vec![1.0, 0.0]),
                point("b", 0, "cv1", vec![0.6, 0.8]),
                point("c", 0, "cv2", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store
            .search(&[1.0, 0.0], 10, &PayloadFilter::corpus_version("cv1"))
            .await
            .unwrap();
        let docs: Vec<&str> = hits
            .iter()
            .map(|h| h.payload.as_ref().unwrap().doc_id.as_str())
            .collect();
        assert_eq!(docs, vec!["a", "b"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_scroll_pages_cover_everything_once() {
        let store = InMemoryStore::default();
        store.ensure_collection(1).await.unwrap();
        let points: Vec<IndexPoint> = (0..7).map(|i| point("doc", i, "cv", vec![i as f32])).collect();
        let written = upsert_batched(&store, &points, 3, &RetryPolicy::none()).await.unwrap();
        assert_eq!(written, 7);

        let all = scroll_all(&store, &PayloadFilter::none(), 2, 100, true, &RetryPolicy::none())
            .await
            .unwrap();
        assert_eq!(all.len(), 7);
        let mut ids: Vec<&str> = all.iter().map(|p| p.id.as_str()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 7);
        assert!(all.iter().all(|p| p.vector.is_some()));

        let capped = scroll_all(&store, &PayloadFilter::none(), 2, 5, false, &RetryPolicy::none())
            .await
            .unwrap();
        assert_eq!(capped.len(), 5);
        assert!(capped.iter().all(|p| p.vector.is_none()));
    }
}
