//! Qdrant over its REST API.
//!
//! Endpoints used:
//! - `GET  /collections/{c}` and `PUT /collections/{c}` for [`ensure_collection`](VectorStore::ensure_collection)
//! - `PUT  /collections/{c}/points?wait=true` for upserts
//! - `POST /collections/{c}/points/search`
//! - `POST /collections/{c}/points/scroll`
//!
//! When `QDRANT_API_KEY` is set it is sent as the `api-key` header.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde_json::{json, Value};

use super::{PayloadFilter, ScrollPage, VectorStore};
use crate::config::VectorStoreConfig;
use crate::error::GatewayError;
use crate::models::{IndexPoint, PointPayload, ScoredPoint, StoredPoint};

const SERVICE: &str = "qdrant";

pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    distance: &'static str,
}

impl QdrantStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Ok(key) = std::env::var("QDRANT_API_KEY") {
            if !key.trim().is_empty() {
                headers.insert(
                    "api-key",
                    HeaderValue::from_str(key.trim()).context("invalid QDRANT_API_KEY")?,
                );
            }
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .context("failed to build Qdrant HTTP client")?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            distance: qdrant_distance(&config.distance),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::from_reqwest(SERVICE, e))?;
        read_json(response).await
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(GatewayError::from_status(SERVICE, status, text));
    }
    response
        .json()
        .await
        .map_err(|e| GatewayError::permanent(SERVICE, format!("invalid response body: {}", e)))
}

/// Map a validated config distance to Qdrant's spelling.
pub fn qdrant_distance(distance: &str) -> &'static str {
    match distance.to_lowercase().as_str() {
        "dot" => "Dot",
        "euclid" => "Euclid",
        _ => "Cosine",
    }
}

/// Qdrant ids are unsigned integers or UUID strings.
fn id_to_string(id: &Value) -> Option<String> {
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_payload(point: &Value) -> Option<PointPayload> {
    point
        .get("payload")
        .and_then(|p| serde_json::from_value(p.clone()).ok())
}

/// `vector` is either a plain array or, for named vectors, an object; only
/// the unnamed form is read.
fn parse_vector(point: &Value) -> Option<Vec<f32>> {
    point.get("vector")?.as_array().map(|values| {
        values
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|f| f as f32)
            .collect()
    })
}

fn existing_size(info: &Value) -> Option<usize> {
    info.pointer("/result/config/params/vectors/size")
        .and_then(|s| s.as_u64())
        .map(|s| s as usize)
}

fn parse_search(body: &Value) -> Result<Vec<ScoredPoint>, GatewayError> {
    let hits = body
        .get("result")
        .and_then(|r| r.as_array())
        .ok_or_else(|| GatewayError::permanent(SERVICE, "search response missing result array"))?;

    Ok(hits
        .iter()
        .filter_map(|hit| {
            Some(ScoredPoint {
                id: id_to_string(hit.get("id")?)?,
                score: hit.get("score")?.as_f64()? as f32,
                payload: parse_payload(hit),
            })
        })
        .collect())
}

fn parse_scroll(body: &Value) -> Result<ScrollPage, GatewayError> {
    let result = body
        .get("result")
        .ok_or_else(|| GatewayError::permanent(SERVICE, "scroll response missing result"))?;
    let points = result
        .get("points")
        .and_then(|p| p.as_array())
        .ok_or_else(|| GatewayError::permanent(SERVICE, "scroll response missing points"))?;

    Ok(ScrollPage {
        points: points
            .iter()
            .filter_map(|p| {
                Some(StoredPoint {
                    id: id_to_string(p.get("id")?)?,
                    vector: parse_vector(p),
                    payload: parse_payload(p),
                })
            })
            .collect(),
        next_offset: result.get("next_page_offset").and_then(id_to_string),
    })
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, dimension: usize) -> Result<(), GatewayError> {
        let response = self
            .client
            .get(self.url(""))
            .send()
            .await
            .map_err(|e| GatewayError::from_reqwest(SERVICE, e))?;

        if response.status() != StatusCode::NOT_FOUND {
            let info = read_json(response).await?;
            return match existing_size(&info) {
                Some(size) if size != dimension => Err(GatewayError::permanent(
                    SERVICE,
                    format!(
                        "collection '{}' has vector size {}, embedder produces {}",
                        self.collection, size, dimension
                    ),
                )),
                _ => Ok(()),
            };
        }

        tracing::info!(collection = %self.collection, dimension, distance = self.distance, "creating collection");
        let body = json!({
            "vectors": {"size": dimension, "distance": self.distance}
        });
        self.send(self.client.put(self.url("")).json(&body)).await?;
        Ok(())
    }

    async fn upsert(&self, points: &[IndexPoint]) -> Result<(), GatewayError> {
        if points.is_empty() {
            return Ok(());
        }
        let body = json!({ "points": points });
        self.send(
            self.client
                .put(self.url("/points?wait=true"))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: &PayloadFilter,
    ) -> Result<Vec<ScoredPoint>, GatewayError> {
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(f) = filter.to_qdrant() {
            body["filter"] = f;
        }
        let response = self
            .send(self.client.post(self.url("/points/search")).json(&body))
            .await?;
        parse_search(&response)
    }

    async fn scroll(
        &self,
        limit: usize,
        offset: Option<&str>,
        filter: &PayloadFilter,
        with_vectors: bool,
    ) -> Result<ScrollPage, GatewayError> {
        let mut body = json!({
            "limit": limit,
            "with_payload": true,
            "with_vector": with_vectors,
        });
        if let Some(o) = offset {
            body["offset"] = match o.parse::<u64>() {
                Ok(n) => json!(n),
                Err(_) => json!(o),
            };
        }
        if let Some(f) = filter.to_qdrant() {
            body["filter"] = f;
        }
        let response = self
            .send(self.client.post(self.url("/points/scroll")).json(&body))
            .await?;
        parse_scroll(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_names() {
        assert_eq!(qdrant_distance("cosine"), "Cosine");
        assert_eq!(qdrant_distance("DOT"), "Dot");
        assert_eq!(qdrant_distance("euclid"), "Euclid");
    }

    #[test]
    fn test_parse_search_response() {
        let body = json!({
            "result": [
                {"id": "5b0c7a1e-0000-5000-8000-000000000000", "score": 0.9, "payload": {"unexpected": true}},
                {"id": 7, "score": 0.5},
                {"score": 0.1}
            ],
            "status": "ok"
        });
        let hits = parse_search(&body).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].id, "7");
        assert!(hits[0].payload.is_none());
        assert!(parse_search(&json!({"status": "ok"})).is_err());
    }

    #[test]
    fn test_parse_scroll_response() {
        let body = json!({
            "result": {
                "points": [{"id": 1, "vector": [0.5, 0.25]}, {"id": 2}],
                "next_page_offset": 3
            }
        });
        let page = parse_scroll(&body).unwrap();
        assert_eq!(page.points.len(), 2);
        assert_eq!(page.points[0].vector, Some(vec![0.5, 0.25]));
        assert_eq!(page.points[1].vector, None);
        assert_eq!(page.next_offset.as_deref(), Some("3"));

        let last = parse_scroll(&json!({"result": {"points": [], "next_page_offset": null}})).unwrap();
        assert!(last.next_offset.is_none());
    }

    #[test]
    fn test_existing_collection_size() {
        let info = json!({"result": {"config": {"params": {"vectors": {"size": 384, "distance": "Cosine"}}}}});
        assert_eq!(existing_size(&info), Some(384));
        assert_eq!(existing_size(&json!({})), None);
    }

    #[test]
    fn test_upsert_body_shape() {
        let store = QdrantStore::new(&VectorStoreConfig::default()).unwrap();
        assert_eq!(
            store.url("/points"),
            "http://localhost:6333/collections/rag_collection/points"
        );
        let point = IndexPoint {
            id: crate::identity::stable_point_id("d", 0),
            vector: vec![1.0],
            payload: PointPayload {
                doc_id: "d".into(),
                chunk_id: "c".into(),
                chunk_index: 0,
                text: "t".into(),
                file_name: "f".into(),
                source_path: "f".into(),
                corpus_version: "cv".into(),
                config_fingerprint: "fp".into(),
                pipeline_version: "v1".into(),
                chunker_version: "chars_v1".into(),
                cleaner_version: "clean_v1".into(),
                embed_model: "m".into(),
            },
        };
        let body = json!({ "points": [point] });
        assert!(body["points"][0]["id"].is_string());
        assert_eq!(body["points"][0]["payload"]["corpus_version"], "cv");
    }
}
