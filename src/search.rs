//! Query side: dense and hybrid search, and the document listing.
//!
//! Dense mode is a single similarity query against the vector store. Hybrid
//! mode scrolls the filtered collection (with vectors) and ranks it in
//! process with [`fusion::hybrid_search`], so every result carries its dense,
//! lexical and fused scores. A non-zero `retrieval.candidate_limit` caps the
//! scroll; points past the cap are never ranked.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::Config;
use crate::embedding::{self, embed_query, Embedder};
use crate::fusion::{self, CorpusEntry, FusionParams};
use crate::ingest;
use crate::models::{PointPayload, SearchResult};
use crate::retry::{retry, RetryPolicy};
use crate::vector_store::{scroll_all, PayloadFilter, QdrantStore, VectorStore};

const SNIPPET_CHARS: usize = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SearchMode {
    /// Vector similarity only.
    Dense,
    /// Dense and BM25 rankings fused with RRF.
    Hybrid,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    pub top_k: usize,
    pub filter: PayloadFilter,
}

/// Run one query and return ranked results, best first.
pub async fn search(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    config: &Config,
    policy: &RetryPolicy,
    request: &SearchRequest,
) -> Result<Vec<SearchResult>> {
    if request.query.trim().is_empty() || request.top_k == 0 {
        return Ok(Vec::new());
    }

    let query_vec = embed_query(
        embedder,
        &request.query,
        config.embedding.normalize,
        policy,
    )
    .await?;

    match request.mode {
        SearchMode::Dense => {
            let hits = retry(policy, "vector_store", || {
                store.search(&query_vec, request.top_k, &request.filter)
            })
            .await?;

            Ok(hits
                .into_iter()
                .filter_map(|hit| {
                    let payload = hit.payload?;
                    Some((payload, hit.score as f64))
                })
                .enumerate()
                .map(|(i, (payload, score))| to_result(i + 1, &payload, score, None, None))
                .collect())
        }
        SearchMode::Hybrid => {
            let points = scroll_all(
                store,
                &request.filter,
                config.retrieval.page_size,
                config.retrieval.candidate_limit,
                true,
                policy,
            )
            .await?;

            let (corpus, payloads): (Vec<CorpusEntry>, Vec<PointPayload>) = points
                .into_iter()
                .filter_map(|p| {
                    let vector = p.vector?;
                    let payload = p.payload?;
                    let entry = CorpusEntry {
                        id: payload.chunk_id.clone(),
                        text: payload.text.clone(),
                        vector,
                    };
                    Some((entry, payload))
                })
                .unzip();

            let params = FusionParams {
                top_k: request.top_k,
                k_rrf: config.retrieval.k_rrf,
            };
            let hits = fusion::hybrid_search(&request.query, &query_vec, &corpus, params)?;

            Ok(hits
                .iter()
                .enumerate()
                .map(|(i, hit)| {
                    to_result(
                        i + 1,
                        &payloads[hit.index],
                        hit.dense_score,
                        Some(hit.lexical_score),
                        Some(hit.fused_score),
                    )
                })
                .collect())
        }
    }
}

fn to_result(
    rank: usize,
    payload: &PointPayload,
    dense_score: f64,
    lexical_score: Option<f64>,
    fused_score: Option<f64>,
) -> SearchResult {
    SearchResult {
        rank,
        chunk_id: payload.chunk_id.clone(),
        doc_id: payload.doc_id.clone(),
        chunk_index: payload.chunk_index,
        file_name: payload.file_name.clone(),
        snippet: snippet(&payload.text),
        dense_score,
        lexical_score,
        fused_score,
    }
}

fn snippet(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let trimmed = flat.trim();
    if trimmed.chars().count() <= SNIPPET_CHARS {
        return trimmed.to_string();
    }
    let mut s: String = trimmed.chars().take(SNIPPET_CHARS).collect();
    s.push_str("...");
    s
}

/// One indexed document as seen through the collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocSummary {
    pub doc_id: String,
    pub file_name: Option<String>,
    pub chunks: usize,
}

/// Scroll the collection and summarise up to `max_docs` distinct documents,
/// most chunks first.
pub async fn list_docs(
    store: &dyn VectorStore,
    filter: &PayloadFilter,
    page_size: usize,
    max_docs: usize,
    policy: &RetryPolicy,
) -> Result<Vec<DocSummary>> {
    let mut docs: Vec<DocSummary> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut offset: Option<String> = None;

    'pages: loop {
        let page = retry(policy, "vector_store", || {
            store.scroll(page_size.max(1), offset.as_deref(), filter, false)
        })
        .await?;
        if page.points.is_empty() {
            break;
        }

        for point in page.points {
            let Some(payload) = point.payload else {
                continue;
            };
            match positions.get(&payload.doc_id) {
                Some(&i) => docs[i].chunks += 1,
                None => {
                    positions.insert(payload.doc_id.clone(), docs.len());
                    docs.push(DocSummary {
                        doc_id: payload.doc_id,
                        file_name: Some(payload.file_name).filter(|f| !f.is_empty()),
                        chunks: 1,
                    });
                }
            }
            if docs.len() >= max_docs {
                break 'pages;
            }
        }

        match page.next_offset {
            Some(next) => offset = Some(next),
            None => break,
        }
    }

    // Stable: equal counts keep first-seen order.
    docs.sort_by(|a, b| b.chunks.cmp(&a.chunks));
    Ok(docs)
}

/// Payload filter for the query commands.
///
/// An explicit version wins. Without one the filter is the corpus version
/// of the documents currently on disk, computed the way `ragpipe
/// fingerprint` computes it; `all_versions` drops the filter entirely.
pub fn resolve_filter(
    config: &Config,
    corpus_version: Option<String>,
    all_versions: bool,
) -> Result<PayloadFilter> {
    match corpus_version {
        Some(version) => Ok(PayloadFilter::corpus_version(version)),
        None if all_versions => Ok(PayloadFilter::none()),
        None => {
            let version = ingest::current_corpus_version(config).context(
                "Failed to compute the current corpus version \
                 (pass --corpus-version or --all-versions)",
            )?;
            tracing::debug!(corpus_version = %version, "filter_current_version");
            Ok(PayloadFilter::corpus_version(version))
        }
    }
}

/// `ragpipe search`.
pub async fn run_search(
    config: &Config,
    request: &SearchRequest,
    json: bool,
) -> Result<()> {
    let policy = RetryPolicy::from_config(&config.retry);
    let embedder = embedding::create_embedder(&config.embedding).await?;
    let store = QdrantStore::new(&config.vector_store)?;

    let results = search(embedder.as_ref(), &store, config, &policy, request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for r in &results {
        match (r.lexical_score, r.fused_score) {
            (Some(lexical), Some(fused)) => println!(
                "{}. [fused {:.4} | dense {:.4} | bm25 {:.2}] {}",
                r.rank, fused, r.dense_score, lexical, r.file_name
            ),
            _ => println!("{}. [{:.4}] {}", r.rank, r.dense_score, r.file_name),
        }
        println!("    doc: {}  chunk: {}", &r.doc_id[..r.doc_id.len().min(12)], r.chunk_index);
        println!("    excerpt: \"{}\"", r.snippet);
        println!();
    }
    Ok(())
}

/// `ragpipe list-docs`.
pub async fn run_list_docs(config: &Config, filter: &PayloadFilter, max_docs: usize) -> Result<()> {
    let policy = RetryPolicy::from_config(&config.retry);
    let store = QdrantStore::new(&config.vector_store)?;

    let docs = list_docs(&store, filter, config.retrieval.page_size, max_docs, &policy).await?;

    println!("collection: {}", config.vector_store.collection);
    println!(
        "corpus_version: {}",
        filter.corpus_version.as_deref().unwrap_or("(any)")
    );
    println!("documents: {} (showing up to {})", docs.len(), max_docs);
    for (i, d) in docs.iter().enumerate() {
        println!(
            "{:>3}. {} | doc_id={}... | chunks={}",
            i + 1,
            d.file_name.as_deref().unwrap_or("(unknown)"),
            &d.doc_id[..d.doc_id.len().min(12)],
            d.chunks
        );
    }
    Ok(())
}
