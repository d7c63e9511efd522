//! Ingestion pipeline orchestration.
//!
//! Runs the per-document flow: read bytes → verify `doc_id` → extract and
//! clean → chunk → embed → upsert → ledger append. Documents are processed
//! one at a time in discovery order and every gateway call is awaited before
//! the next begins.
//!
//! A document reaches the ledger only after all of its points were
//! upserted. Any failure on the way is recorded in the run manifest and the
//! run moves on to the next document; the ledger stays untouched, so the
//! next run retries the whole document.
//!
//! Planning ([`IngestPlan::prepare`]) touches only the filesystem. Gateways
//! are constructed afterwards, so configuration and empty-corpus errors
//! surface before any model is loaded or connection opened.

use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::Utc;

use crate::chunk::{build_chunks, chunk_text};
use crate::config::Config;
use crate::embedding::{self, encode_batched, Embedder};
use crate::extract;
use crate::identity;
use crate::ledger::Ledger;
use crate::manifest::{new_run_id, FailureLog, RunManifest};
use crate::models::{IndexPoint, PointPayload, SourceDocument};
use crate::retry::{retry, RetryPolicy};
use crate::sources::{self, UnreadableSource};
use crate::vector_store::{upsert_batched, QdrantStore, VectorStore};

/// Everything known about a run before any gateway exists.
pub struct IngestPlan {
    config: Config,
    pub documents: Vec<SourceDocument>,
    /// Selected files that could not be read; not part of the corpus version.
    pub unreadable: Vec<UnreadableSource>,
    pub config_fingerprint: String,
    pub corpus_version: String,
    pub ledger: Ledger,
}

/// Per-document outcome.
enum Outcome {
    Indexed { vectors: usize },
    Skipped { event: &'static str, reason: String },
}

impl IngestPlan {
    /// Discover documents, fingerprint the configuration and open the
    /// ledger for the resulting corpus version.
    ///
    /// Fails if no document matches the configured selection.
    pub fn prepare(config: &Config) -> Result<Self> {
        let sources::Discovery {
            documents,
            unreadable,
        } = sources::discover(config)?;
        if documents.is_empty() {
            bail!(
                "No documents found in {} matching {:?}",
                config.paths.source_dir.display(),
                config.ingest.include_globs
            );
        }

        let config_fingerprint = config.fingerprint()?;
        let corpus_version = identity::corpus_version(
            documents.iter().map(|d| d.doc_id.as_str()),
            &config_fingerprint,
        );
        let ledger = Ledger::open(&config.paths.ledger_dir, &corpus_version)?;

        Ok(Self {
            config: config.clone(),
            documents,
            unreadable,
            config_fingerprint,
            corpus_version,
            ledger,
        })
    }

    /// Documents not yet recorded in the ledger.
    pub fn pending(&self) -> impl Iterator<Item = &SourceDocument> {
        self.documents
            .iter()
            .filter(|d| !self.ledger.contains(&d.doc_id))
    }

    pub fn print_plan(&self) {
        let pending = self.pending().count();
        println!("ingest (dry-run)");
        println!("  documents: {}", self.documents.len());
        println!("  cached: {}", self.documents.len() - pending);
        println!("  pending: {}", pending);
        println!("  unreadable: {}", self.unreadable.len());
        println!("  config_fingerprint: {}", self.config_fingerprint);
        println!("  corpus_version: {}", self.corpus_version);
        println!("  ledger: {}", self.ledger.path().display());
        for doc in self.pending() {
            println!("    {}  {}", &doc.doc_id[..12], doc.relative_path);
        }
    }

    /// Index every pending document and return the run manifest.
    ///
    /// Per-document failures are recorded, not returned. Errors are returned
    /// only for collection setup and ledger writes.
    pub async fn run(
        mut self,
        embedder: &dyn Embedder,
        store: &dyn VectorStore,
        policy: &RetryPolicy,
    ) -> Result<RunManifest> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let run_id = new_run_id(started_at);

        tracing::info!(
            run_id = %run_id,
            docs = self.documents.len(),
            corpus_version = %self.corpus_version,
            collection = %self.config.vector_store.collection,
            "ingest_start"
        );

        if self.pending().next().is_some() {
            retry(policy, "vector_store", || {
                store.ensure_collection(embedder.dimension())
            })
            .await
            .context("Failed to prepare vector collection")?;
        }

        let mut failures = FailureLog::new();
        for source in &self.unreadable {
            failures.push(
                &source.relative_path,
                "",
                format!("unreadable: {}", source.reason),
            );
        }
        let mut docs_indexed = 0usize;
        let mut docs_cached = 0usize;
        let mut vectors_upserted = 0usize;

        let documents = std::mem::take(&mut self.documents);
        for doc in &documents {
            if self.ledger.contains(&doc.doc_id) {
                docs_cached += 1;
                tracing::info!(doc = %doc.relative_path, doc_id = %doc.doc_id, "skip_cached");
                continue;
            }

            match self.index_document(doc, embedder, store, policy).await {
                Outcome::Indexed { vectors } => {
                    self.ledger.record(&doc.doc_id)?;
                    docs_indexed += 1;
                    vectors_upserted += vectors;
                    tracing::info!(
                        doc = %doc.relative_path,
                        doc_id = %doc.doc_id,
                        vectors,
                        "doc_indexed"
                    );
                }
                Outcome::Skipped { event, reason } => {
                    tracing::warn!(
                        doc = %doc.relative_path,
                        doc_id = %doc.doc_id,
                        reason = %reason,
                        "{}",
                        event
                    );
                    failures.push(&doc.relative_path, &doc.doc_id, reason);
                }
            }
        }
        self.documents = documents;

        let docs_skipped = failures.total();
        let (failures, failures_total) = failures.into_parts();
        let manifest = RunManifest {
            run_id,
            env: self.config.env.clone(),
            started_at,
            finished_at: Utc::now(),
            collection: self.config.vector_store.collection.clone(),
            pipeline_version: self.config.pipeline.pipeline_version.clone(),
            config_fingerprint: self.config_fingerprint.clone(),
            corpus_version: self.corpus_version.clone(),
            source_dir: self.config.paths.source_dir.display().to_string(),
            doc_count: self.documents.len(),
            docs_indexed,
            docs_skipped,
            docs_cached,
            vectors_upserted,
            elapsed_seconds: clock.elapsed().as_secs_f64(),
            ledger_path: self.ledger.path().display().to_string(),
            failures,
            failures_total,
        };

        tracing::info!(
            run_id = %manifest.run_id,
            indexed = docs_indexed,
            skipped = docs_skipped,
            cached = docs_cached,
            vectors = vectors_upserted,
            elapsed_seconds = manifest.elapsed_seconds,
            "ingest_done"
        );

        Ok(manifest)
    }

    async fn index_document(
        &self,
        doc: &SourceDocument,
        embedder: &dyn Embedder,
        store: &dyn VectorStore,
        policy: &RetryPolicy,
    ) -> Outcome {
        let bytes = match std::fs::read(&doc.path) {
            Ok(b) => b,
            Err(e) => {
                return Outcome::Skipped {
                    event: "skip_unreadable",
                    reason: format!("unreadable: {}", e),
                }
            }
        };
        if identity::doc_id(&bytes) != doc.doc_id {
            return Outcome::Skipped {
                event: "skip_unreadable",
                reason: "changed_during_run".to_string(),
            };
        }

        let text = match extract::extract_text(&doc.path, &bytes) {
            Ok(t) if !t.is_empty() => t,
            Ok(_) => {
                return Outcome::Skipped {
                    event: "skip_unreadable",
                    reason: "unreadable_or_no_text".to_string(),
                }
            }
            Err(e) => {
                return Outcome::Skipped {
                    event: "skip_unreadable",
                    reason: format!("unreadable_or_no_text: {}", e),
                }
            }
        };

        let chunking = &self.config.chunking;
        let windows = chunk_text(
            &text,
            chunking.chunk_chars,
            chunking.overlap,
            chunking.max_chunks_per_doc,
        );
        let chunks = build_chunks(&doc.doc_id, &self.config.pipeline.chunker_version, windows);
        if chunks.is_empty() {
            return Outcome::Skipped {
                event: "skip_zero_chunks",
                reason: "zero_chunks".to_string(),
            };
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = match encode_batched(
            embedder,
            &texts,
            self.config.embedding.batch_size,
            self.config.embedding.normalize,
            policy,
        )
        .await
        {
            Ok(v) => v,
            Err(e) => {
                return Outcome::Skipped {
                    event: "embed_failed",
                    reason: format!("embed_failed: {}", e),
                }
            }
        };

        let points: Vec<IndexPoint> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexPoint {
                id: identity::stable_point_id(&doc.doc_id, chunk.index),
                vector,
                payload: PointPayload {
                    doc_id: doc.doc_id.clone(),
                    chunk_id: chunk.id,
                    chunk_index: chunk.index,
                    text: chunk.text,
                    file_name: doc.file_name.clone(),
                    source_path: doc.relative_path.clone(),
                    corpus_version: self.corpus_version.clone(),
                    config_fingerprint: self.config_fingerprint.clone(),
                    pipeline_version: self.config.pipeline.pipeline_version.clone(),
                    chunker_version: self.config.pipeline.chunker_version.clone(),
                    cleaner_version: self.config.pipeline.cleaner_version.clone(),
                    embed_model: embedder.model_name().to_string(),
                },
            })
            .collect();

        match upsert_batched(store, &points, self.config.ingest.upsert_batch_size, policy).await {
            Ok(vectors) => Outcome::Indexed { vectors },
            Err(e) => Outcome::Skipped {
                event: "upsert_failed",
                reason: format!("upsert_failed: {}", e),
            },
        }
    }
}

/// `ragpipe ingest`: plan, build gateways, run, write the manifest.
pub async fn run_ingest(config: &Config, dry_run: bool) -> Result<()> {
    let plan = IngestPlan::prepare(config)?;
    if dry_run {
        plan.print_plan();
        return Ok(());
    }

    let policy = RetryPolicy::from_config(&config.retry);
    let embedder = embedding::create_embedder(&config.embedding).await?;
    let store = QdrantStore::new(&config.vector_store)?;

    let manifest = plan.run(embedder.as_ref(), &store, &policy).await?;
    let path = manifest.write(&config.paths.runs_dir)?;

    println!("ingest {}", manifest.run_id);
    println!("  documents: {}", manifest.doc_count);
    println!("  indexed: {}", manifest.docs_indexed);
    println!("  cached: {}", manifest.docs_cached);
    println!("  skipped: {}", manifest.docs_skipped);
    println!("  vectors upserted: {}", manifest.vectors_upserted);
    println!("  corpus_version: {}", manifest.corpus_version);
    println!("  manifest: {}", path.display());
    println!("ok");

    Ok(())
}

/// Corpus version of the documents currently under `paths.source_dir`.
pub fn current_corpus_version(config: &Config) -> Result<String> {
    Ok(IngestPlan::prepare(config)?.corpus_version)
}

/// `ragpipe fingerprint`: identity of the current configuration and corpus.
pub fn print_fingerprint(config: &Config) -> Result<()> {
    let plan = IngestPlan::prepare(config)?;
    println!("config_fingerprint: {}", plan.config_fingerprint);
    println!("corpus_version: {}", plan.corpus_version);
    println!("documents: {}", plan.documents.len());
    println!("ledger: {}", plan.ledger.path().display());
    Ok(())
}
