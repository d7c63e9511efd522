//! # ragpipe
//!
//! Idempotent document ingestion into a vector index, with dense and hybrid
//! retrieval.
//!
//! Every identifier in the pipeline is content addressed: a document is the
//! SHA-256 of its bytes, a chunk is the hash of its document, chunker version
//! and whitespace-normalised text, and an index point id is a UUIDv5 of
//! `(doc_id, chunk_index)`. The configuration fingerprint and the sorted
//! document set together form the *corpus version*, which names the ingestion
//! ledger. Change the documents or any interpreted setting and the ledger is
//! fresh; change nothing and a re-run indexes nothing.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐   ┌──────────────┐
//! │ sources  │──▶│ extract +    │──▶│ embedding │──▶│ vector_store │
//! │ (walk)   │   │ chunk        │   │ (gateway) │   │ (gateway)    │
//! └──────────┘   └──────────────┘   └───────────┘   └──────┬───────┘
//!       │                                                  │
//!       ▼                                                  ▼
//! ┌──────────┐   ┌──────────┐                        ┌──────────┐
//! │ identity │   │ ledger + │                        │  search  │
//! │          │   │ manifest │                        │ (fusion) │
//! └──────────┘   └──────────┘                        └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`identity`] | Document, chunk and point ids; config fingerprint; corpus version |
//! | [`chunk`] | Fixed-window character chunker |
//! | [`ledger`] | Per-corpus-version record of fully indexed documents |
//! | [`manifest`] | Per-run audit record |
//! | [`fusion`] | BM25, dense scoring and reciprocal rank fusion |
//! | [`retry`] | Backoff policy for gateway calls |
//! | [`error`] | Gateway and fusion error types |
//! | [`config`] | TOML configuration and validation |
//! | [`models`] | Core data types |
//! | [`sources`] | Document discovery |
//! | [`extract`] | PDF and text extraction, cleaning |
//! | [`embedding`] | Embedding gateway |
//! | [`vector_store`] | Vector-store gateway (Qdrant, in-memory) |
//! | [`ingest`] | Ingestion pipeline |
//! | [`search`] | Dense and hybrid query, document listing |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fusion;
pub mod identity;
pub mod ingest;
pub mod ledger;
pub mod manifest;
pub mod models;
pub mod retry;
pub mod search;
pub mod sources;
pub mod vector_store;
