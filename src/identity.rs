//! Content-addressed identity and versioning.
//!
//! Every identifier the pipeline persists is a pure function of its inputs:
//!
//! | Identifier | Derived from |
//! |------------|--------------|
//! | `doc_id` | SHA-256 of the raw file bytes |
//! | `chunk_id` | SHA-256 of `doc_id`, chunker version and whitespace-normalized text |
//! | `config_fingerprint` | SHA-256 of the canonical (key-sorted) pipeline configuration |
//! | `corpus_version` | SHA-256 of the sorted `doc_id` set plus the fingerprint |
//! | `stable_point_id` | UUIDv5 of `"{doc_id}:{chunk_index}"` in a fixed namespace |
//!
//! File names and paths never participate, so moving or renaming a document
//! does not change its identity. The corpus version is the only signal used to
//! invalidate the ingestion ledger.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Namespace for index point identifiers. Changing it re-keys every point.
pub const POINT_NAMESPACE: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_567812345678);

/// Lowercase hex SHA-256 digest of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Document identifier: the content hash of the file bytes.
pub fn doc_id(bytes: &[u8]) -> String {
    hash_bytes(bytes)
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Chunk identifier.
///
/// Text is whitespace-normalized before hashing, so two chunks of the same
/// document that differ only in spacing share an id.
pub fn chunk_id(doc_id: &str, chunker_version: &str, text: &str) -> String {
    let normalized = normalize_whitespace(text);
    hash_bytes(format!("{}|{}|{}", doc_id, chunker_version, normalized).as_bytes())
}

/// Fingerprint of a serializable configuration.
///
/// The value is rendered as canonical JSON (object keys sorted at every level,
/// `,` and `:` separators, no whitespace) before hashing, so field order in
/// the source file or struct never affects the result.
pub fn config_fingerprint<T: Serialize>(config: &T) -> Result<String> {
    let value =
        serde_json::to_value(config).context("configuration cannot be fingerprinted")?;
    Ok(hash_bytes(canonical_json(&value).as_bytes()))
}

/// Corpus version for a document set under a given configuration.
///
/// `doc_ids` are de-duplicated and sorted first; discovery order is irrelevant.
pub fn corpus_version<I, S>(doc_ids: I, config_fingerprint: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let docs: BTreeSet<String> = doc_ids
        .into_iter()
        .map(|d| d.as_ref().to_string())
        .collect();
    let payload = serde_json::json!({
        "config_fingerprint": config_fingerprint,
        "docs": docs,
    });
    hash_bytes(canonical_json(&payload).as_bytes())
}

/// Deterministic index point id for chunk `chunk_index` of `doc_id`.
pub fn stable_point_id(doc_id: &str, chunk_index: usize) -> Uuid {
    Uuid::new_v5(
        &POINT_NAMESPACE,
        format!("{}:{}", doc_id, chunk_index).as_bytes(),
    )
}

/// Render a JSON value with sorted object keys and compact separators.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
