//! Per-run audit record.
//!
//! A manifest is written once at the end of every ingestion run to
//! `runs_dir/{run_id}.json` and never modified afterwards.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound on failure records kept in a manifest.
pub const MAX_FAILURES: usize = 200;

/// Why a document was not indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub document: String,
    pub doc_id: String,
    pub reason: String,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub env: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub collection: String,
    pub pipeline_version: String,
    pub config_fingerprint: String,
    pub corpus_version: String,
    pub source_dir: String,
    pub doc_count: usize,
    pub docs_indexed: usize,
    pub docs_skipped: usize,
    pub docs_cached: usize,
    pub vectors_upserted: usize,
    pub elapsed_seconds: f64,
    pub ledger_path: String,
    pub failures: Vec<FailureRecord>,
    /// Total failures, including those dropped past [`MAX_FAILURES`].
    pub failures_total: usize,
}

/// Generate a run id: UTC timestamp plus a short random suffix.
pub fn new_run_id(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", now.format("%Y%m%dT%H%M%SZ"), &suffix[..8])
}

/// Bounded failure collector.
#[derive(Debug, Default)]
pub struct FailureLog {
    kept: Vec<FailureRecord>,
    total: usize,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, document: &str, doc_id: &str, reason: impl Into<String>) {
        self.total += 1;
        if self.kept.len() < MAX_FAILURES {
            self.kept.push(FailureRecord {
                document: document.to_string(),
                doc_id: doc_id.to_string(),
                reason: reason.into(),
            });
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn into_parts(self) -> (Vec<FailureRecord>, usize) {
        (self.kept, self.total)
    }
}

impl RunManifest {
    /// Write to `runs_dir/{run_id}.json`, creating the directory if needed.
    pub fn write(&self, runs_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(runs_dir)
            .with_context(|| format!("Failed to create runs directory: {}", runs_dir.display()))?;
        let path = runs_dir.join(format!("{}.json", self.run_id));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| "Failed to parse manifest")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(run_id: &str) -> RunManifest {
        let now = Utc::now();
        RunManifest {
            run_id: run_id.to_string(),
            env: "test".to_string(),
            started_at: now,
            finished_at: now,
            collection: "rag_collection".to_string(),
            pipeline_version: "v1".to_string(),
            config_fingerprint: "fp".to_string(),
            corpus_version: "cv".to_string(),
            source_dir: "data".to_string(),
            doc_count: 2,
            docs_indexed: 1,
            docs_skipped: 1,
            docs_cached: 0,
            vectors_upserted: 3,
            elapsed_seconds: 0.5,
            ledger_path: "data/ingested_cv.txt".to_string(),
            failures: vec![FailureRecord {
                document: "b.pdf".to_string(),
                doc_id: "d2".to_string(),
                reason: "zero_chunks".to_string(),
            }],
            failures_total: 1,
        }
    }

    #[test]
    fn test_failure_log_is_bounded() {
        let mut log = FailureLog::new();
        for i in 0..(MAX_FAILURES + 25) {
            log.push(&format!("f{}.pdf", i), "id", "zero_chunks");
        }
        assert_eq!(log.total(), MAX_FAILURES + 25);
        let (kept, total) = log.into_parts();
        assert_eq!(kept.len(), MAX_FAILURES);
        assert_eq!(total, MAX_FAILURES + 25);
        assert_eq!(kept[0].document, "f0.pdf");
    }

    #[test]
    fn test_write_and_read_back() {
        let tmp = TempDir::new().unwrap();
        let runs = tmp.path().join("runs");
        let path = sample("20260101T000000Z-abcd1234").write(&runs).unwrap();
        assert_eq!(path, runs.join("20260101T000000Z-abcd1234.json"));

        let back = RunManifest::read(&path).unwrap();
        assert_eq!(back.corpus_version, "cv");
        assert_eq!(back.failures.len(), 1);
        assert_eq!(back.failures[0].reason, "zero_chunks");

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        for key in ["run_id", "docs_indexed", "docs_skipped", "vectors_upserted", "failures"] {
            assert!(raw.get(key).is_some(), "missing {}", key);
        }
    }

    #[test]
    fn test_run_id_shape() {
        let now = DateTime::parse_from_rfc3339("2026-03-04T05:06:07Z")
            .unwrap()
            .with_timezone(&Utc);
        let id = new_run_id(now);
        assert!(id.starts_with("20260304T050607Z-"));
        assert_eq!(id.len(), "20260304T050607Z-".len() + 8);
    }
}
