//! Ingestion ledger: the persisted set of fully indexed documents.
//!
//! One plain-text file per corpus version (`ingested_{corpus_version}.txt`),
//! one `doc_id` per line, append-only. A configuration change produces a new
//! corpus version and therefore a fresh, empty ledger; nothing is ever
//! invalidated in place.
//!
//! Callers append a `doc_id` only after every chunk of the document has been
//! embedded and upserted. A crash or gateway failure mid-document leaves no
//! entry, so the next run retries the whole document.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Ledger file location for `corpus_version` under `ledger_dir`.
pub fn ledger_path(ledger_dir: &Path, corpus_version: &str) -> PathBuf {
    ledger_dir.join(format!("ingested_{}.txt", corpus_version))
}

/// Read the completed `doc_id`s. A missing file is an empty ledger.
pub fn load(path: &Path) -> Result<HashSet<String>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ledger: {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Append one `doc_id`, creating parent directories if needed.
pub fn append(path: &Path, doc_id: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create ledger directory: {}", parent.display())
            })?;
        }
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open ledger: {}", path.display()))?;
    writeln!(file, "{}", doc_id)
        .with_context(|| format!("Failed to append to ledger: {}", path.display()))?;
    file.sync_data()?;
    Ok(())
}

/// In-memory view of one ledger file.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    completed: HashSet<String>,
}

impl Ledger {
    /// Open (or lazily create) the ledger for `corpus_version`.
    pub fn open(ledger_dir: &Path, corpus_version: &str) -> Result<Self> {
        let path = ledger_path(ledger_dir, corpus_version);
        let completed = load(&path)?;
        Ok(Self { path, completed })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, doc_id: &str) -> bool {
        self.completed.contains(doc_id)
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// Record a fully indexed document. Re-recording is a no-op.
    pub fn record(&mut self, doc_id: &str) -> Result<()> {
        if self.completed.contains(doc_id) {
            return Ok(());
        }
        append(&self.path, doc_id)?;
        self.completed.insert(doc_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let set = load(&tmp.path().join("nope.txt")).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_append_creates_parents_and_roundtrips() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a/b/ingested_v1.txt");
        append(&path, "doc1").unwrap();
        append(&path, "doc2").unwrap();
        let set = load(&path).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("doc1") && set.contains("doc2"));
    }

    #[test]
    fn test_load_ignores_blank_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("l.txt");
        std::fs::write(&path, "doc1\n\n  \ndoc2  \n").unwrap();
        let set = load(&path).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("doc2"));
    }

    #[test]
    fn test_ledger_scoped_by_corpus_version() {
        let tmp = TempDir::new().unwrap();
        let mut v1 = Ledger::open(tmp.path(), "v1").unwrap();
        v1.record("doc1").unwrap();

        let v1_again = Ledger::open(tmp.path(), "v1").unwrap();
        assert!(v1_again.contains("doc1"));

        let v2 = Ledger::open(tmp.path(), "v2").unwrap();
        assert!(v2.is_empty());
        assert_ne!(v1_again.path(), v2.path());
    }

    #[test]
    fn test_record_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let mut ledger = Ledger::open(tmp.path(), "v1").unwrap();
        ledger.record("doc1").unwrap();
        ledger.record("doc1").unwrap();
        let content = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(content, "doc1\n");
        assert_eq!(ledger.len(), 1);
    }
}
