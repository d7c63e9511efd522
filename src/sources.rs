//! Source document discovery.
//!
//! Walks `paths.source_dir`, applies the include/exclude globs, the
//! case-insensitive `only_match` file-name filter and the `max_files` cap,
//! then hashes every selected file once to obtain its `doc_id`. Results are
//! sorted by relative path so discovery order never depends on the
//! filesystem.
//!
//! A file that cannot be walked or read is not fatal. It is left out of the
//! document set (and therefore out of the corpus version) and reported in
//! [`Discovery::unreadable`] so the run manifest can list it.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::identity;
use crate::models::SourceDocument;

/// A selected path that could not be read during discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct UnreadableSource {
    pub relative_path: String,
    pub reason: String,
}

/// Result of walking the source directory.
#[derive(Debug, Default)]
pub struct Discovery {
    pub documents: Vec<SourceDocument>,
    pub unreadable: Vec<UnreadableSource>,
}

pub fn discover(config: &Config) -> Result<Discovery> {
    let root = &config.paths.source_dir;
    if !root.is_dir() {
        bail!("Source directory does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.ingest.include_globs)?;
    let exclude_set = build_globset(&config.ingest.exclude_globs)?;
    let needle = config.ingest.only_match.to_lowercase();
    let selected = |rel: &str, file_name: &str| {
        !exclude_set.is_match(rel)
            && include_set.is_match(rel)
            && (needle.is_empty() || file_name.to_lowercase().contains(&needle))
    };

    let mut candidates: Vec<(String, String, PathBuf)> = Vec::new();
    let mut unreadable = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.ingest.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let Some(path) = e.path() else {
                    tracing::warn!(error = %e, "skip_unreadable");
                    continue;
                };
                let rel_str = relative_str(root, path);
                if selected(&rel_str, &file_name_of(path)) {
                    tracing::warn!(doc = %rel_str, error = %e, "skip_unreadable");
                    unreadable.push(UnreadableSource {
                        relative_path: rel_str,
                        reason: e.to_string(),
                    });
                }
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let rel_str = relative_str(root, path);
        let file_name = file_name_of(path);
        if !selected(&rel_str, &file_name) {
            continue;
        }

        candidates.push((rel_str, file_name, path.to_path_buf()));
    }

    candidates.sort_by(|a, b| a.0.cmp(&b.0));
    if config.ingest.max_files > 0 {
        candidates.truncate(config.ingest.max_files);
    }

    let mut documents = Vec::with_capacity(candidates.len());
    for (relative_path, file_name, path) in candidates {
        match hash_file(&path) {
            Ok(doc_id) => documents.push(SourceDocument {
                path,
                relative_path,
                file_name,
                doc_id,
            }),
            Err(e) => {
                tracing::warn!(doc = %relative_path, error = %e, "skip_unreadable");
                unreadable.push(UnreadableSource {
                    relative_path,
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    unreadable.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(Discovery {
        documents,
        unreadable,
    })
}

fn relative_str(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// `doc_id` of the file currently at `path`.
pub fn hash_file(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(identity::doc_id(&bytes))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?,
        );
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_for(root: &Path, extra: &str) -> Config {
        let toml = format!(
            "[paths]\nsource_dir = {:?}\n[ingest]\ninclude_globs = [\"**/*.txt\"]\n{}",
            root.to_string_lossy(),
            extra
        );
        Config::from_toml_str(&toml).unwrap()
    }

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn test_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "b.txt", "bee");
        write(tmp.path(), "a.txt", "ay");
        write(tmp.path(), "nested/c.txt", "sea");
        write(tmp.path(), "skip.pdf", "not selected");

        let docs = discover(&config_for(tmp.path(), "")).unwrap().documents;
        let rels: Vec<&str> = docs.iter().map(|d| d.relative_path.as_str()).collect();
        assert_eq!(rels, vec!["a.txt", "b.txt", "nested/c.txt"]);
        assert_eq!(docs[0].doc_id, identity::doc_id(b"ay"));
        assert_eq!(docs[2].file_name, "c.txt");
    }

    #[test]
    fn test_only_match_is_case_insensitive() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "Annual-Report.txt", "x");
        write(tmp.path(), "notes.txt", "y");

        let docs = discover(&config_for(tmp.path(), "only_match = \"REPORT\"\n"))
            .unwrap()
            .documents;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].file_name, "Annual-Report.txt");
    }

    #[test]
    fn test_exclude_and_max_files() {
        let tmp = TempDir::new().unwrap();
        for name in ["a.txt", "b.txt", "c.txt", "drafts/d.txt"] {
            write(tmp.path(), name, name);
        }

        let docs = discover(&config_for(
            tmp.path(),
            "exclude_globs = [\"drafts/**\"]\nmax_files = 2\n",
        ))
        .unwrap()
        .documents;
        let rels: Vec<&str> = docs.iter().map(|d| d.relative_path.as_str()).collect();
        assert_eq!(rels, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = discover(&config_for(&tmp.path().join("nope"), "")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_doc_id_ignores_name() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "one.txt", "same bytes");
        write(tmp.path(), "two.txt", "same bytes");
        let docs = discover(&config_for(tmp.path(), "")).unwrap().documents;
        assert_eq!(docs[0].doc_id, docs[1].doc_id);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_is_reported_not_fatal() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.txt", "ay");
        std::os::unix::fs::symlink(tmp.path().join("missing.txt"), tmp.path().join("broken.txt"))
            .unwrap();
        // not selected by the include globs, so not reported either
        std::os::unix::fs::symlink(tmp.path().join("missing.pdf"), tmp.path().join("broken.pdf"))
            .unwrap();

        let found = discover(&config_for(tmp.path(), "follow_symlinks = true\n")).unwrap();
        let rels: Vec<&str> = found.documents.iter().map(|d| d.relative_path.as_str()).collect();
        assert_eq!(rels, vec!["a.txt"]);
        assert_eq!(found.unreadable.len(), 1);
        assert_eq!(found.unreadable[0].relative_path, "broken.txt");
        assert!(!found.unreadable[0].reason.is_empty());
    }
}
