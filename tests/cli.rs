use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ragpipe_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ragpipe");
    path
}

fn write_config(root: &Path, extra: &str) -> PathBuf {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"env = "test"

[paths]
source_dir = "{root}/files"
runs_dir = "{root}/data/runs"
ledger_dir = "{root}/data/ingested"

[ingest]
include_globs = ["**/*.md", "**/*.txt"]

{extra}
"#,
        root = root.display(),
        extra = extra
    );

    let config_path = config_dir.join("ragpipe.toml");
    fs::write(&config_path, config_content).unwrap();
    config_path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.md"),
        "# Beta Document\n\nThis document discusses Python and machine learning.",
    )
    .unwrap();
    fs::write(
        files_dir.join("gamma.txt"),
        "Gamma plain text file.\n\nContains notes about deployment and infrastructure.",
    )
    .unwrap();

    let config_path = write_config(&root, "");
    (tmp, config_path)
}

fn run_ragpipe(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ragpipe_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ragpipe binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn line_value(stdout: &str, key: &str) -> String {
    stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix(&format!("{}: ", key)))
        .unwrap_or_else(|| panic!("no '{}' line in: {}", key, stdout))
        .to_string()
}

#[test]
fn test_fingerprint_is_stable_across_runs() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout1, stderr, success) = run_ragpipe(&config_path, &["fingerprint"]);
    assert!(success, "fingerprint failed: stdout={}, stderr={}", stdout1, stderr);
    let (stdout2, _, _) = run_ragpipe(&config_path, &["fingerprint"]);

    let cv = line_value(&stdout1, "corpus_version");
    assert_eq!(cv.len(), 64);
    assert_eq!(cv, line_value(&stdout2, "corpus_version"));
    assert_eq!(
        line_value(&stdout1, "config_fingerprint"),
        line_value(&stdout2, "config_fingerprint")
    );
    assert!(stdout1.contains("documents: 3"));
    assert!(stdout1.contains(&format!("ingested_{}.txt", cv)));
}

#[test]
fn test_fingerprint_changes_with_chunking() {
    let (tmp, config_path) = setup_test_env();
    let (before, _, _) = run_ragpipe(&config_path, &["fingerprint"]);

    let config_path = write_config(tmp.path(), "[chunking]\nchunk_chars = 800\noverlap = 100\n");
    let (after, _, success) = run_ragpipe(&config_path, &["fingerprint"]);
    assert!(success);

    assert_ne!(
        line_value(&before, "config_fingerprint"),
        line_value(&after, "config_fingerprint")
    );
    assert_ne!(
        line_value(&before, "corpus_version"),
        line_value(&after, "corpus_version")
    );
}

#[test]
fn test_corpus_version_tracks_documents() {
    let (tmp, config_path) = setup_test_env();
    let (before, _, _) = run_ragpipe(&config_path, &["fingerprint"]);

    fs::write(tmp.path().join("files/delta.md"), "A new document.").unwrap();
    let (after, _, _) = run_ragpipe(&config_path, &["fingerprint"]);

    assert_eq!(
        line_value(&before, "config_fingerprint"),
        line_value(&after, "config_fingerprint")
    );
    assert_ne!(
        line_value(&before, "corpus_version"),
        line_value(&after, "corpus_version")
    );
    assert!(after.contains("documents: 4"));
}

#[test]
fn test_invalid_overlap_is_fatal() {
    let (tmp, _) = setup_test_env();
    let config_path = write_config(tmp.path(), "[chunking]\nchunk_chars = 100\noverlap = 100\n");

    let (_, stderr, success) = run_ragpipe(&config_path, &["ingest"]);
    assert!(!success);
    assert!(stderr.contains("overlap"), "stderr: {}", stderr);
    assert!(!tmp.path().join("data/runs").exists());
}

#[test]
fn test_unknown_distance_is_fatal() {
    let (tmp, _) = setup_test_env();
    let config_path = write_config(tmp.path(), "[vector_store]\ndistance = \"hamming\"\n");

    let (_, stderr, success) = run_ragpipe(&config_path, &["fingerprint"]);
    assert!(!success);
    assert!(stderr.contains("distance"), "stderr: {}", stderr);
}

#[test]
fn test_empty_corpus_is_fatal() {
    let (tmp, _) = setup_test_env();
    let config_path = write_config(tmp.path(), "");
    fs::write(
        &config_path,
        fs::read_to_string(&config_path)
            .unwrap()
            .replace(r#"["**/*.md", "**/*.txt"]"#, r#"["**/*.pdf"]"#),
    )
    .unwrap();

    let (_, stderr, success) = run_ragpipe(&config_path, &["ingest"]);
    assert!(!success);
    assert!(stderr.contains("No documents found"), "stderr: {}", stderr);
    assert!(!tmp.path().join("data/runs").exists());
}

#[test]
fn test_missing_config_errors() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_ragpipe(&tmp.path().join("nope.toml"), &["fingerprint"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_ingest_dry_run() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ragpipe(&config_path, &["ingest", "--dry-run"]);
    assert!(success, "dry-run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("documents: 3"));
    assert!(stdout.contains("cached: 0"));
    assert!(stdout.contains("pending: 3"));
    assert!(stdout.contains("alpha.md"));

    // Nothing is written by a dry run.
    assert!(!tmp.path().join("data/runs").exists());
    assert!(!tmp.path().join("data/ingested").exists());
}

#[test]
fn test_dry_run_reports_cached_documents() {
    let (tmp, config_path) = setup_test_env();
    let (stdout, _, _) = run_ragpipe(&config_path, &["fingerprint"]);
    let ledger = PathBuf::from(line_value(&stdout, "ledger"));

    let alpha = fs::read(tmp.path().join("files/alpha.md")).unwrap();
    fs::create_dir_all(ledger.parent().unwrap()).unwrap();
    fs::write(&ledger, format!("{}\n", ragpipe::identity::doc_id(&alpha))).unwrap();

    let (stdout, _, success) = run_ragpipe(&config_path, &["ingest", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("cached: 1"));
    assert!(stdout.contains("pending: 2"));
    assert!(!stdout.contains("alpha.md"));
}

#[test]
fn test_search_unknown_mode_errors() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_ragpipe(&config_path, &["search", "rust", "--mode", "keyword"]);
    assert!(!success);
    assert!(stderr.contains("keyword"));
}
