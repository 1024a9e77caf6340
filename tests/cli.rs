//! End-to-end tests driving the `portal` binary with the offline `hash`
//! embedding provider.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn portal_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_portal"))
}

fn minimal_docx_with_text(text: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>",
            text
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

/// Temp root with `config/portal.toml` and three input files.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();

    fs::write(
        files_dir.join("alpha.txt"),
        "Alpha notes about Rust programming. It covers cargo and crates.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.txt"),
        "Beta notes discuss Python and machine learning with PyTorch.",
    )
    .unwrap();
    fs::write(
        files_dir.join("budget.docx"),
        minimal_docx_with_text("Quarterly budget report for the finance team."),
    )
    .unwrap();
    fs::write(files_dir.join("sheet.xlsx"), "not supported").unwrap();

    let config_content = format!(
        r#"[storage]
upload_base = "{root}/data"
index_base = "{root}/index"
analysis_base = "{root}/data/document_analysis"
compare_base = "{root}/data/document_compare"

[chunking]
chunk_size = 500
chunk_overlap = 50

[retrieval]
k = 2

[embedding]
provider = "hash"
dims = 256

[server]
bind = "127.0.0.1:8931"
"#,
        root = root.display()
    );
    let config_path = root.join("config").join("portal.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn input(tmp: &TempDir, name: &str) -> String {
    tmp.path().join("files").join(name).display().to_string()
}

fn run_portal(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = portal_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("LLM_PROVIDER")
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run portal binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn ingest_all(tmp: &TempDir, config_path: &Path, session: &str) -> (String, String, bool) {
    let alpha = input(tmp, "alpha.txt");
    let beta = input(tmp, "beta.txt");
    let budget = input(tmp, "budget.docx");
    let sheet = input(tmp, "sheet.xlsx");
    run_portal(
        config_path,
        &["ingest", &alpha, &beta, &budget, &sheet, "--session", session],
    )
}

#[test]
fn test_ingest_reports_counts() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = ingest_all(&tmp, &config_path, "s1");
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Ingest session: s1"), "got: {}", stdout);
    assert!(stdout.contains("chunks: 3"), "got: {}", stdout);
    assert!(stdout.contains("chunks added: 3"), "got: {}", stdout);

    let index_dir = tmp.path().join("index").join("s1");
    assert!(index_dir.join("ingested_meta.json").is_file());
    assert!(index_dir.join("index.vectors").is_file());
    assert!(tmp.path().join("data").join("s1").join("alpha.txt").is_file());
}

#[test]
fn test_reingest_adds_nothing() {
    let (tmp, config_path) = setup_test_env();

    let (stdout1, _, success1) = ingest_all(&tmp, &config_path, "s1");
    assert!(success1);
    assert!(stdout1.contains("chunks added: 3"));

    let (stdout2, stderr2, success2) = ingest_all(&tmp, &config_path, "s1");
    assert!(success2, "second ingest failed: {}", stderr2);
    assert!(stdout2.contains("chunks added: 0"), "got: {}", stdout2);
    assert!(stdout2.contains("index size: 3"), "got: {}", stdout2);
}

#[test]
fn test_search_ranks_matching_file_first() {
    let (tmp, config_path) = setup_test_env();
    ingest_all(&tmp, &config_path, "s1");

    let (stdout, stderr, success) =
        run_portal(&config_path, &["search", "Rust cargo crates", "--session", "s1"]);
    assert!(success, "search failed: {}", stderr);
    let first = stdout.lines().find(|l| l.starts_with("1.")).unwrap_or_default();
    assert!(first.contains("alpha.txt"), "got: {}", stdout);

    let (stdout, _, success) =
        run_portal(&config_path, &["search", "finance budget report", "--session", "s1"]);
    assert!(success);
    let first = stdout.lines().find(|l| l.starts_with("1.")).unwrap_or_default();
    assert!(first.contains("budget.docx"), "got: {}", stdout);
}

#[test]
fn test_search_respects_k() {
    let (tmp, config_path) = setup_test_env();
    ingest_all(&tmp, &config_path, "s1");

    let (stdout, _, success) = run_portal(
        &config_path,
        &["search", "notes", "--session", "s1", "--k", "1"],
    );
    assert!(success);
    assert!(stdout.contains("1. ["));
    assert!(!stdout.contains("2. ["), "got: {}", stdout);
}

#[test]
fn test_sessions_are_isolated() {
    let (tmp, config_path) = setup_test_env();
    let alpha = input(&tmp, "alpha.txt");
    let (_, _, success) = run_portal(&config_path, &["ingest", &alpha, "--session", "a"]);
    assert!(success);

    let (stdout, stderr, success) =
        run_portal(&config_path, &["search", "Rust", "--session", "b"]);
    assert!(!success, "expected failure, got: {}", stdout);
    assert!(stderr.contains("Index not found"), "got: {}", stderr);
}

#[test]
fn test_search_requires_session() {
    let (tmp, config_path) = setup_test_env();
    ingest_all(&tmp, &config_path, "s1");

    let (_, stderr, success) = run_portal(&config_path, &["search", "Rust"]);
    assert!(!success);
    assert!(stderr.contains("--session"), "got: {}", stderr);
}

#[test]
fn test_only_unsupported_files_fails() {
    let (tmp, config_path) = setup_test_env();
    let sheet = input(&tmp, "sheet.xlsx");

    let (_, stderr, success) = run_portal(&config_path, &["ingest", &sheet, "--session", "s1"]);
    assert!(!success);
    assert!(stderr.contains("no valid documents"), "got: {}", stderr);
}

#[test]
fn test_ask_without_llm_fails() {
    let (tmp, config_path) = setup_test_env();
    ingest_all(&tmp, &config_path, "s1");

    let (_, stderr, success) =
        run_portal(&config_path, &["ask", "What is Rust?", "--session", "s1"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "got: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_portal(&tmp.path().join("nope.toml"), &["search", "x"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "got: {}", stderr);
}
