use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn lw_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("lw");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    // Create config
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Create test corpus
    let corpus_dir = root.join("corpus");
    fs::create_dir_all(&corpus_dir).unwrap();
    fs::write(
        corpus_dir.join("alpha.md"),
        "# Alpha Document\n\nNotes on the deployment pipeline.\n\nSee [[beta.md]] for the infrastructure details.",
    )
    .unwrap();
    fs::write(
        corpus_dir.join("beta.md"),
        "# Beta Document\n\nInfrastructure details: Kubernetes, Docker, Terraform.",
    )
    .unwrap();

    let config_content = format!(
        r#"[corpus]
root = "{}/corpus"
include_globs = ["**/*.md"]
exclude_globs = []

[model]
provider = "disabled"

[enrichment]
concurrency = 1
"#,
        root.display()
    );

    let config_path = config_dir.join("lw.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_lw(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = lw_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run lw binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_backlinks_inserts_section() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_lw(&config_path, &["backlinks", "alpha.md"]);
    assert!(
        success,
        "backlinks failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("backlinks added: 1"));
    assert!(stdout.contains("beta.md"));

    let beta = fs::read_to_string(tmp.path().join("corpus/beta.md")).unwrap();
    assert!(beta.contains("## Backlinks"));
    assert!(beta.contains("[alpha.md](alpha.md)"));
}

#[test]
fn test_backlinks_idempotent() {
    let (tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_lw(&config_path, &["backlinks", "alpha.md"]);
    assert!(success1, "First backlinks run failed");

    let (stdout2, _, success2) = run_lw(&config_path, &["backlinks", "alpha.md"]);
    assert!(success2, "Second backlinks run failed");
    assert!(stdout2.contains("backlinks added: 0"));

    let beta = fs::read_to_string(tmp.path().join("corpus/beta.md")).unwrap();
    assert_eq!(beta.matches("## Backlinks").count(), 1);
    assert_eq!(beta.matches("[alpha.md]").count(), 1);
}

#[test]
fn test_backlinks_missing_document_errors() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_lw(&config_path, &["backlinks", "missing.md"]);
    assert!(!success);
    assert!(
        stderr.contains("not in corpus"),
        "Expected missing-document error, got: {}",
        stderr
    );
}

#[test]
fn test_sweep_dry_run_counts_without_mutating() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_lw(&config_path, &["sweep", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("would process:   2"));

    let beta = fs::read_to_string(tmp.path().join("corpus/beta.md")).unwrap();
    assert!(!beta.contains("## Backlinks"));
}

#[test]
fn test_sweep_with_disabled_model_fails_documents_not_run() {
    let (_tmp, config_path) = setup_test_env();

    // Analysis needs a model, so every document fails, but the sweep
    // itself completes cleanly.
    let (stdout, _, success) = run_lw(&config_path, &["sweep"]);
    assert!(success, "sweep exited nonzero: {}", stdout);
    assert!(stdout.contains("failed:          2"));
    assert!(stdout.contains("processed:       0"));
}

#[test]
fn test_ledger_processor_empty() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_lw(&config_path, &["ledger", "processor"]);
    assert!(success);
    assert!(stdout.contains("0 records for processor enrich"));
}

#[test]
fn test_ledger_path_no_records() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_lw(&config_path, &["ledger", "path", "alpha.md"]);
    assert!(success);
    assert!(stdout.contains("No records for alpha.md"));
}

#[test]
fn test_ledger_clean_empty_ledger() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_lw(&config_path, &["ledger", "clean", "--days", "30"]);
    assert!(success);
    assert!(stdout.contains("removed 0 records older than 30 days"));
}

#[test]
fn test_missing_config_errors() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_lw(&missing, &["ledger", "processor"]);
    assert!(!success);
    assert!(
        stderr.contains("Failed to read config"),
        "Expected config error, got: {}",
        stderr
    );
}

#[test]
fn test_analyze_requires_model() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success) = run_lw(&config_path, &["analyze", "alpha.md"]);
    assert!(!success, "analyze should fail with the disabled provider");
}

#[test]
fn test_detect_requires_model_but_degrades() {
    let (_tmp, config_path) = setup_test_env();

    // Detection degrades to an empty result when no model is available.
    let (stdout, _, success) = run_lw(&config_path, &["detect", "alpha.md"]);
    assert!(success);
    assert!(stdout.contains("No relationships above threshold."));
}
