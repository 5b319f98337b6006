//! End-to-end CLI tests for the video-collector binary.
//!
//! Only paths that fail before the fetch engine is invoked are exercised
//! here, so no yt-dlp binary is needed.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn collector_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("video-collector").unwrap();
    cmd.arg("--output").arg(dir.path().join("dataset.jsonl"));
    cmd
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("video-collector").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Collect metadata and media"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("video-collector").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("video-collector"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let mut cmd = Command::cargo_bin("video-collector").unwrap();
    cmd.arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

/// Empty input is a fatal run error (exit 2) and no dataset is created.
#[test]
fn test_binary_empty_input_is_fatal() {
    let dir = TempDir::new().unwrap();
    collector_cmd(&dir)
        .write_stdin("   \n")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no valid URLs"));
    assert!(!dir.path().join("dataset.jsonl").exists());
}

/// An unknown quality label is rejected before any fetch.
#[test]
fn test_binary_unknown_quality_is_fatal() {
    let dir = TempDir::new().unwrap();
    collector_cmd(&dir)
        .args(["--quality", "4k", "--mode", "metadata_only", "https://vimeo.com/1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("4k"));
}

/// Unparseable cookies carry the cookie suggestion.
#[test]
fn test_binary_bad_cookies_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let cookies = dir.path().join("cookies.txt");
    std::fs::write(&cookies, "this is not a cookie jar").unwrap();

    collector_cmd(&dir)
        .arg("--cookies-file")
        .arg(&cookies)
        .args(["--mode", "metadata_only", "https://vimeo.com/1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("[COOKIES]"));
}

/// Videos mode needs somewhere to put the media; no dataset is created.
#[test]
fn test_binary_videos_mode_without_store_is_fatal() {
    let dir = TempDir::new().unwrap();
    collector_cmd(&dir)
        .arg("https://vimeo.com/1")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--store-dir"));
    assert!(!dir.path().join("dataset.jsonl").exists());
}

/// A malformed input document is reported with exit 2.
#[test]
fn test_binary_malformed_input_document_is_fatal() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.json");
    std::fs::write(&input, r#"{"urls": "https://vimeo.com/1", "maxItems": -3}"#).unwrap();

    collector_cmd(&dir)
        .arg("--input")
        .arg(&input)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid run input"));
}
