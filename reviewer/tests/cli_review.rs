//! CLI tests: spawn the reviewer binary and check output and exit codes.

use std::process::Command;

use reviewer::exit_codes;
use reviewer::io::config::{ReviewerConfig, load_config};
use serde_json::Value;

#[test]
fn schema_prints_openapi_document() {
    let output = Command::new(env!("CARGO_BIN_EXE_reviewer"))
        .arg("schema")
        .output()
        .expect("reviewer schema");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let doc: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(doc["openapi"], "3.0.0");
    assert!(doc["paths"]["/agent"]["post"].is_object());
}

#[test]
fn init_config_writes_defaults_and_refuses_overwrite() {
    let temp = tempfile::tempdir().expect("tempdir");

    let status = Command::new(env!("CARGO_BIN_EXE_reviewer"))
        .current_dir(temp.path())
        .arg("init-config")
        .status()
        .expect("reviewer init-config");
    assert_eq!(status.code(), Some(exit_codes::OK));
    let cfg = load_config(&temp.path().join(".reviewer/config.toml")).expect("load");
    assert_eq!(cfg, ReviewerConfig::default());

    let status = Command::new(env!("CARGO_BIN_EXE_reviewer"))
        .current_dir(temp.path())
        .arg("init-config")
        .status()
        .expect("reviewer init-config");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}

/// An invalid URL is rejected before any worker process is spawned.
#[test]
fn review_with_invalid_url_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = Command::new(env!("CARGO_BIN_EXE_reviewer"))
        .current_dir(temp.path())
        .args(["review", "--pull-request-url", "https://example.com/nope"])
        .output()
        .expect("reviewer review");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let result: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(result["success"], Value::Bool(false));
}

#[test]
fn review_with_bad_criteria_json_exits_invalid() {
    let status = Command::new(env!("CARGO_BIN_EXE_reviewer"))
        .args([
            "review",
            "--pull-request-url",
            "https://github.com/acme/widgets/pull/42",
            "--review-criteria",
            "{not json",
        ])
        .status()
        .expect("reviewer review");

    assert_eq!(status.code(), Some(exit_codes::INVALID));
}
