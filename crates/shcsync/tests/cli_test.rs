//! Integration tests for the `shcsync` binary.
//!
//! Argument parsing, help, completions and the failure paths that happen
//! before any network traffic. No controller is needed.
#![allow(clippy::unwrap_used)]

use std::io::Write;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command with env isolation: no `SHCSYNC_*` overrides and a
/// config directory that does not exist.
fn shcsync_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("shcsync");
    cmd.env("HOME", "/tmp/shcsync-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/shcsync-cli-test-nonexistent")
        .env_remove("RUST_LOG");
    for (key, _) in std::env::vars() {
        if key.starts_with("SHCSYNC_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = shcsync_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "Expected 'Usage' in:\n{stderr}");
}

#[test]
fn test_help_lists_subcommands() {
    shcsync_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("Smart Home Controller")
            .and(predicate::str::contains("run"))
            .and(predicate::str::contains("discover"))
            .and(predicate::str::contains("completions")),
    );
}

#[test]
fn test_version_flag() {
    shcsync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("shcsync"));
}

#[test]
fn test_unknown_log_format_rejected() {
    shcsync_cmd()
        .args(["--log-format", "xml", "discover"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("xml"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    shcsync_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("shcsync"));
}

#[test]
fn test_completions_need_no_config() {
    shcsync_cmd()
        .args(["--config", "/nonexistent/config.toml", "completions", "zsh"])
        .assert()
        .success();
}

// ── Configuration failures ──────────────────────────────────────────

#[test]
fn test_missing_host_is_usage_error() {
    shcsync_cmd()
        .args(["--identifier", "home", "discover"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("host"));
}

#[test]
fn test_missing_identifier_is_usage_error() {
    shcsync_cmd()
        .args(["--host", "192.168.0.10", "discover"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("identifier"));
}

#[test]
fn test_explicit_config_must_exist() {
    shcsync_cmd()
        .args(["--config", "/nonexistent/shcsync.toml", "discover"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("/nonexistent/shcsync.toml"));
}

#[test]
fn test_invalid_namespace_from_env() {
    shcsync_cmd()
        .env("SHCSYNC_NAMESPACE", "bad..ns")
        .args(["--host", "hub", "--identifier", "home", "discover"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("namespace"));
}

#[test]
fn test_missing_client_certificate_is_auth_error() {
    let file = config_file(
        r#"
            host = "192.168.0.10"
            identifier = "home"
            client_cert = "/nonexistent/cert.pem"
            client_key = "/nonexistent/key.pem"
        "#,
    );
    shcsync_cmd()
        .arg("--config")
        .arg(file.path())
        .arg("discover")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("certificate"));
}
