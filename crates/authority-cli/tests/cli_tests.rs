//! Integration tests for the `authority` CLI binary.
//!
//! These exercise the CLI as a subprocess, verifying exit codes and
//! stdout/stderr, without requiring a running authority server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::process::Command;

fn authority_bin() -> String {
    let path = env!("CARGO_BIN_EXE_authority");
    assert!(Path::new(path).exists(), "authority binary not found at {path}");
    path.to_owned()
}

fn run(args: &[&str]) -> (i32, String, String) {
    let output = Command::new(authority_bin())
        .args(args)
        .env("AUTHORITY_ADDR", "http://127.0.0.1:19999")
        .output()
        .expect("failed to execute authority");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

#[test]
fn test_version_flag() {
    let (code, stdout, _) = run(&["--version"]);
    assert_eq!(code, 0, "authority --version should exit 0");
    assert!(stdout.contains("authority"), "version output should mention the binary name: {stdout}");
}

#[test]
fn test_help_flag() {
    let (code, stdout, _) = run(&["--help"]);
    assert_eq!(code, 0, "authority --help should exit 0");
    assert!(stdout.contains("propose") || stdout.contains("Propose"));
}

#[test]
fn test_propose_requires_required_args() {
    let (code, _stdout, stderr) = run(&["propose", "--description", "test"]);
    assert_ne!(code, 0, "propose without required args should fail");
    assert!(!stderr.is_empty());
}

#[test]
fn test_dispatch_against_unreachable_server_fails_gracefully() {
    let (code, _stdout, stderr) = run(&["dispatch", "00000000-0000-0000-0000-000000000000"]);
    assert_ne!(code, 0, "dispatch against an unreachable server should fail");
    assert!(stderr.contains("error"));
}

#[test]
fn test_health_against_unreachable_server_fails_gracefully() {
    let (code, _stdout, stderr) = run(&["health"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error"));
}

#[test]
fn test_lease_create_against_unreachable_server_fails_gracefully() {
    let (code, _stdout, stderr) = run(&["lease", "create", "--session-id", "s-1", "--domain", "chrome"]);
    assert_ne!(code, 0, "lease create against an unreachable server should fail");
    assert!(stderr.contains("error"));
}

#[test]
fn test_lease_heartbeat_against_unreachable_server_fails_gracefully() {
    let (code, _stdout, stderr) = run(&["lease", "heartbeat", "some-lease-id"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error"));
}

#[test]
fn test_switch_context_against_unreachable_server_fails_gracefully() {
    let (code, _stdout, stderr) = run(&["switch-context", "--context-id", "ctx-2", "--source-hash", "hash-b"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error"));
}
