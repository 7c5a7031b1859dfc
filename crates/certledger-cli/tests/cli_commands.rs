// crates/certledger-cli/tests/cli_commands.rs
// ============================================================================
// Module: CLI Command Tests
// Description: Integration tests for the certledger binary.
// Purpose: Ensure commands emit JSON on success and taxonomy lines on failure.
// Dependencies: certledger-cli binary, serde_json, tempfile
// ============================================================================

//! ## Overview
//! Runs the `certledger` binary against a temporary `SQLite` directory and
//! checks range administration, record import and lifecycle commands, and the
//! `kind: message` failure contract.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

use serde_json::Value;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn certledger_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_certledger"))
}

/// Writes a sqlite-backed config into a fresh temp directory.
fn workspace() -> (TempDir, PathBuf) {
    let root = tempfile::tempdir().expect("temp dir");
    let db = root.path().join("ledger.db");
    let config = format!(
        "[replica]\nid = \"ca-1\"\n\n[store]\ntype = \"sqlite\"\npath = {db:?}\n\n[audit]\nsink = \
         \"none\"\n",
        db = db.to_string_lossy()
    );
    let config_path = root.path().join("certledger.toml");
    fs::write(&config_path, config).expect("write config");
    (root, config_path)
}

fn run(config: &Path, args: &[&str]) -> Output {
    Command::new(certledger_bin())
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("run certledger")
}

fn run_json(config: &Path, args: &[&str]) -> Value {
    let output = run(config, args);
    assert!(
        output.status.success(),
        "command {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout json")
}

fn run_failure(config: &Path, args: &[&str]) -> String {
    let output = run(config, args);
    assert_eq!(output.status.code(), Some(1), "command {args:?} should fail");
    assert!(output.stdout.is_empty(), "failure should not print stdout");
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn write_imports(root: &Path) -> (PathBuf, PathBuf) {
    let certificates = serde_json::json!([
        {
            "serial_number": "0x1f",
            "subject": "CN=alpha",
            "issuer": "CN=Test CA",
            "not_before": 1_000,
            "not_after": 2_000,
            "status": "VALID",
            "originating_request_id": "7",
            "certificate_bytes": "AQID",
            "created_at": 1_000,
            "modified_at": 1_000
        },
        {
            "serial_number": "0x20",
            "subject": "CN=beta",
            "issuer": "CN=Test CA",
            "not_before": 1_000,
            "not_after": 9_000,
            "status": "VALID",
            "originating_request_id": "8",
            "certificate_bytes": "BAUG",
            "created_at": 1_000,
            "modified_at": 1_000
        }
    ]);
    let requests = serde_json::json!([
        {
            "request_id": "7",
            "request_type": "enrollment",
            "status": "complete",
            "result_certificate_id": "0x1f",
            "created_at": 900,
            "modified_at": 1_000
        },
        {
            "request_id": "9",
            "request_type": "revocation",
            "status": "pending",
            "created_at": 1_500,
            "modified_at": 1_500
        }
    ]);
    let cert_path = root.join("certificates.json");
    let request_path = root.join("requests.json");
    fs::write(&cert_path, certificates.to_string()).expect("write certificates");
    fs::write(&request_path, requests.to_string()).expect("write requests");
    (cert_path, request_path)
}

fn import_fixture(root: &Path, config: &Path) {
    let (certificates, requests) = write_imports(root);
    let summary = run_json(
        config,
        &[
            "import",
            "--certificates",
            certificates.to_str().expect("utf-8 path"),
            "--requests",
            requests.to_str().expect("utf-8 path"),
        ],
    );
    assert_eq!(summary["certificates_imported"], 2);
    assert_eq!(summary["requests_imported"], 2);
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Verifies config validation prints the effective configuration.
#[test]
fn config_validate_prints_effective_config() {
    let (_root, config) = workspace();
    let report = run_json(&config, &["config", "validate"]);
    assert_eq!(report["status"], "valid");
    assert_eq!(report["config"]["replica"]["id"], "ca-1");
    assert_eq!(report["config"]["store"]["type"], "sqlite");
}

/// Verifies invalid configuration fails with the config taxonomy label.
#[test]
fn config_validate_rejects_invalid_config() {
    let root = tempfile::tempdir().expect("temp dir");
    let config = root.path().join("certledger.toml");
    fs::write(&config, "[replica]\nid = \"ca 1\"\n").expect("write config");
    let stderr = run_failure(&config, &["config", "validate"]);
    assert!(stderr.starts_with("config_invalid: "), "unexpected stderr: {stderr}");
    assert!(stderr.contains("Failed to load config"), "unexpected stderr: {stderr}");
}

// ============================================================================
// SECTION: Ranges and Counters
// ============================================================================

/// Verifies lease, show, and release round through the shared directory.
#[test]
fn range_lease_show_release() {
    let (_root, config) = workspace();
    let lease = run_json(&config, &["range", "lease", "--counter", "serialNumber", "--size", "10"]);
    assert_eq!(lease["start"], "1");
    assert_eq!(lease["end"], "10");
    assert_eq!(lease["next_range_start"], "11");

    let second = run_json(&config, &["range", "lease", "--size", "5"]);
    assert_eq!(second["start"], "11");
    assert_eq!(second["end"], "15");

    let info = run_json(&config, &["range", "show"]);
    assert_eq!(info["mode"], "legacy");
    assert_eq!(info["next_range"], "16");
    assert_eq!(info["leases"][0]["replica"], "ca-1");
    assert_eq!(info["leases"][0]["state"], "active");

    let released = run_json(&config, &["range", "release"]);
    assert_eq!(released["state"], "released");
    assert_eq!(released["start"], "11");

    let again = run_json(&config, &["range", "release"]);
    assert_eq!(again["released"], Value::Null);
    assert_eq!(again["note"], "no active lease");
}

/// Verifies show on an untouched counter reports it as uninitialized.
#[test]
fn range_show_requires_initialized_counter() {
    let (_root, config) = workspace();
    let stderr = run_failure(&config, &["range", "show", "--counter", "requestNumber"]);
    assert!(stderr.starts_with("counter_not_initialized: "), "unexpected stderr: {stderr}");
    assert!(stderr.contains("requestNumber"), "unexpected stderr: {stderr}");
}

/// Verifies unknown counters fail as configuration errors.
#[test]
fn range_rejects_unknown_counter() {
    let (_root, config) = workspace();
    let stderr = run_failure(&config, &["range", "lease", "--counter", "crlNumber"]);
    assert!(stderr.starts_with("config_invalid: "), "unexpected stderr: {stderr}");
}

/// Verifies migration to random mode is blocked by an active lease.
#[test]
fn counter_migrate_blocked_then_allowed() {
    let (_root, config) = workspace();
    run_json(&config, &["range", "lease", "--size", "10"]);

    let stderr = run_failure(&config, &["counter", "migrate", "--mode", "random"]);
    assert!(stderr.starts_with("migration_blocked: "), "unexpected stderr: {stderr}");
    assert!(stderr.contains("ca-1"), "unexpected stderr: {stderr}");

    run_json(&config, &["range", "release"]);
    let outcome = run_json(&config, &["counter", "migrate", "--mode", "random"]);
    assert_eq!(outcome["from"], "legacy");
    assert_eq!(outcome["to"], "random");
    assert_eq!(outcome["changed"], true);

    let noop = run_json(&config, &["counter", "migrate", "--mode", "random"]);
    assert_eq!(noop["changed"], false);
}

/// Verifies an unknown mode name is an argument error.
#[test]
fn counter_migrate_rejects_unknown_mode() {
    let (_root, config) = workspace();
    let stderr = run_failure(&config, &["counter", "migrate", "--mode", "uuid"]);
    assert!(stderr.starts_with("invalid_argument: "), "unexpected stderr: {stderr}");
}

// ============================================================================
// SECTION: Certificates
// ============================================================================

/// Verifies imported certificates can be shown, revoked, and listed.
#[test]
fn cert_show_revoke_find() {
    let (root, config) = workspace();
    import_fixture(root.path(), &config);

    let record = run_json(&config, &["cert", "show", "31"]);
    assert_eq!(record["serial_number"], "0x1f");
    assert_eq!(record["status"], "VALID");

    let revoked = run_json(
        &config,
        &["cert", "revoke", "0x1f", "--reason", "key-compromise", "--date", "1500"],
    );
    assert_eq!(revoked["status"], "REVOKED");
    assert_eq!(revoked["revocation"]["reason"], "KEY_COMPROMISE");
    assert_eq!(revoked["revocation"]["date"], 1_500);

    let page = run_json(&config, &["cert", "find", "--status", "REVOKED"]);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["serial_number"], "0x1f");

    let all = run_json(&config, &["cert", "find", "--order", "desc", "--limit", "1"]);
    assert_eq!(all["total"], 2);
    assert_eq!(all["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(all["items"][0]["serial_number"], "0x20");
}

/// Verifies a hold can be released but a plain revocation cannot.
#[test]
fn cert_release_hold_only_applies_to_holds() {
    let (root, config) = workspace();
    import_fixture(root.path(), &config);

    run_json(&config, &["cert", "revoke", "0x20", "--reason", "certificate-hold"]);
    let released = run_json(&config, &["cert", "release-hold", "0x20"]);
    assert_eq!(released["status"], "VALID");
    assert!(released.get("revocation").is_none());

    run_json(&config, &["cert", "revoke", "0x20", "--reason", "1"]);
    let stderr = run_failure(&config, &["cert", "release-hold", "0x20"]);
    assert!(stderr.starts_with("invalid_transition: "), "unexpected stderr: {stderr}");
}

/// Verifies conflicting revocation reasons are refused.
#[test]
fn cert_revoke_conflict_reports_kind() {
    let (root, config) = workspace();
    import_fixture(root.path(), &config);

    run_json(&config, &["cert", "revoke", "0x1f", "--reason", "superseded"]);
    let stderr = run_failure(&config, &["cert", "revoke", "0x1f", "--reason", "key-compromise"]);
    assert!(stderr.starts_with("revocation_conflict: "), "unexpected stderr: {stderr}");
}

/// Verifies the expiry sweep moves only certificates past their validity.
#[test]
fn cert_expire_sweeps_due_certificates() {
    let (root, config) = workspace();
    import_fixture(root.path(), &config);

    let sweep = run_json(&config, &["cert", "expire", "--now", "5000"]);
    assert_eq!(sweep["count"], 1);
    assert_eq!(sweep["expired"][0], "0x1f");

    let expired = run_json(&config, &["cert", "show", "0x1f"]);
    assert_eq!(expired["status"], "EXPIRED");
    let valid = run_json(&config, &["cert", "show", "0x20"]);
    assert_eq!(valid["status"], "VALID");
}

/// Verifies a missing certificate fails with `not_found` naming the serial.
#[test]
fn cert_show_missing_reports_not_found() {
    let (_root, config) = workspace();
    let stderr = run_failure(&config, &["cert", "show", "0x99"]);
    assert!(stderr.starts_with("not_found: "), "unexpected stderr: {stderr}");
    assert!(stderr.contains("0x99"), "unexpected stderr: {stderr}");
}

/// Verifies malformed serial arguments are argument errors.
#[test]
fn cert_show_rejects_bad_serial() {
    let (_root, config) = workspace();
    let stderr = run_failure(&config, &["cert", "show", "0xzz"]);
    assert!(stderr.starts_with("invalid_argument: "), "unexpected stderr: {stderr}");
}

// ============================================================================
// SECTION: Requests and Import
// ============================================================================

/// Verifies imported requests can be shown and filtered.
#[test]
fn request_show_and_find() {
    let (root, config) = workspace();
    import_fixture(root.path(), &config);

    let request = run_json(&config, &["request", "show", "7"]);
    assert_eq!(request["status"], "complete");
    assert_eq!(request["result_certificate_id"], "0x1f");

    let pending = run_json(&config, &["request", "find", "--status", "pending"]);
    assert_eq!(pending["total"], 1);
    assert_eq!(pending["items"][0]["request_id"], "9");

    let enrollments = run_json(&config, &["request", "find", "--type", "enrollment"]);
    assert_eq!(enrollments["total"], 1);
    assert_eq!(enrollments["items"][0]["request_id"], "7");

    let all = run_json(&config, &["request", "find"]);
    assert_eq!(all["total"], 2);
}

/// Verifies importing the same records twice fails on the duplicate.
#[test]
fn import_rejects_duplicates() {
    let (root, config) = workspace();
    import_fixture(root.path(), &config);
    let (certificates, _) = write_imports(root.path());
    let stderr = run_failure(
        &config,
        &["import", "--certificates", certificates.to_str().expect("utf-8 path")],
    );
    assert!(stderr.starts_with("already_exists: "), "unexpected stderr: {stderr}");
}

/// Verifies import requires at least one input file.
#[test]
fn import_requires_input() {
    let (_root, config) = workspace();
    let stderr = run_failure(&config, &["import"]);
    assert!(stderr.starts_with("invalid_argument: "), "unexpected stderr: {stderr}");
}

/// Verifies malformed import JSON is reported as invalid input.
#[test]
fn import_rejects_malformed_json() {
    let (root, config) = workspace();
    let path = root.path().join("bad.json");
    fs::write(&path, "{\"not\": \"an array\"}").expect("write input");
    let stderr =
        run_failure(&config, &["import", "--requests", path.to_str().expect("utf-8 path")]);
    assert!(stderr.starts_with("input_invalid: "), "unexpected stderr: {stderr}");
}
