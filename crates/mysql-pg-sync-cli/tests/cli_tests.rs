//! CLI integration tests for mysql-pg-sync.
//!
//! These tests cover argument parsing, help output, offline config
//! validation and exit codes for configuration errors.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the mysql-pg-sync binary.
fn cmd() -> Command {
    Command::cargo_bin("mysql-pg-sync").unwrap()
}

const VALID_CONFIG: &str = r#"
source:
  host: mysql.internal
  database: legacy
  user: reader
  password: secret
target:
  host: pg.internal
  database: warehouse
  user: loader
  password: secret
  schema: sales
type_rules:
  - date: [booked_on]
tables:
  - name: bookings
    query: SELECT id, booked_on FROM bookings
    target_table: bookings
  - name: refunds
    query: SELECT id, amount FROM refunds
    target_table: ledger.refunds
    batch_size: 250
    type_rules:
      numeric:
        amount: { precision: 12, scale: 2 }
"#;

fn config_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--table"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mysql-pg-sync"));
}

#[test]
fn test_global_flags_with_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"))
        .stdout(predicate::str::contains("config.yaml"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "validate"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let file = config_file("invalid: yaml: content: [\n");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "validate"])
        .assert()
        .code(1);
}

#[test]
fn test_empty_config_exits_with_code_1() {
    let file = tempfile::NamedTempFile::new().unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_scale_above_precision_exits_with_code_1() {
    let file = config_file(&VALID_CONFIG.replace("precision: 12", "precision: 1"));

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "validate"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("scale 2 exceeds precision 1"));
}

#[test]
fn test_unknown_table_exits_with_code_1() {
    let file = config_file(VALID_CONFIG);

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "run",
            "--table",
            "nope",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no table job named 'nope'"));
}

// =============================================================================
// Validate Tests
// =============================================================================

#[test]
fn test_validate_lists_jobs() {
    let file = config_file(VALID_CONFIG);

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("bookings -> sales.bookings"))
        .stdout(predicate::str::contains("refunds -> ledger.refunds"));
}

#[test]
fn test_validate_json_output() {
    let file = config_file(VALID_CONFIG);

    let output = cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "--output-json",
            "validate",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["valid"], true);
    assert_eq!(value["jobs"][1]["batch_size"], 250);
    assert_eq!(value["jobs"][0]["batch_size"], 1000);
}
