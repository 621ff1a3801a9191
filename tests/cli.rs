//! End-to-end CLI smoke tests, grounded on the teacher's own dependency on
//! `assert_cmd`/`predicates` for binary-level coverage of commands that
//! don't need a live sidecar or real test frameworks: rule inspection and
//! offline log classification.

use assert_cmd::Command;
use predicates::prelude::*;

fn crossbridge() -> Command {
    Command::cargo_bin("crossbridge").expect("crossbridge binary builds")
}

fn write_rules_file(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("rules.yml");
    std::fs::write(
        &path,
        r#"
- name: assertion-failure
  category: PRODUCT_DEFECT
  priority: 10
  confidence: 0.9
  contains:
    - "AssertionError"
- name: connection-refused
  category: ENVIRONMENT_ISSUE
  priority: 20
  confidence: 0.7
  contains:
    - "Connection refused"
"#,
    )
    .expect("write rules file");
    path
}

fn write_config(dir: &std::path::Path, rules_path: &std::path::Path) -> std::path::PathBuf {
    let config_path = dir.join("crossbridge.yml");
    std::fs::write(
        &config_path,
        format!(
            "classifier:\n  rules_path: \"{}\"\n\
             persistence:\n  db_path: \"{}\"\n  spool_dir: \"{}\"\n  cache_dir: \"{}\"\n",
            rules_path.display(),
            dir.join("crossbridge.sqlite").display(),
            dir.join("spool").display(),
            dir.join("cache").display(),
        ),
    )
    .expect("write config file");
    config_path
}

#[test]
fn test_rules_validate_accepts_well_formed_file() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let rules_path = write_rules_file(dir.path());
    let config_path = write_config(dir.path(), &rules_path);

    crossbridge()
        .args(["--config", config_path.to_str().unwrap(), "rules", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 rules"));
}

#[test]
fn test_rules_validate_rejects_malformed_file() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let rules_path = dir.path().join("rules.yml");
    std::fs::write(&rules_path, "not: [valid, rule, shape").expect("write bad rules file");
    let config_path = write_config(dir.path(), &rules_path);

    crossbridge()
        .args(["--config", config_path.to_str().unwrap(), "rules", "validate"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("invalid"));
}

#[test]
fn test_rules_list_json_reports_loaded_rule_names() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let rules_path = write_rules_file(dir.path());
    let config_path = write_config(dir.path(), &rules_path);

    crossbridge()
        .args(["--config", config_path.to_str().unwrap(), "rules", "list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("assertion-failure"));
}

#[test]
fn test_analyze_logs_classifies_matching_signature() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let rules_path = write_rules_file(dir.path());
    let config_path = write_config(dir.path(), &rules_path);

    let log_file = dir.path().join("failure.log");
    std::fs::write(&log_file, "Traceback (most recent call last):\nAssertionError: expected 1 == 2").expect("write log");

    crossbridge()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "analyze",
            "logs",
            "--log-file",
            log_file.to_str().unwrap(),
            "--test-name",
            "test_example",
            "--framework",
            "pytest",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("PRODUCT_DEFECT"));
}

#[test]
fn test_analyze_logs_fail_on_product_returns_test_failures_exit_code() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let rules_path = write_rules_file(dir.path());
    let config_path = write_config(dir.path(), &rules_path);

    let log_file = dir.path().join("failure.log");
    std::fs::write(&log_file, "AssertionError: boom").expect("write log");

    crossbridge()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "analyze",
            "logs",
            "--log-file",
            log_file.to_str().unwrap(),
            "--test-name",
            "test_example",
            "--framework",
            "pytest",
            "--fail-on",
            "product",
        ])
        .assert()
        .code(1);
}
