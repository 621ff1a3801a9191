//! Parsing helpers shared by adapters that read JUnit-style XML or
//! JSON-reporter output, so individual adapter modules only need to wire up
//! discovery and command synthesis.

use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use walkdir::WalkDir;

use crate::error::AdapterError;
use crate::model::{normalize_signature, TestCase, TestOutcome, TestRunResult};

/// Walks every file under `paths` whose extension matches `extension`,
/// applying `pattern` (which must have exactly one capture group: the test
/// name) to each line. Used by adapters for frameworks with no lightweight
/// CLI discovery mode (TestNG, JUnit, NUnit, PHPUnit, RSpec) — these emit
/// per-test reports only after a run, so their adapters discover tests by
/// recognizing the source-level test annotation/convention instead.
pub fn scan_source_for_tests(
    paths: &[std::path::PathBuf],
    extension: &str,
    pattern: &Regex,
    framework: &'static str,
) -> Vec<TestCase> {
    let mut discovered = Vec::new();
    for root in paths {
        for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }
            let Ok(contents) = std::fs::read_to_string(path) else {
                continue;
            };
            for caps in pattern.captures_iter(&contents) {
                let name = caps[1].to_string();
                let id = format!("{}::{}", relative_display(root, path), name);
                discovered.push(
                    TestCase::new(id, framework).with_file(relative_display(root, path)),
                );
            }
        }
    }
    discovered
}

fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

/// Merges every `*.xml` junit report found under `dir` (surefire-style
/// runners write one file per test class rather than a single report).
pub fn parse_junit_reports_in_dir(dir: &Path) -> Result<Vec<TestRunResult>, AdapterError> {
    let mut results = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("xml") {
            continue;
        }
        let xml = std::fs::read_to_string(path)
            .map_err(|e| AdapterError::ParseFailed(format!("reading {}: {e}", path.display())))?;
        results.extend(parse_junit_xml(&xml)?);
    }
    Ok(results)
}

#[derive(Debug, Deserialize)]
#[serde(rename = "testsuite")]
struct JunitTestSuite {
    #[serde(rename = "testsuites", default)]
    nested: Vec<JunitTestSuiteList>,
    #[serde(rename = "testcase", default)]
    testcases: Vec<JunitTestCase>,
}

#[derive(Debug, Deserialize)]
struct JunitTestSuiteList {
    #[serde(rename = "testsuite", default)]
    suites: Vec<JunitTestSuite>,
}

#[derive(Debug, Deserialize)]
struct JunitTestCase {
    #[serde(rename = "@classname", default)]
    classname: String,
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@time", default)]
    time: f64,
    failure: Option<JunitMessage>,
    error: Option<JunitMessage>,
    skipped: Option<JunitSkipped>,
}

#[derive(Debug, Deserialize)]
struct JunitMessage {
    #[serde(rename = "@message", default)]
    message: String,
    #[serde(rename = "$text", default)]
    body: String,
}

#[derive(Debug, Deserialize)]
struct JunitSkipped {
    #[serde(rename = "@message", default)]
    #[allow(dead_code)]
    message: String,
}

/// Parses a JUnit XML report (the common output format of TestNG, JUnit,
/// NUnit, PHPUnit and RSpec's `--format RspecJunitFormatter`) into
/// [`TestRunResult`]s keyed by `classname.name`.
pub fn parse_junit_xml(xml: &str) -> Result<Vec<TestRunResult>, AdapterError> {
    let suite: JunitTestSuite = quick_xml::de::from_str(xml)
        .map_err(|e| AdapterError::ParseFailed(format!("junit xml: {e}")))?;

    let mut results = Vec::new();
    collect_testcases(&suite, &mut results);
    Ok(results)
}

fn collect_testcases(suite: &JunitTestSuite, out: &mut Vec<TestRunResult>) {
    for case in &suite.testcases {
        let test_id = if case.classname.is_empty() {
            case.name.clone()
        } else {
            format!("{}.{}", case.classname, case.name)
        };

        let mut result = if let Some(failure) = &case.failure {
            TestRunResult::new(test_id, TestOutcome::Failed)
                .with_error_signature(signature_of(failure))
        } else if let Some(error) = &case.error {
            TestRunResult::new(test_id, TestOutcome::Error).with_error_signature(signature_of(error))
        } else if case.skipped.is_some() {
            TestRunResult::new(test_id, TestOutcome::Skipped)
        } else {
            TestRunResult::new(test_id, TestOutcome::Passed)
        };
        result.duration = std::time::Duration::from_secs_f64(case.time.max(0.0));
        out.push(result);
    }
    for nested in &suite.nested {
        for inner in &nested.suites {
            collect_testcases(inner, out);
        }
    }
}

fn signature_of(message: &JunitMessage) -> String {
    if !message.body.trim().is_empty() {
        message.body.clone()
    } else {
        message.message.clone()
    }
}

/// The normalized shape every JS adapter (Jest, Mocha, Cypress, Playwright)
/// maps its own `--reporter=json`/`--json` output into before handing it to
/// [`parse_js_json`]. Each adapter's native JSON schema differs; only the
/// mapping into this struct is framework-specific.
#[derive(Debug, Deserialize)]
pub struct JsResultFile {
    #[serde(default)]
    pub tests: Vec<JsTestResult>,
}

#[derive(Debug, Deserialize)]
pub struct JsTestResult {
    pub full_name: String,
    pub status: String,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default)]
    pub failure_message: Option<String>,
}

pub fn parse_js_json(raw: &str) -> Result<Vec<TestRunResult>, AdapterError> {
    let file: JsResultFile =
        serde_json::from_str(raw).map_err(|e| AdapterError::ParseFailed(format!("js json: {e}")))?;

    Ok(file
        .tests
        .into_iter()
        .map(|t| {
            let outcome = match t.status.as_str() {
                "passed" => TestOutcome::Passed,
                "skipped" | "pending" => TestOutcome::Skipped,
                "timedOut" => TestOutcome::Timeout,
                _ => TestOutcome::Failed,
            };
            let mut result = TestRunResult::new(t.full_name, outcome)
                .with_duration(std::time::Duration::from_secs_f64(t.duration_ms / 1000.0));
            if let Some(message) = t.failure_message {
                result = result.with_error_signature(normalize_signature(&message));
            }
            result
        })
        .collect())
}

/// Dispatches a raw report body to the parser matching `framework`'s native
/// output format, shared by the sidecar's synchronous `/parse/{framework}`
/// endpoint ([`crate::sidecar::parse::parse_report`]) and the `analyze`
/// CLI commands, so both read exactly the same per-test results rather than
/// maintaining two independent format tables.
pub fn parse_framework_report(framework: &str, body: &str) -> Result<Vec<TestRunResult>, AdapterError> {
    match framework {
        "pytest" | "testng" | "junit" | "nunit" | "phpunit" | "rspec" => parse_junit_xml(body),
        "jest" | "mocha" | "cypress" | "playwright" => parse_js_json(body),
        "gotest" => crate::adapter::gotest::parse_go_test_json(body),
        "robot" => crate::adapter::robot::parse_robot_xml(body),
        "cargo" => Err(AdapterError::ParseFailed(
            "cargo test output has no fixed test-id set to resolve against; use /events instead".into(),
        )),
        other => Err(AdapterError::ParseFailed(format!("unsupported framework for log parsing: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_junit_xml_classifies_outcomes() {
        let xml = r#"
            <testsuite name="suite">
                <testcase classname="pkg.Foo" name="test_ok" time="0.01" />
                <testcase classname="pkg.Foo" name="test_bad" time="0.02">
                    <failure message="assert 1 == 2">stack trace</failure>
                </testcase>
                <testcase classname="pkg.Foo" name="test_skip" time="0">
                    <skipped message="not ready" />
                </testcase>
            </testsuite>
        "#;
        let results = parse_junit_xml(xml).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].test_id, "pkg.Foo.test_ok");
        assert!(results[0].outcome.is_success());
        assert_eq!(results[1].outcome, TestOutcome::Failed);
        assert!(results[1].error_signature.is_some());
        assert_eq!(results[2].outcome, TestOutcome::Skipped);
    }

    #[test]
    fn test_parse_js_json_maps_statuses() {
        let raw = r#"{"tests":[
            {"full_name":"a > b","status":"passed","duration_ms":12.0},
            {"full_name":"a > c","status":"failed","duration_ms":4.0,"failure_message":"expected true"}
        ]}"#;
        let results = parse_js_json(raw).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].outcome, TestOutcome::Failed);
    }
}
