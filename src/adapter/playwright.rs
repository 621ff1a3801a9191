//! Playwright adapter, driven with `--reporter=json`, matching Playwright's
//! actual nested `suites[].specs[].tests[].results[]` report shape.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tempfile::TempDir;

use crate::config::GenericAdapterConfig;
use crate::error::AdapterError;
use crate::model::{normalize_signature, TestCase, TestOutcome, TestRunResult};
use crate::process::{ProcessOutput, ProcessSpec};

use super::common::scan_source_for_tests;
use super::FrameworkAdapter;

pub struct PlaywrightAdapter {
    config: GenericAdapterConfig,
    report_dir: Arc<TempDir>,
}

impl PlaywrightAdapter {
    pub fn new(config: GenericAdapterConfig) -> Self {
        Self {
            config,
            report_dir: Arc::new(TempDir::new().expect("create playwright report dir")),
        }
    }

    fn workdir(&self) -> PathBuf {
        self.config.working_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    fn report_path(&self) -> PathBuf {
        self.report_dir.path().join("playwright-report.json")
    }
}

#[derive(Debug, Deserialize)]
struct PlaywrightReport {
    #[serde(default)]
    suites: Vec<PwSuite>,
}

#[derive(Debug, Deserialize)]
struct PwSuite {
    #[serde(default)]
    suites: Vec<PwSuite>,
    #[serde(default)]
    specs: Vec<PwSpec>,
}

#[derive(Debug, Deserialize)]
struct PwSpec {
    title: String,
    #[serde(default)]
    tests: Vec<PwTest>,
}

#[derive(Debug, Deserialize)]
struct PwTest {
    #[serde(default)]
    results: Vec<PwResult>,
}

#[derive(Debug, Deserialize)]
struct PwResult {
    status: String,
    #[serde(default)]
    duration: u64,
    #[serde(default)]
    error: Option<PwError>,
}

#[derive(Debug, Deserialize, Default)]
struct PwError {
    #[serde(default)]
    message: String,
}

#[async_trait]
impl FrameworkAdapter for PlaywrightAdapter {
    fn tag(&self) -> &'static str {
        "playwright"
    }

    async fn discover(&self) -> Result<Vec<TestCase>, AdapterError> {
        let pattern = Regex::new(r#"\btest\(\s*["']([^"']+)["']"#).expect("valid regex");
        Ok(scan_source_for_tests(&self.config.paths, "ts", &pattern, "playwright"))
    }

    fn plan_to_command(&self, tests: &[TestCase]) -> ProcessSpec {
        let mut spec = ProcessSpec::new("npx", self.workdir())
            .arg("playwright")
            .arg("test")
            .arg("--reporter=json")
            .env("PLAYWRIGHT_JSON_OUTPUT_NAME", self.report_path().to_string_lossy().to_string());
        for extra in &self.config.extra_args {
            spec = spec.arg(extra);
        }
        let files: Vec<&str> = tests.iter().filter_map(|t| t.file.as_deref()).collect();
        for file in files {
            spec = spec.arg(file);
        }
        spec
    }

    fn parse_results(
        &self,
        _output: &ProcessOutput,
        _tests: &[TestCase],
    ) -> Result<Vec<TestRunResult>, AdapterError> {
        let raw = std::fs::read_to_string(self.report_path())
            .map_err(|e| AdapterError::ParseFailed(format!("reading playwright report: {e}")))?;
        parse_playwright_report(&raw)
    }
}

fn parse_playwright_report(raw: &str) -> Result<Vec<TestRunResult>, AdapterError> {
    let report: PlaywrightReport =
        serde_json::from_str(raw).map_err(|e| AdapterError::ParseFailed(format!("playwright json: {e}")))?;

    let mut results = Vec::new();
    for suite in report.suites {
        collect_suite(suite, &mut results);
    }
    Ok(results)
}

fn collect_suite(suite: PwSuite, out: &mut Vec<TestRunResult>) {
    for spec in suite.specs {
        for test in spec.tests {
            let Some(last) = test.results.last() else { continue };
            let outcome = match last.status.as_str() {
                "passed" => TestOutcome::Passed,
                "skipped" => TestOutcome::Skipped,
                "timedOut" => TestOutcome::Timeout,
                _ => TestOutcome::Failed,
            };
            let mut result = TestRunResult::new(spec.title.clone(), outcome)
                .with_duration(std::time::Duration::from_millis(last.duration));
            if let Some(error) = &last.error {
                if !error.message.is_empty() {
                    result = result.with_error_signature(normalize_signature(&error.message));
                }
            }
            out.push(result);
        }
    }
    for nested in suite.suites {
        collect_suite(nested, out);
    }
}
