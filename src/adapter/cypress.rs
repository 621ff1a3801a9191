//! Cypress adapter. Cypress has no first-party structured reporter, so CI
//! setups conventionally add `cypress-mochawesome-reporter`; this adapter
//! drives that and normalizes its output into [`super::common::JsResultFile`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tempfile::TempDir;

use crate::config::GenericAdapterConfig;
use crate::error::AdapterError;
use crate::model::{normalize_signature, TestCase, TestOutcome, TestRunResult};
use crate::process::{run_with_timeout, ProcessOutput, ProcessSpec};

use super::FrameworkAdapter;

pub struct CypressAdapter {
    config: GenericAdapterConfig,
    report_dir: Arc<TempDir>,
}

impl CypressAdapter {
    pub fn new(config: GenericAdapterConfig) -> Self {
        Self {
            config,
            report_dir: Arc::new(TempDir::new().expect("create cypress report dir")),
        }
    }

    fn workdir(&self) -> PathBuf {
        self.config.working_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    fn report_path(&self) -> PathBuf {
        self.report_dir.path().join("cypress-report.json")
    }
}

#[derive(Debug, Deserialize)]
struct MochawesomeReport {
    #[serde(default)]
    results: Vec<MochawesomeSuite>,
}

#[derive(Debug, Deserialize)]
struct MochawesomeSuite {
    #[serde(default)]
    suites: Vec<MochawesomeSuite>,
    #[serde(default)]
    tests: Vec<MochawesomeTest>,
}

#[derive(Debug, Deserialize)]
struct MochawesomeTest {
    #[serde(rename = "fullTitle")]
    full_title: String,
    state: String,
    #[serde(default)]
    duration: Option<u64>,
    #[serde(default)]
    err: Option<MochawesomeError>,
}

#[derive(Debug, Deserialize, Default)]
struct MochawesomeError {
    #[serde(default)]
    message: String,
}

#[async_trait]
impl FrameworkAdapter for CypressAdapter {
    fn tag(&self) -> &'static str {
        "cypress"
    }

    async fn discover(&self) -> Result<Vec<TestCase>, AdapterError> {
        let pattern = regex::Regex::new(r#"\bit\(\s*["']([^"']+)["']"#).expect("valid regex");
        Ok(super::common::scan_source_for_tests(&self.config.paths, "js", &pattern, "cypress"))
    }

    fn plan_to_command(&self, tests: &[TestCase]) -> ProcessSpec {
        let mut spec = ProcessSpec::new("npx", self.workdir())
            .arg("cypress")
            .arg("run")
            .arg("--reporter")
            .arg("cypress-mochawesome-reporter")
            .arg("--reporter-options")
            .arg(format!("reportDir={},overwrite=true,json=true", self.report_dir.path().display()));
        for extra in &self.config.extra_args {
            spec = spec.arg(extra);
        }
        let files: Vec<&str> = tests.iter().filter_map(|t| t.file.as_deref()).collect();
        if !files.is_empty() {
            spec = spec.arg("--spec").arg(files.join(","));
        }
        spec
    }

    fn parse_results(
        &self,
        _output: &ProcessOutput,
        _tests: &[TestCase],
    ) -> Result<Vec<TestRunResult>, AdapterError> {
        let raw = std::fs::read_to_string(self.report_path())
            .map_err(|e| AdapterError::ParseFailed(format!("reading cypress report: {e}")))?;
        parse_mochawesome(&raw)
    }
}

fn parse_mochawesome(raw: &str) -> Result<Vec<TestRunResult>, AdapterError> {
    let report: MochawesomeReport =
        serde_json::from_str(raw).map_err(|e| AdapterError::ParseFailed(format!("mochawesome json: {e}")))?;

    let mut results = Vec::new();
    for suite in report.results {
        collect_suite(suite, &mut results);
    }
    Ok(results)
}

fn collect_suite(suite: MochawesomeSuite, out: &mut Vec<TestRunResult>) {
    for test in suite.tests {
        let outcome = match test.state.as_str() {
            "passed" => TestOutcome::Passed,
            "pending" | "skipped" => TestOutcome::Skipped,
            _ => TestOutcome::Failed,
        };
        let mut result = TestRunResult::new(test.full_title, outcome)
            .with_duration(std::time::Duration::from_millis(test.duration.unwrap_or(0)));
        if let Some(err) = test.err {
            if !err.message.is_empty() {
                result = result.with_error_signature(normalize_signature(&err.message));
            }
        }
        out.push(result);
    }
    for nested in suite.suites {
        collect_suite(nested, out);
    }
}
