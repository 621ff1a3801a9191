//! Jest adapter, driven with `--json --outputFile=<path>`, matching Jest's
//! actual `testResults[].assertionResults[]` report shape.

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

pub struct JestAdapter {
    config: GenericAdapterConfig,
    report_dir: Arc<TempDir>,
}

impl JestAdapter {
    pub fn new(config: GenericAdapterConfig) -> Self {
        Self {
            config,
            report_dir: Arc::new(TempDir::new().expect("create jest report dir")),
        }
    }

    fn workdir(&self) -> PathBuf {
        self.config.working_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    fn report_path(&self) -> PathBuf {
        self.report_dir.path().join("jest-report.json")
    }
}

#[derive(Debug, Deserialize)]
struct JestReport {
    #[serde(rename = "testResults", default)]
    test_results: Vec<JestFileResult>,
}

#[derive(Debug, Deserialize)]
struct JestFileResult {
    name: String,
    #[serde(rename = "assertionResults", default)]
    assertion_results: Vec<JestAssertion>,
}

#[derive(Debug, Deserialize)]
struct JestAssertion {
    #[serde(rename = "fullName")]
    full_name: String,
    status: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(rename = "failureMessages", default)]
    failure_messages: Vec<String>,
}

#[async_trait]
impl FrameworkAdapter for JestAdapter {
    fn tag(&self) -> &'static str {
        "jest"
    }

    async fn discover(&self) -> Result<Vec<TestCase>, AdapterError> {
        let spec = ProcessSpec::new("npx", self.workdir())
            .arg("jest")
            .arg("--listTests");
        let output = run_with_timeout(
            &spec,
            std::time::Duration::from_secs(60),
            std::time::Duration::from_secs(5),
        )
        .await?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|path| TestCase::new(path, "jest").with_file(path))
            .collect())
    }

    fn plan_to_command(&self, tests: &[TestCase]) -> ProcessSpec {
        let mut spec = ProcessSpec::new("npx", self.workdir())
            .arg("jest")
            .arg("--json")
            .arg(format!("--outputFile={}", self.report_path().display()));
        for extra in &self.config.extra_args {
            spec = spec.arg(extra);
        }
        for test in &tests {
            if let Some(file) = &test.file {
                spec = spec.arg(file);
            }
        }
        spec
    }

    fn parse_results(
        &self,
        _output: &ProcessOutput,
        _tests: &[TestCase],
    ) -> Result<Vec<TestRunResult>, AdapterError> {
        let raw = std::fs::read_to_string(self.report_path())
            .map_err(|e| AdapterError::ParseFailed(format!("reading jest report: {e}")))?;
        parse_jest_report(&raw)
    }
}

fn parse_jest_report(raw: &str) -> Result<Vec<TestRunResult>, AdapterError> {
    let report: JestReport =
        serde_json::from_str(raw).map_err(|e| AdapterError::ParseFailed(format!("jest json: {e}")))?;

    Ok(report
        .test_results
        .into_iter()
        .flat_map(|file| {
            file.assertion_results.into_iter().map(move |a| {
                let outcome = match a.status.as_str() {
                    "passed" => TestOutcome::Passed,
                    "pending" | "skipped" | "todo" => TestOutcome::Skipped,
                    _ => TestOutcome::Failed,
                };
                let mut result = TestRunResult::new(format!("{}::{}", file.name, a.full_name), outcome)
                    .with_duration(std::time::Duration::from_millis(a.duration.unwrap_or(0.0) as u64));
                if !a.failure_messages.is_empty() {
                    result = result.with_error_signature(normalize_signature(&a.failure_messages.join("\n")));
                }
                result
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_jest_report_maps_statuses() {
        let raw = r#"{"testResults":[{"name":"a.test.js","assertionResults":[
            {"fullName":"adds","status":"passed","duration":5},
            {"fullName":"subtracts","status":"failed","duration":3,"failureMessages":["expected 1 to be 2"]}
        ]}]}"#;
        let results = parse_jest_report(raw).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].outcome, TestOutcome::Failed);
        assert!(results[1].error_signature.is_some());
    }
}
