//! Mocha adapter, driven with `--reporter json`, matching Mocha's actual
//! `{stats, tests, passes, failures, pending}` report shape.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::GenericAdapterConfig;
use crate::error::AdapterError;
use crate::model::{normalize_signature, TestCase, TestOutcome, TestRunResult};
use crate::process::{run_with_timeout, ProcessOutput, ProcessSpec};

use super::FrameworkAdapter;

pub struct MochaAdapter {
    config: GenericAdapterConfig,
}

impl MochaAdapter {
    pub fn new(config: GenericAdapterConfig) -> Self {
        Self { config }
    }

    fn workdir(&self) -> PathBuf {
        self.config.working_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(Debug, Deserialize)]
struct MochaReport {
    #[serde(default)]
    tests: Vec<MochaTest>,
    #[serde(default)]
    pending: Vec<MochaTest>,
    #[serde(default)]
    failures: Vec<MochaTest>,
}

#[derive(Debug, Deserialize)]
struct MochaTest {
    #[serde(rename = "fullTitle")]
    full_title: String,
    #[serde(default)]
    duration: Option<u64>,
    #[serde(default)]
    err: Option<MochaError>,
}

#[derive(Debug, Deserialize, Default)]
struct MochaError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    stack: Option<String>,
}

#[async_trait]
impl FrameworkAdapter for MochaAdapter {
    fn tag(&self) -> &'static str {
        "mocha"
    }

    async fn discover(&self) -> Result<Vec<TestCase>, AdapterError> {
        let mut spec = ProcessSpec::new("npx", self.workdir()).arg("mocha").arg("--dry-run").arg("--reporter").arg("json");
        for path in &self.config.paths {
            spec = spec.arg(path.to_string_lossy().to_string());
        }
        let output = run_with_timeout(
            &spec,
            std::time::Duration::from_secs(60),
            std::time::Duration::from_secs(5),
        )
        .await?;
        let report: MochaReport = serde_json::from_str(&output.stdout)
            .map_err(|e| AdapterError::DiscoveryFailed(format!("mocha dry-run json: {e}")))?;
        Ok(report
            .tests
            .into_iter()
            .chain(report.pending)
            .map(|t| TestCase::new(t.full_title, "mocha"))
            .collect())
    }

    fn plan_to_command(&self, tests: &[TestCase]) -> ProcessSpec {
        let grep = tests.iter().map(|t| regex::escape(&t.id)).collect::<Vec<_>>().join("|");
        let mut spec = ProcessSpec::new("npx", self.workdir())
            .arg("mocha")
            .arg("--reporter")
            .arg("json")
            .arg("--grep")
            .arg(grep);
        for extra in &self.config.extra_args {
            spec = spec.arg(extra);
        }
        for path in &self.config.paths {
            spec = spec.arg(path.to_string_lossy().to_string());
        }
        spec
    }

    fn parse_results(
        &self,
        output: &ProcessOutput,
        _tests: &[TestCase],
    ) -> Result<Vec<TestRunResult>, AdapterError> {
        parse_mocha_report(&output.stdout)
    }
}

fn parse_mocha_report(raw: &str) -> Result<Vec<TestRunResult>, AdapterError> {
    let report: MochaReport =
        serde_json::from_str(raw).map_err(|e| AdapterError::ParseFailed(format!("mocha json: {e}")))?;

    let failed_titles: std::collections::HashSet<String> =
        report.failures.iter().map(|t| t.full_title.clone()).collect();

    Ok(report
        .tests
        .into_iter()
        .chain(report.pending.iter().map(|t| MochaTest {
            full_title: t.full_title.clone(),
            duration: None,
            err: None,
        }))
        .map(|t| {
            let outcome = if failed_titles.contains(&t.full_title) {
                TestOutcome::Failed
            } else if t.duration.is_none() {
                TestOutcome::Skipped
            } else {
                TestOutcome::Passed
            };
            let mut result = TestRunResult::new(t.full_title, outcome)
                .with_duration(std::time::Duration::from_millis(t.duration.unwrap_or(0)));
            if let Some(err) = t.err {
                let body = err.stack.unwrap_or(err.message);
                if !body.is_empty() {
                    result = result.with_error_signature(normalize_signature(&body));
                }
            }
            result
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mocha_report_flags_failures() {
        let raw = r#"{
            "tests": [
                {"fullTitle": "suite passes", "duration": 2},
                {"fullTitle": "suite fails", "duration": 1, "err": {"message": "boom"}}
            ],
            "failures": [{"fullTitle": "suite fails", "err": {"message": "boom"}}],
            "pending": []
        }"#;
        let results = parse_mocha_report(raw).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].outcome, TestOutcome::Failed);
    }
}
