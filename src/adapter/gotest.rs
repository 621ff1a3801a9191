//! `go test -json` adapter: each line of stdout is a standalone JSON event
//! (`TestEvent`), so this adapter needs no temp report file.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::GenericAdapterConfig;
use crate::error::AdapterError;
use crate::model::{normalize_signature, TestCase, TestOutcome, TestRunResult};
use crate::process::{run_with_timeout, ProcessOutput, ProcessSpec};

use super::FrameworkAdapter;

pub struct GoTestAdapter {
    config: GenericAdapterConfig,
}

impl GoTestAdapter {
    pub fn new(config: GenericAdapterConfig) -> Self {
        Self { config }
    }

    fn workdir(&self) -> PathBuf {
        self.config.working_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(Debug, Deserialize)]
struct TestEvent {
    action: String,
    #[serde(default)]
    test: Option<String>,
    #[serde(default)]
    package: Option<String>,
    #[serde(default)]
    output: Option<String>,
}

#[async_trait]
impl FrameworkAdapter for GoTestAdapter {
    fn tag(&self) -> &'static str {
        "gotest"
    }

    async fn discover(&self) -> Result<Vec<TestCase>, AdapterError> {
        let spec = ProcessSpec::new("go", self.workdir())
            .arg("test")
            .arg("-list=.*")
            .arg("./...");
        let output = run_with_timeout(
            &spec,
            std::time::Duration::from_secs(120),
            std::time::Duration::from_secs(5),
        )
        .await?;
        Ok(output
            .stdout
            .lines()
            .filter(|l| l.starts_with("Test"))
            .map(|name| TestCase::new(name.trim(), "gotest"))
            .collect())
    }

    fn plan_to_command(&self, tests: &[TestCase]) -> ProcessSpec {
        let names = tests.iter().map(|t| t.id.as_str()).collect::<Vec<_>>().join("|");
        let mut spec = ProcessSpec::new("go", self.workdir())
            .arg("test")
            .arg("-json")
            .arg(format!("-run=^({names})$"));
        for extra in &self.config.extra_args {
            spec = spec.arg(extra);
        }
        spec = spec.arg("./...");
        spec
    }

    fn parse_results(
        &self,
        output: &ProcessOutput,
        _tests: &[TestCase],
    ) -> Result<Vec<TestRunResult>, AdapterError> {
        parse_go_test_json(&output.stdout)
    }
}

pub(crate) fn parse_go_test_json(stdout: &str) -> Result<Vec<TestRunResult>, AdapterError> {
    let mut outputs: std::collections::HashMap<String, String> = std::collections::HashMap::new();
    let mut results = Vec::new();

    for line in stdout.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let event: TestEvent = match serde_json::from_str(line) {
            Ok(e) => e,
            Err(_) => continue,
        };
        let Some(test) = event.test else { continue };
        let key = match &event.package {
            Some(pkg) => format!("{pkg}.{test}"),
            None => test.clone(),
        };

        match event.action.as_str() {
            "output" => {
                if let Some(text) = event.output {
                    outputs.entry(key).or_default().push_str(&text);
                }
            }
            "pass" => results.push(TestRunResult::new(key, TestOutcome::Passed)),
            "fail" => {
                let signature = outputs.get(&key).cloned().unwrap_or_default();
                results.push(
                    TestRunResult::new(key.clone(), TestOutcome::Failed)
                        .with_error_signature(normalize_signature(&signature)),
                );
            }
            "skip" => results.push(TestRunResult::new(key, TestOutcome::Skipped)),
            _ => {}
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_go_test_json_tracks_pass_and_fail() {
        let stdout = concat!(
            r#"{"Action":"run","Test":"TestA"}"#, "\n",
            r#"{"action":"output","test":"TestA","output":"ok\n"}"#, "\n",
            r#"{"action":"pass","test":"TestA"}"#, "\n",
            r#"{"action":"output","test":"TestB","output":"boom\n"}"#, "\n",
            r#"{"action":"fail","test":"TestB"}"#, "\n",
        );
        let results = parse_go_test_json(stdout).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].outcome, TestOutcome::Passed);
        assert_eq!(results[1].outcome, TestOutcome::Failed);
    }
}
