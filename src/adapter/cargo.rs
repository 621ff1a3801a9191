//! `cargo test` adapter, targeting stable libtest's default text output
//! rather than the nightly `--format json` harness flag, so it runs on any
//! toolchain.

use std::path::PathBuf;

use async_trait::async_trait;
use regex::Regex;

use crate::config::CargoAdapterConfig;
use crate::error::AdapterError;
use crate::model::{TestCase, TestOutcome, TestRunResult};
use crate::process::{run_with_timeout, ProcessOutput, ProcessSpec};

use super::FrameworkAdapter;

pub struct CargoAdapter {
    config: CargoAdapterConfig,
}

impl CargoAdapter {
    pub fn new(config: CargoAdapterConfig) -> Self {
        Self { config }
    }

    fn base_spec(&self) -> ProcessSpec {
        let mut spec = ProcessSpec::new("cargo", PathBuf::from(".")).arg("test");
        if let Some(package) = &self.config.package {
            spec = spec.arg("-p").arg(package);
        }
        for feature in &self.config.features {
            spec = spec.arg("--features").arg(feature);
        }
        spec
    }
}

#[async_trait]
impl FrameworkAdapter for CargoAdapter {
    fn tag(&self) -> &'static str {
        "cargo"
    }

    async fn discover(&self) -> Result<Vec<TestCase>, AdapterError> {
        let spec = self.base_spec().arg("--").arg("--list");
        let output = run_with_timeout(
            &spec,
            std::time::Duration::from_secs(120),
            std::time::Duration::from_secs(5),
        )
        .await?;
        Ok(parse_list_output(&output.stdout))
    }

    fn plan_to_command(&self, tests: &[TestCase]) -> ProcessSpec {
        let mut spec = self.base_spec().arg("--").arg("--exact");
        for test in tests {
            spec = spec.arg(&test.id);
        }
        spec
    }

    fn parse_results(
        &self,
        output: &ProcessOutput,
        tests: &[TestCase],
    ) -> Result<Vec<TestRunResult>, AdapterError> {
        Ok(parse_test_output(&output.stdout, tests))
    }
}

fn parse_list_output(stdout: &str) -> Vec<TestCase> {
    let line = Regex::new(r"^([\w:]+): test$").expect("valid regex");
    stdout
        .lines()
        .filter_map(|l| line.captures(l.trim()))
        .map(|caps| TestCase::new(caps[1].to_string(), "cargo"))
        .collect()
}

fn parse_test_output(stdout: &str, tests: &[TestCase]) -> Vec<TestRunResult> {
    let result_line = Regex::new(r"^test (\S+) \.\.\. (ok|FAILED|ignored)").expect("valid regex");
    let mut found = std::collections::HashMap::new();

    for line in stdout.lines() {
        if let Some(caps) = result_line.captures(line.trim()) {
            let name = caps[1].to_string();
            let outcome = match &caps[2] {
                "ok" => TestOutcome::Passed,
                "ignored" => TestOutcome::Skipped,
                _ => TestOutcome::Failed,
            };
            found.insert(name, outcome);
        }
    }

    tests
        .iter()
        .map(|t| {
            let outcome = found.get(&t.id).copied().unwrap_or(TestOutcome::Error);
            let mut result = TestRunResult::new(t.id.clone(), outcome);
            if outcome == TestOutcome::Failed {
                result = result.with_error_signature(extract_failure_block(stdout, &t.id));
            }
            result
        })
        .collect()
}

fn extract_failure_block(stdout: &str, test_id: &str) -> String {
    let marker = format!("---- {test_id} stdout ----");
    match stdout.find(&marker) {
        Some(start) => {
            let rest = &stdout[start..];
            rest.lines().take(40).collect::<Vec<_>>().join("\n")
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_test_output_maps_ok_and_failed() {
        let stdout = "test tests::a ... ok\ntest tests::b ... FAILED\n";
        let tests = vec![TestCase::new("tests::a", "cargo"), TestCase::new("tests::b", "cargo")];
        let results = parse_test_output(stdout, &tests);
        assert_eq!(results[0].outcome, TestOutcome::Passed);
        assert_eq!(results[1].outcome, TestOutcome::Failed);
    }
}
