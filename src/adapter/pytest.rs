//! pytest adapter.
//!
//! Grounded on `offload`'s `framework::pytest::PytestFramework`
//! (`examples/imbue-ai-offload/src/framework/pytest.rs`): `--collect-only -q`
//! for discovery and `--junitxml=<path>` for results, but parsed with
//! `quick-xml` through [`super::common::parse_junit_xml`] instead of the
//! teacher's line-oriented regexes, since a real XML parser handles nested
//! `<testsuites>` and CDATA failure bodies the regexes did not.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tempfile::TempDir;

use crate::config::PytestAdapterConfig;
use crate::error::AdapterError;
use crate::model::{TestCase, TestRunResult};
use crate::process::{run_with_timeout, ProcessOutput, ProcessSpec};

use super::common::parse_junit_xml;
use super::FrameworkAdapter;

pub struct PytestAdapter {
    config: PytestAdapterConfig,
    report_dir: Arc<TempDir>,
}

impl PytestAdapter {
    pub fn new(config: PytestAdapterConfig) -> Self {
        Self {
            config,
            report_dir: Arc::new(TempDir::new().expect("create pytest report dir")),
        }
    }

    fn report_path(&self) -> PathBuf {
        self.report_dir.path().join("pytest-report.xml")
    }

    fn workdir(&self) -> PathBuf {
        self.config
            .paths
            .first()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[async_trait]
impl FrameworkAdapter for PytestAdapter {
    fn tag(&self) -> &'static str {
        "pytest"
    }

    async fn discover(&self) -> Result<Vec<TestCase>, AdapterError> {
        let mut spec = ProcessSpec::new(&self.config.python, self.workdir())
            .arg("-m")
            .arg("pytest")
            .arg("--collect-only")
            .arg("-q");
        for path in &self.config.paths {
            spec = spec.arg(path.to_string_lossy().to_string());
        }
        if let Some(markers) = &self.config.markers {
            spec = spec.arg("-m").arg(markers);
        }

        let output = run_with_timeout(
            &spec,
            std::time::Duration::from_secs(120),
            std::time::Duration::from_secs(5),
        )
        .await?;

        Ok(parse_collect_output(&output.stdout))
    }

    fn plan_to_command(&self, tests: &[TestCase]) -> ProcessSpec {
        let mut spec = ProcessSpec::new(&self.config.python, self.workdir())
            .arg("-m")
            .arg("pytest")
            .arg("-v")
            .arg("--tb=short")
            .arg(format!("--junitxml={}", self.report_path().display()));
        for extra in &self.config.extra_args {
            spec = spec.arg(extra);
        }
        for test in tests {
            spec = spec.arg(&test.id);
        }
        spec
    }

    fn parse_results(
        &self,
        _output: &ProcessOutput,
        _tests: &[TestCase],
    ) -> Result<Vec<TestRunResult>, AdapterError> {
        let xml = std::fs::read_to_string(self.report_path())
            .map_err(|e| AdapterError::ParseFailed(format!("reading junitxml report: {e}")))?;
        parse_junit_xml(&xml)
    }
}

/// Parses `pytest --collect-only -q` output, which lists one node id per
/// line followed by a blank-line-separated summary (e.g. `3 tests collected`).
fn parse_collect_output(stdout: &str) -> Vec<TestCase> {
    let node_id = Regex::new(r"^[\w/.\-]+\.py::[\w:\[\]\-\.]+$").expect("valid regex");
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| node_id.is_match(line))
        .map(|line| {
            let file = line.split("::").next().map(str::to_string);
            let mut test = TestCase::new(line, "pytest");
            if let Some(file) = file {
                test = test.with_file(file);
            }
            test
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collect_output_extracts_node_ids() {
        let stdout = "tests/test_math.py::test_add\ntests/test_math.py::test_sub\n\n2 tests collected in 0.01s";
        let tests = parse_collect_output(stdout);
        assert_eq!(tests.len(), 2);
        assert_eq!(tests[0].id, "tests/test_math.py::test_add");
        assert_eq!(tests[0].file.as_deref(), Some("tests/test_math.py"));
    }
}
