//! TestNG adapter, driven through Maven Surefire (the conventional way a
//! JVM project runs TestNG in CI), reading the surefire-reports directory's
//! JUnit-style XML output.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tempfile::TempDir;

use crate::config::GenericAdapterConfig;
use crate::error::AdapterError;
use crate::model::{TestCase, TestRunResult};
use crate::process::{ProcessOutput, ProcessSpec};

use super::common::{parse_junit_reports_in_dir, scan_source_for_tests};
use super::FrameworkAdapter;

pub struct TestNgAdapter {
    config: GenericAdapterConfig,
    report_dir: Arc<TempDir>,
}

impl TestNgAdapter {
    pub fn new(config: GenericAdapterConfig) -> Self {
        Self {
            config,
            report_dir: Arc::new(TempDir::new().expect("create testng report dir")),
        }
    }

    fn workdir(&self) -> PathBuf {
        self.config.working_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

#[async_trait]
impl FrameworkAdapter for TestNgAdapter {
    fn tag(&self) -> &'static str {
        "testng"
    }

    async fn discover(&self) -> Result<Vec<TestCase>, AdapterError> {
        let pattern = Regex::new(r#"@Test[\s\S]{0,80}?void\s+(\w+)\s*\("#).expect("valid regex");
        Ok(scan_source_for_tests(&self.config.paths, "java", &pattern, "testng"))
    }

    fn plan_to_command(&self, tests: &[TestCase]) -> ProcessSpec {
        let test_classes = tests
            .iter()
            .filter_map(|t| t.id.split("::").next())
            .collect::<Vec<_>>()
            .join(",");
        let mut spec = ProcessSpec::new("mvn", self.workdir())
            .arg("test")
            .arg(format!("-Dtest={test_classes}"))
            .arg(format!(
                "-Dsurefire.reportsDirectory={}",
                self.report_dir.path().display()
            ));
        for extra in &self.config.extra_args {
            spec = spec.arg(extra);
        }
        spec
    }

    fn parse_results(
        &self,
        _output: &ProcessOutput,
        _tests: &[TestCase],
    ) -> Result<Vec<TestRunResult>, AdapterError> {
        parse_junit_reports_in_dir(self.report_dir.path())
    }
}
