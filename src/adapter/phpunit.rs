//! PHPUnit adapter, driven with `--log-junit`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tempfile::TempDir;

use crate::config::GenericAdapterConfig;
use crate::error::AdapterError;
use crate::model::{TestCase, TestRunResult};
use crate::process::{ProcessOutput, ProcessSpec};

use super::common::{parse_junit_xml, scan_source_for_tests};
use super::FrameworkAdapter;

pub struct PhpunitAdapter {
    config: GenericAdapterConfig,
    report_dir: Arc<TempDir>,
}

impl PhpunitAdapter {
    pub fn new(config: GenericAdapterConfig) -> Self {
        Self {
            config,
            report_dir: Arc::new(TempDir::new().expect("create phpunit report dir")),
        }
    }

    fn workdir(&self) -> PathBuf {
        self.config.working_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    fn report_path(&self) -> PathBuf {
        self.report_dir.path().join("phpunit-report.xml")
    }
}

#[async_trait]
impl FrameworkAdapter for PhpunitAdapter {
    fn tag(&self) -> &'static str {
        "phpunit"
    }

    async fn discover(&self) -> Result<Vec<TestCase>, AdapterError> {
        let pattern = Regex::new(r#"public\s+function\s+(test\w+)\s*\("#).expect("valid regex");
        Ok(scan_source_for_tests(&self.config.paths, "php", &pattern, "phpunit"))
    }

    fn plan_to_command(&self, tests: &[TestCase]) -> ProcessSpec {
        let mut spec = ProcessSpec::new("phpunit", self.workdir())
            .arg("--log-junit")
            .arg(self.report_path().to_string_lossy().to_string());
        for extra in &self.config.extra_args {
            spec = spec.arg(extra);
        }
        for test in tests {
            spec = spec.arg("--filter").arg(&test.id);
        }
        spec
    }

    fn parse_results(
        &self,
        _output: &ProcessOutput,
        _tests: &[TestCase],
    ) -> Result<Vec<TestRunResult>, AdapterError> {
        let xml = std::fs::read_to_string(self.report_path())
            .map_err(|e| AdapterError::ParseFailed(format!("reading phpunit junit report: {e}")))?;
        parse_junit_xml(&xml)
    }
}
