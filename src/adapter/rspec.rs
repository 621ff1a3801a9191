//! RSpec adapter, driven with the `RspecJunitFormatter` gem's `--format`
//! output, the common way RSpec produces CI-consumable results.

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

pub struct RspecAdapter {
    config: GenericAdapterConfig,
    report_dir: Arc<TempDir>,
}

impl RspecAdapter {
    pub fn new(config: GenericAdapterConfig) -> Self {
        Self {
            config,
            report_dir: Arc::new(TempDir::new().expect("create rspec report dir")),
        }
    }

    fn workdir(&self) -> PathBuf {
        self.config.working_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    fn report_path(&self) -> PathBuf {
        self.report_dir.path().join("rspec-report.xml")
    }
}

#[async_trait]
impl FrameworkAdapter for RspecAdapter {
    fn tag(&self) -> &'static str {
        "rspec"
    }

    async fn discover(&self) -> Result<Vec<TestCase>, AdapterError> {
        let pattern = Regex::new(r#"\bit\s+["']([^"']+)["']"#).expect("valid regex");
        Ok(scan_source_for_tests(&self.config.paths, "rb", &pattern, "rspec"))
    }

    fn plan_to_command(&self, tests: &[TestCase]) -> ProcessSpec {
        let mut spec = ProcessSpec::new("rspec", self.workdir())
            .arg("--format")
            .arg("RspecJunitFormatter")
            .arg("--out")
            .arg(self.report_path().to_string_lossy().to_string());
        for extra in &self.config.extra_args {
            spec = spec.arg(extra);
        }
        for test in tests {
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
        let xml = std::fs::read_to_string(self.report_path())
            .map_err(|e| AdapterError::ParseFailed(format!("reading rspec junit report: {e}")))?;
        parse_junit_xml(&xml)
    }
}
