//! NUnit adapter, driven through `dotnet test` with the JunitXml test
//! logger, the standard way .NET CI pipelines get JUnit-compatible output
//! out of NUnit.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tempfile::TempDir;

use crate::config::GenericAdapterConfig;
use crate::error::AdapterError;
use crate::model::{TestCase, TestRunResult};
use crate::process::{ProcessOutput, ProcessSpec};

use super::common::scan_source_for_tests;
use super::FrameworkAdapter;

pub struct NunitAdapter {
    config: GenericAdapterConfig,
    report_dir: Arc<TempDir>,
}

impl NunitAdapter {
    pub fn new(config: GenericAdapterConfig) -> Self {
        Self {
            config,
            report_dir: Arc::new(TempDir::new().expect("create nunit report dir")),
        }
    }

    fn workdir(&self) -> PathBuf {
        self.config.working_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    fn report_path(&self) -> PathBuf {
        self.report_dir.path().join("nunit-report.xml")
    }
}

#[async_trait]
impl FrameworkAdapter for NunitAdapter {
    fn tag(&self) -> &'static str {
        "nunit"
    }

    async fn discover(&self) -> Result<Vec<TestCase>, AdapterError> {
        let pattern = Regex::new(r#"\[Test\][\s\S]{0,80}?void\s+(\w+)\s*\("#).expect("valid regex");
        Ok(scan_source_for_tests(&self.config.paths, "cs", &pattern, "nunit"))
    }

    fn plan_to_command(&self, tests: &[TestCase]) -> ProcessSpec {
        let filter = tests
            .iter()
            .map(|t| format!("FullyQualifiedName~{}", t.id.replace("::", ".")))
            .collect::<Vec<_>>()
            .join("|");
        let mut spec = ProcessSpec::new("dotnet", self.workdir())
            .arg("test")
            .arg("--filter")
            .arg(filter)
            .arg("--logger")
            .arg(format!("junit;LogFilePath={}", self.report_path().display()));
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
        let xml = std::fs::read_to_string(self.report_path())
            .map_err(|e| AdapterError::ParseFailed(format!("reading nunit junit report: {e}")))?;
        super::common::parse_junit_xml(&xml)
    }
}
