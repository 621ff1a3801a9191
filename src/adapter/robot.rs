//! Robot Framework adapter. Robot's native `output.xml` schema differs from
//! JUnit (`<test>` elements nested under `<suite>`, with a `<status>` child
//! carrying the outcome), so this adapter parses it directly with
//! `quick-xml`'s event reader rather than routing through
//! [`super::common::parse_junit_xml`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tempfile::TempDir;

use crate::config::GenericAdapterConfig;
use crate::error::AdapterError;
use crate::model::{normalize_signature, TestCase, TestOutcome, TestRunResult};
use crate::process::{run_with_timeout, ProcessOutput, ProcessSpec};

use super::FrameworkAdapter;

pub struct RobotAdapter {
    config: GenericAdapterConfig,
    report_dir: Arc<TempDir>,
}

impl RobotAdapter {
    pub fn new(config: GenericAdapterConfig) -> Self {
        Self {
            config,
            report_dir: Arc::new(TempDir::new().expect("create robot report dir")),
        }
    }

    fn report_path(&self) -> PathBuf {
        self.report_dir.path().join("output.xml")
    }

    fn workdir(&self) -> PathBuf {
        self.config.working_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

#[async_trait]
impl FrameworkAdapter for RobotAdapter {
    fn tag(&self) -> &'static str {
        "robot"
    }

    async fn discover(&self) -> Result<Vec<TestCase>, AdapterError> {
        let mut spec = ProcessSpec::new("robot", self.workdir()).arg("--dryrun").arg("--output").arg(
            self.report_path().to_string_lossy().to_string(),
        );
        for path in &self.config.paths {
            spec = spec.arg(path.to_string_lossy().to_string());
        }
        run_with_timeout(
            &spec,
            std::time::Duration::from_secs(120),
            std::time::Duration::from_secs(5),
        )
        .await?;

        let xml = std::fs::read_to_string(self.report_path())
            .map_err(|e| AdapterError::DiscoveryFailed(format!("reading robot output.xml: {e}")))?;
        parse_robot_xml(&xml).map(|results| {
            results
                .into_iter()
                .map(|r| TestCase::new(r.test_id, "robot"))
                .collect()
        })
    }

    fn plan_to_command(&self, tests: &[TestCase]) -> ProcessSpec {
        let mut spec = ProcessSpec::new("robot", self.workdir())
            .arg("--output")
            .arg(self.report_path().to_string_lossy().to_string());
        for test in tests {
            spec = spec.arg("--test").arg(&test.id);
        }
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
        _output: &ProcessOutput,
        _tests: &[TestCase],
    ) -> Result<Vec<TestRunResult>, AdapterError> {
        let xml = std::fs::read_to_string(self.report_path())
            .map_err(|e| AdapterError::ParseFailed(format!("reading robot output.xml: {e}")))?;
        parse_robot_xml(&xml)
    }
}

/// Walks `output.xml`'s `<test name="...">...<status status="PASS|FAIL">`
/// elements. Robot nests suites arbitrarily deep, but every `<test>` element
/// at any depth carries its own single top-level `<status>` child, so this
/// only needs to track the currently-open test, not a full suite stack.
pub(crate) fn parse_robot_xml(xml: &str) -> Result<Vec<TestRunResult>, AdapterError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut results: Vec<TestRunResult> = Vec::new();
    let mut current_test: Option<String> = None;
    let mut pending_outcome: Option<TestOutcome> = None;
    let mut current_message = String::new();
    let mut in_status = false;
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| AdapterError::ParseFailed(format!("robot xml: {e}")))?
        {
            Event::Start(e) if e.name().as_ref() == b"test" => {
                current_test = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == b"name")
                    .map(|a| String::from_utf8_lossy(&a.value).into_owned());
            }
            Event::Start(e) if e.name().as_ref() == b"status" && current_test.is_some() => {
                in_status = true;
                current_message.clear();
                let status = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == b"status")
                    .map(|a| String::from_utf8_lossy(&a.value).into_owned())
                    .unwrap_or_default();
                pending_outcome = Some(match status.as_str() {
                    "PASS" => TestOutcome::Passed,
                    "SKIP" => TestOutcome::Skipped,
                    _ => TestOutcome::Failed,
                });
            }
            Event::Text(t) if in_status => {
                current_message.push_str(&t.unescape().unwrap_or_default());
            }
            Event::End(e) if e.name().as_ref() == b"status" => {
                in_status = false;
                if let (Some(outcome), Some(test_id)) = (pending_outcome.take(), current_test.clone()) {
                    let mut result = TestRunResult::new(test_id, outcome);
                    if outcome == TestOutcome::Failed && !current_message.trim().is_empty() {
                        result = result.with_error_signature(normalize_signature(&current_message));
                    }
                    results.push(result);
                }
            }
            Event::End(e) if e.name().as_ref() == b"test" => {
                current_test = None;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_robot_xml_reports_pass_and_fail() {
        let xml = r#"
            <robot>
              <suite name="Suite">
                <test name="Login works">
                  <status status="PASS" starttime="x" endtime="y"/>
                </test>
                <test name="Logout fails">
                  <kw name="Click"></kw>
                  <status status="FAIL">Element not found</status>
                </test>
              </suite>
            </robot>
        "#;
        let results = parse_robot_xml(xml).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].test_id, "Login works");
        assert!(results[0].outcome.is_success());
        assert_eq!(results[1].test_id, "Logout fails");
        assert_eq!(results[1].outcome, TestOutcome::Failed);
        assert!(results[1].error_signature.is_some());
    }
}
