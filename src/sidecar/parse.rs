//! Synchronous log/report parsing for `POST /parse/{framework}`, orthogonal
//! to the runtime event stream: a caller hands over a raw report body and
//! gets back a normalized envelope, with no queueing or sampling involved.

use serde::Serialize;

use crate::adapter::common::parse_framework_report;
use crate::adapter::robot::parse_robot_xml;
use crate::error::AdapterError;
use crate::model::{TestOutcome, TestRunResult};

#[derive(Debug, Serialize)]
pub struct Statistics {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Statistics {
    fn tally(results: &[TestRunResult]) -> Self {
        let mut stats = Statistics {
            total: results.len(),
            passed: 0,
            failed: 0,
            skipped: 0,
        };
        for result in results {
            match result.outcome {
                TestOutcome::Passed => stats.passed += 1,
                TestOutcome::Skipped => stats.skipped += 1,
                _ => stats.failed += 1,
            }
        }
        stats
    }
}

#[derive(Debug, Serialize)]
pub struct SlowestTest {
    pub test_id: String,
    pub duration_ms: f64,
}

/// Normalized suite/statistics envelope returned by `/parse/{framework}`.
/// `failed_keywords` and `slowest_keywords` are Robot-specific and stay
/// empty for every other framework (Robot's keyword-level timing is not
/// captured by [`parse_robot_xml`], which is test-granular only).
#[derive(Debug, Serialize)]
pub struct ParseEnvelope {
    pub suite: Option<String>,
    pub statistics: Statistics,
    pub failed_keywords: Vec<String>,
    pub slowest_tests: Vec<SlowestTest>,
    pub slowest_keywords: Vec<String>,
}

fn envelope_from(results: Vec<TestRunResult>) -> ParseEnvelope {
    let mut slowest: Vec<SlowestTest> = results
        .iter()
        .map(|r| SlowestTest {
            test_id: r.test_id.clone(),
            duration_ms: r.duration.as_secs_f64() * 1000.0,
        })
        .collect();
    slowest.sort_by(|a, b| b.duration_ms.partial_cmp(&a.duration_ms).unwrap_or(std::cmp::Ordering::Equal));
    slowest.truncate(10);

    let failed_keywords = results
        .iter()
        .filter(|r| !r.outcome.is_success())
        .filter_map(|r| r.error_signature.as_ref().map(|s| s.lines().next().unwrap_or("").to_string()))
        .filter(|s| !s.is_empty())
        .collect();

    ParseEnvelope {
        suite: None,
        statistics: Statistics::tally(&results),
        failed_keywords,
        slowest_tests: slowest,
        slowest_keywords: Vec::new(),
    }
}

/// Dispatches `body` to the parser matching `framework`'s native report
/// format. Unknown frameworks are rejected with `AdapterError::ParseFailed`.
pub fn parse_report(framework: &str, body: &str) -> Result<ParseEnvelope, AdapterError> {
    if framework == "robot" {
        return robot_envelope(body);
    }
    let results = parse_framework_report(framework, body)?;
    Ok(envelope_from(results))
}

fn robot_envelope(body: &str) -> Result<ParseEnvelope, AdapterError> {
    let results = parse_robot_xml(body)?;
    let mut envelope = envelope_from(results);
    envelope.suite = extract_suite_name(body);
    Ok(envelope)
}

fn extract_suite_name(xml: &str) -> Option<String> {
    let start = xml.find("<suite")?;
    let tag_end = xml[start..].find('>')? + start;
    let tag = &xml[start..tag_end];
    let name_start = tag.find("name=\"")? + 6;
    let name_end = tag[name_start..].find('"')? + name_start;
    Some(tag[name_start..name_end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_report_dispatches_junit_family() {
        let xml = r#"<testsuite><testcase classname="Foo" name="ok" time="0.1"/></testsuite>"#;
        let envelope = parse_report("testng", xml).unwrap();
        assert_eq!(envelope.statistics.total, 1);
        assert_eq!(envelope.statistics.passed, 1);
    }

    #[test]
    fn test_parse_report_rejects_unknown_framework() {
        let err = parse_report("carrier-pigeon", "").unwrap_err();
        assert!(matches!(err, AdapterError::ParseFailed(_)));
    }

    #[test]
    fn test_parse_report_extracts_robot_suite_name() {
        let xml = r#"<robot><suite name="Login Suite"><test name="t"><status status="PASS"/></test></suite></robot>"#;
        let envelope = parse_report("robot", xml).unwrap();
        assert_eq!(envelope.suite.as_deref(), Some("Login Suite"));
    }
}
