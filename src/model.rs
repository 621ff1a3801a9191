//! Core data model shared by the orchestrator, strategies, adapters,
//! classifier and persistence layers.
//!
//! Grounded on `offload`'s `framework::{TestRecord, TestResult, TestOutcome}`
//! generalized from a single pytest/cargo-flavored record into a
//! cross-framework shape that covers every supported adapter.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A single test discovered by a framework adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestCase {
    /// Framework-native, stable identifier (e.g. `tests/test_math.py::test_add`).
    pub id: String,
    /// Tag of the framework that owns this test (e.g. `pytest`, `cargo`).
    pub framework: String,
    /// Source file, relative to the workspace root, if known.
    pub file: Option<String>,
    /// Source line, if known.
    pub line: Option<u32>,
    /// Tags/markers/categories attached to the test by its framework.
    pub tags: Vec<String>,
}

impl TestCase {
    pub fn new(id: impl Into<String>, framework: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            framework: framework.into(),
            file: None,
            line: None,
            tags: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// A test selected for a run, carrying the priority a strategy assigned it.
///
/// Priority 1 is the highest (run first / never drop); priority 5 is the
/// lowest. Strategies must produce a deterministic, stable ordering: sort by
/// `priority` ascending, then `test.id` lexicographically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedTest {
    pub test: TestCase,
    pub priority: u8,
    /// Why this test was selected (e.g. "tag-match", "coverage-hit",
    /// "semantic-neighbor", "critical-safety-net", "risk-score").
    pub reason: String,
}

/// Outcome of a single test execution, mirroring `offload::framework::TestOutcome`
/// but adding `Timeout` since adapters must distinguish a hard-killed test
/// from a plain failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Passed,
    Failed,
    Skipped,
    Error,
    Timeout,
}

impl TestOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, TestOutcome::Passed | TestOutcome::Skipped)
    }
}

/// The result of executing a single test, as parsed by a framework adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunResult {
    pub test_id: String,
    pub outcome: TestOutcome,
    pub duration: Duration,
    /// First ~2KB of the failure/error signature, LF-normalized, for
    /// classifier matching.
    pub error_signature: Option<String>,
    pub stdout_tail: String,
    pub stderr_tail: String,
    /// How many times the adapter retried this test before settling on
    /// `outcome`. A test that retried at least once and eventually passed is
    /// the deterministic signal the classifier's `FLAKY` rule reads.
    #[serde(default)]
    pub retry_count: u32,
}

impl TestRunResult {
    pub fn new(test_id: impl Into<String>, outcome: TestOutcome) -> Self {
        Self {
            test_id: test_id.into(),
            outcome,
            duration: Duration::ZERO,
            error_signature: None,
            stdout_tail: String::new(),
            stderr_tail: String::new(),
            retry_count: 0,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_error_signature(mut self, sig: impl Into<String>) -> Self {
        self.error_signature = Some(normalize_signature(&sig.into()));
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

/// Normalizes an error signature to the first ~2KB, LF-normalized.
pub fn normalize_signature(raw: &str) -> String {
    const MAX_BYTES: usize = 2048;
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    if normalized.len() <= MAX_BYTES {
        normalized
    } else {
        // Truncate on a char boundary at or before MAX_BYTES.
        let mut end = MAX_BYTES;
        while !normalized.is_char_boundary(end) {
            end -= 1;
        }
        normalized[..end].to_string()
    }
}

/// Tag identifying a selection strategy.
pub type StrategyTag = String;

/// A request to execute a strategy-selected slice of tests.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionRequest {
    pub run_id: String,
    pub strategy: StrategyTag,
    pub base_branch: String,
    /// Frameworks to consider; empty means "all configured frameworks".
    #[serde(default)]
    pub frameworks: Vec<String>,
    pub dry_run: bool,
    /// Free-form environment label (e.g. "staging", "ci"), carried through
    /// to the persisted run and the CLI summary but otherwise opaque to
    /// planning and execution.
    #[serde(default)]
    pub environment: Option<String>,
    /// Set by `--ci`; relaxes nothing structurally but is surfaced in plan
    /// metadata so a persisted run can be told apart from a local one.
    #[serde(default)]
    pub ci: bool,
    /// Caps the number of tests a strategy may select. Applied after
    /// strategy selection, preserving priority/lexicographic order.
    #[serde(default)]
    pub max_tests: Option<usize>,
    /// Wall-clock budget for `run`. `Some(0)` cancels the request before any
    /// adapter is spawned, per the boundary behavior in the spec's §8.
    #[serde(default)]
    pub max_duration_minutes: Option<u64>,
    /// Only tests carrying at least one of these tags are eligible for
    /// selection; empty means no tag-include filter.
    #[serde(default)]
    pub tags_include: Vec<String>,
    /// Tests carrying any of these tags are excluded from selection
    /// regardless of what a strategy would otherwise pick.
    #[serde(default)]
    pub tags_exclude: Vec<String>,
    /// When false (the default), tests above the flaky-cache threshold are
    /// filtered out of the discovered set before strategy selection.
    #[serde(default)]
    pub include_flaky: bool,
    /// When false, the orchestrator runs the plan's adapters one at a time
    /// regardless of `max_parallel`.
    #[serde(default = "default_true")]
    pub parallel: bool,
    /// Arbitrary caller-supplied metadata (branch, commit, build_id, ...),
    /// persisted alongside the plan and echoed in `--json` output.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

/// The plan produced by `Orchestrator::plan` from a selection strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub run_id: String,
    pub strategy: StrategyTag,
    pub selected: Vec<SelectedTest>,
    /// Set when a strategy fell back to another strategy, e.g.
    /// `fallback_reason = "impacted<min"`.
    pub fallback_reason: Option<String>,
    pub dry_run: bool,
    /// `ExecutionRequest::max_duration_minutes` carried into the plan so
    /// `run` can honor the immediate-cancellation boundary (`Some(0)`)
    /// without re-reading the original request.
    #[serde(default)]
    pub timeout_override_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub parallel: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Size of the (filtered) available-test universe the strategy chose
    /// from, for the CLI's "reduction percentage vs full suite" summary.
    #[serde(default)]
    pub available_count: usize,
}

impl ExecutionPlan {
    pub fn empty(run_id: impl Into<String>, strategy: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            strategy: strategy.into(),
            selected: Vec::new(),
            fallback_reason: None,
            dry_run: false,
            timeout_override_secs: None,
            parallel: true,
            metadata: HashMap::new(),
            available_count: 0,
        }
    }

    /// Fraction of the available-test universe this plan skipped, in
    /// `[0, 1]`. `0.0` when `available_count` is unset (e.g. a plan built by
    /// `ExecutionPlan::empty` directly rather than through a strategy).
    pub fn reduction_fraction(&self) -> f64 {
        if self.available_count == 0 {
            0.0
        } else {
            1.0 - (self.selected.len() as f64 / self.available_count as f64)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// The result of running (or dry-running) an `ExecutionPlan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub run_id: String,
    pub status: RunStatus,
    pub results: Vec<TestRunResult>,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Passed,
    Failed,
    Empty,
    /// The request's wall-clock budget was zero or an in-flight cancel
    /// signal arrived before the run completed; `results` holds whatever
    /// had already been parsed from partial reports.
    Cancelled,
}

impl ExecutionResult {
    /// The vacuous-pass boundary case: an empty `available_tests` selects an
    /// empty plan, and the run it produces is `status=passed` by definition
    /// rather than `empty`, since nothing failed.
    pub fn empty(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Passed,
            results: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn cancelled(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Cancelled,
            results: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Passed | RunStatus::Empty => 0,
            RunStatus::Failed => 1,
            RunStatus::Cancelled => 2,
        }
    }

    /// Derives the overall status from individual results.
    pub fn classify_status(results: &[TestRunResult]) -> RunStatus {
        if results.is_empty() {
            RunStatus::Empty
        } else if results.iter().all(|r| r.outcome.is_success()) {
            RunStatus::Passed
        } else {
            RunStatus::Failed
        }
    }
}

/// Assembled context an orchestrator hands to a strategy. Every field is
/// best-effort: a failed assembly step falls back to its documented default
/// rather than aborting the whole plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub discovered: Vec<TestCase>,
    /// Files changed relative to `base_branch`, from `git2` diff walking.
    pub changed_files: Vec<String>,
    /// Recent execution history, most recent last.
    pub history: Vec<HistoricalRun>,
    /// file -> tests whose coverage touches that file.
    pub coverage_map: HashMap<String, Vec<String>>,
    /// test_id -> flaky score in [0, 1].
    pub flaky_cache: HashMap<String, f64>,
    /// file -> embedding vector, for impacted-strategy semantic neighbors.
    pub embeddings: HashMap<String, Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalRun {
    pub run_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub results: Vec<TestRunResult>,
}

/// Per-test statistics folded out of `ExecutionContext::history`, read by
/// the risk strategy and by the classifier's history-derived categories
/// (`FLAKY`, `REGRESSION`, `NEW`, `STABLE`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TestHistoryStats {
    pub runs: usize,
    pub pass_count: usize,
    pub fail_count: usize,
    pub last_outcome: Option<TestOutcome>,
    pub covered_file_churned: bool,
}

impl TestHistoryStats {
    pub fn fail_rate(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            self.fail_count as f64 / self.runs as f64
        }
    }
}

impl ExecutionContext {
    /// Folds `history` into per-test counts, most-recent-last per the
    /// invariant `history` is stored under.
    pub fn history_stats_for(&self, test_id: &str) -> TestHistoryStats {
        let mut stats = TestHistoryStats::default();
        for run in &self.history {
            for result in &run.results {
                if result.test_id != test_id {
                    continue;
                }
                stats.runs += 1;
                if result.outcome.is_success() {
                    stats.pass_count += 1;
                } else {
                    stats.fail_count += 1;
                }
                stats.last_outcome = Some(result.outcome);
            }
        }
        stats
    }
}

/// The taxonomy a classified failure is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    AutomationDefect,
    ProductDefect,
    EnvironmentIssue,
    ConfigurationIssue,
    Flaky,
    Regression,
    New,
    Stable,
    Unknown,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::AutomationDefect => "AUTOMATION_DEFECT",
            Category::ProductDefect => "PRODUCT_DEFECT",
            Category::EnvironmentIssue => "ENVIRONMENT_ISSUE",
            Category::ConfigurationIssue => "CONFIGURATION_ISSUE",
            Category::Flaky => "FLAKY",
            Category::Regression => "REGRESSION",
            Category::New => "NEW",
            Category::Stable => "STABLE",
            Category::Unknown => "UNKNOWN",
        }
    }
}

/// A reference into workspace source code pointed to by a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeReference {
    pub file: String,
    pub line: u32,
    /// Source lines `line-5..=line+5`, when the file is readable.
    pub snippet: Option<String>,
    pub function_or_class: Option<String>,
}

/// Optional LLM-based annotation layered on top of a deterministic
/// classification. Never changes `Classification::category`; `confidence_delta`
/// is pre-clamped to `[-0.1, 0.1]` by the enricher that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiEnrichment {
    pub reasoning: String,
    pub suggested_fixes: Vec<String>,
    pub confidence_delta: f64,
}

/// The result of classifying a single test failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub test_id: String,
    pub category: Category,
    pub confidence: f64,
    pub matched_rule: Option<String>,
    /// `pattern id + matched substring` pairs, in match order.
    #[serde(default)]
    pub evidence: Vec<String>,
    pub code_reference: Option<CodeReference>,
    pub ai_enrichment: Option<AiEnrichment>,
    pub ai_enhanced: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result_is_passed_not_empty_status() {
        let result = ExecutionResult::empty("r1");
        assert_eq!(result.status, RunStatus::Passed);
        assert_eq!(result.exit_code(), 0);
    }

    #[test]
    fn test_classify_status_still_reports_empty_for_zero_results() {
        assert_eq!(RunStatus::classify_status(&[]), RunStatus::Empty);
    }
}
}
