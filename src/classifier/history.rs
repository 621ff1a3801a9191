//! History-derived classification categories: `FLAKY`, `REGRESSION`, `NEW`
//! and `STABLE`. These never read the error signature — they read
//! `ExecutionContext::history`, so they run as a separate check alongside
//! (not instead of) the substring-based `RuleSet` in [`super::rules`].

use crate::model::{Category, ExecutionContext, TestOutcome, TestRunResult};

const STABLE_MIN_RUNS: usize = 5;
const STABLE_MAX_FAIL_RATE: f64 = 0.05;
const FLAKY_FAIL_RATE_LOW: f64 = 0.05;
const FLAKY_FAIL_RATE_HIGH: f64 = 0.4;
const FLAKY_MIN_RUNS: usize = 5;

/// Looks for a history-grounded category before falling through to
/// signature-based rules. Returns `None` when history says nothing
/// decisive, letting the caller fall back to [`super::rules::RuleSet`].
pub fn classify_from_history(
    context: &ExecutionContext,
    result: &TestRunResult,
) -> Option<(Category, f64)> {
    let stats = context.history_stats_for(&result.test_id);

    // A retry observed within this run is direct evidence, independent of
    // history depth, so it's checked before the zero-history NEW default.
    if result.retry_count >= 1 && result.outcome.is_success() {
        return Some((Category::Flaky, 0.85));
    }

    if stats.runs == 0 {
        return Some((Category::New, 0.9));
    }

    let fail_rate = stats.fail_rate();
    if stats.runs >= FLAKY_MIN_RUNS
        && fail_rate > FLAKY_FAIL_RATE_LOW
        && fail_rate < FLAKY_FAIL_RATE_HIGH
    {
        return Some((Category::Flaky, 0.75));
    }

    let previously_stable = stats.runs >= STABLE_MIN_RUNS && fail_rate <= STABLE_MAX_FAIL_RATE;
    let covers_changed_file = test_covers_changed_file(context, &result.test_id);
    if previously_stable && covers_changed_file && !result.outcome.is_success() {
        return Some((Category::Regression, 0.8));
    }

    if stats.runs < FLAKY_MIN_RUNS {
        return Some((Category::New, 0.6));
    }

    None
}

/// `STABLE` only applies to currently-passing tests, so it is computed
/// separately from the failure-only categories above.
pub fn is_stable(context: &ExecutionContext, test_id: &str, outcome: TestOutcome) -> bool {
    let stats = context.history_stats_for(test_id);
    outcome.is_success() && stats.runs >= STABLE_MIN_RUNS && stats.fail_rate() <= STABLE_MAX_FAIL_RATE
}

fn test_covers_changed_file(context: &ExecutionContext, test_id: &str) -> bool {
    context
        .changed_files
        .iter()
        .any(|file| context.coverage_map.get(file).is_some_and(|tests| tests.iter().any(|t| t == test_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HistoricalRun, TestOutcome, TestRunResult};
    use std::collections::HashMap;

    fn history_run(test_id: &str, outcome: TestOutcome, retry: u32) -> HistoricalRun {
        HistoricalRun {
            run_id: "r".into(),
            timestamp: chrono::Utc::now(),
            results: vec![TestRunResult::new(test_id, outcome).with_retry_count(retry)],
        }
    }

    #[test]
    fn test_retry_then_pass_is_flaky() {
        let context = ExecutionContext::default();
        let result = TestRunResult::new("t1", TestOutcome::Passed).with_retry_count(2);
        assert_eq!(
            classify_from_history(&context, &result).map(|(c, _)| c),
            Some(Category::Flaky)
        );
    }

    #[test]
    fn test_new_test_with_no_history() {
        let context = ExecutionContext::default();
        let result = TestRunResult::new("t1", TestOutcome::Failed);
        assert_eq!(
            classify_from_history(&context, &result).map(|(c, _)| c),
            Some(Category::New)
        );
    }

    #[test]
    fn test_previously_stable_and_covered_file_changed_is_regression() {
        let mut coverage_map = HashMap::new();
        coverage_map.insert("src/lib.rs".to_string(), vec!["t1".to_string()]);
        let context = ExecutionContext {
            history: (0..6).map(|_| history_run("t1", TestOutcome::Passed, 0)).collect(),
            changed_files: vec!["src/lib.rs".into()],
            coverage_map,
            ..Default::default()
        };
        let result = TestRunResult::new("t1", TestOutcome::Failed);
        assert_eq!(
            classify_from_history(&context, &result).map(|(c, _)| c),
            Some(Category::Regression)
        );
    }

    #[test]
    fn test_stable_history_with_no_changed_coverage_yields_none() {
        let context = ExecutionContext {
            history: (0..6).map(|_| history_run("t1", TestOutcome::Passed, 0)).collect(),
            ..Default::default()
        };
        let result = TestRunResult::new("t1", TestOutcome::Failed);
        assert!(classify_from_history(&context, &result).is_none());
    }
}
