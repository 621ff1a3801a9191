//! Risk-weighted strategy: scores every discovered test as
//! `0.4*failure_rate + 0.2*churn + 0.3*criticality - 0.1*flakiness_penalty`,
//! clipped to `[0, 1]`, and takes the top `max_tests` by score.

use crate::config::StrategyConfig;
use crate::model::{ExecutionContext, ExecutionPlan, ExecutionRequest, SelectedTest, TestCase};

use super::{stable_sort, Strategy};

const FAILURE_RATE_WEIGHT: f64 = 0.4;
const CHURN_WEIGHT: f64 = 0.2;
const CRITICALITY_WEIGHT: f64 = 0.3;
const FLAKINESS_PENALTY_WEIGHT: f64 = 0.1;

pub struct RiskStrategy;

impl Strategy for RiskStrategy {
    fn tag(&self) -> &'static str {
        "risk"
    }

    fn select(
        &self,
        request: &ExecutionRequest,
        context: &ExecutionContext,
        config: &StrategyConfig,
    ) -> ExecutionPlan {
        let mut scored: Vec<(RiskBreakdown, &TestCase)> = context
            .discovered
            .iter()
            .map(|test| (risk_breakdown(test, context, config), test))
            .collect();

        scored.sort_by(|a, b| b.0.score.partial_cmp(&a.0.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(config.max_tests);

        let selected = scored
            .into_iter()
            .map(|(breakdown, test)| SelectedTest {
                test: test.clone(),
                priority: breakdown.priority(),
                reason: breakdown.reason(),
            })
            .collect();

        let mut plan = ExecutionPlan {
            run_id: request.run_id.clone(),
            strategy: self.tag().to_string(),
            selected,
            fallback_reason: None,
            dry_run: request.dry_run,
            timeout_override_secs: request.max_duration_minutes.map(|m| m * 60),
            parallel: request.parallel,
            metadata: request.metadata.clone(),
        };
        stable_sort(&mut plan);
        plan
    }
}

struct RiskBreakdown {
    score: f64,
    failure_rate: f64,
    churn: f64,
    criticality: f64,
    flakiness_penalty: f64,
}

impl RiskBreakdown {
    /// `1 + floor((1 - score) * 4)`, so the top-scoring test gets priority 1
    /// and the lowest-scoring gets priority 5.
    fn priority(&self) -> u8 {
        let inverted = ((1.0 - self.score) * 4.0).floor() as u8;
        1 + inverted.min(4)
    }

    fn reason(&self) -> String {
        format!(
            "score={:.2} (fail_rate={:.2}*0.4 + churn={:.2}*0.2 + criticality={:.2}*0.3 - flaky={:.2}*0.1)",
            self.score, self.failure_rate, self.churn, self.criticality, self.flakiness_penalty
        )
    }
}

fn risk_breakdown(test: &TestCase, context: &ExecutionContext, config: &StrategyConfig) -> RiskBreakdown {
    let failure_rate = context.history_stats_for(&test.id).fail_rate();
    let churn = churn_fraction(test, context);
    let criticality = criticality_for(test, config);
    let flakiness_penalty = if context.flaky_cache.contains_key(&test.id) { 1.0 } else { 0.0 };

    let score = (FAILURE_RATE_WEIGHT * failure_rate + CHURN_WEIGHT * churn + CRITICALITY_WEIGHT * criticality
        - FLAKINESS_PENALTY_WEIGHT * flakiness_penalty)
        .clamp(0.0, 1.0);

    RiskBreakdown { score, failure_rate, churn, criticality, flakiness_penalty }
}

/// Fraction of the files covering this test (per `coverage_map`'s reverse
/// mapping) that are in the current changeset. A test with no known
/// covering files churns at 0. This context only carries the current
/// changeset rather than per-historical-run changesets, so "churn" here
/// is "how much of what this test covers is churning right now" rather
/// than a literal per-run fraction.
fn churn_fraction(test: &TestCase, context: &ExecutionContext) -> f64 {
    let covering_files: Vec<&String> = context
        .coverage_map
        .iter()
        .filter(|(_, tests)| tests.iter().any(|id| id == &test.id))
        .map(|(file, _)| file)
        .collect();

    if covering_files.is_empty() {
        return 0.0;
    }

    let churned = covering_files
        .iter()
        .filter(|file| context.changed_files.contains(*file))
        .count();

    churned as f64 / covering_files.len() as f64
}

fn criticality_for(test: &TestCase, config: &StrategyConfig) -> f64 {
    if test.tags.iter().any(|tag| config.critical_tags.contains(tag)) {
        1.0
    } else if test.tags.iter().any(|tag| tag == "high") {
        0.5
    } else {
        0.25
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request() -> ExecutionRequest {
        ExecutionRequest {
            run_id: "r1".into(),
            strategy: "risk".into(),
            base_branch: "main".into(),
            frameworks: vec![],
            dry_run: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_critical_tag_outranks_untagged_with_no_other_signal() {
        let context = ExecutionContext {
            discovered: vec![
                TestCase::new("critical_test", "pytest").with_tags(vec!["critical".into()]),
                TestCase::new("plain_test", "pytest"),
            ],
            ..Default::default()
        };
        let config = StrategyConfig::default();
        let plan = RiskStrategy.select(&request(), &context, &config);
        assert_eq!(plan.selected[0].test.id, "critical_test");
        // score = 0.3*1.0(criticality) = 0.3 -> priority = 1 + floor(0.7*4) = 3
        assert_eq!(plan.selected[0].priority, 3);
    }

    #[test]
    fn test_flaky_cache_membership_penalizes_score() {
        let mut flaky_cache = HashMap::new();
        flaky_cache.insert("flaky_test".to_string(), 0.9);
        let context = ExecutionContext {
            discovered: vec![
                TestCase::new("flaky_test", "pytest").with_tags(vec!["critical".into()]),
                TestCase::new("stable_critical_test", "pytest").with_tags(vec!["critical".into()]),
            ],
            flaky_cache,
            ..Default::default()
        };
        let config = StrategyConfig::default();
        let plan = RiskStrategy.select(&request(), &context, &config);
        // Both are critical (criticality=1.0, same weight); the flaky one's
        // score is penalized by 0.1, so it must sort after the stable one.
        assert_eq!(plan.selected[0].test.id, "stable_critical_test");
        assert_eq!(plan.selected[1].test.id, "flaky_test");
    }

    #[test]
    fn test_churn_uses_coverage_map_reverse_lookup() {
        let mut coverage_map = HashMap::new();
        coverage_map.insert("src/lib.rs".to_string(), vec!["t1".to_string()]);
        let context = ExecutionContext {
            discovered: vec![TestCase::new("t1", "pytest")],
            changed_files: vec!["src/lib.rs".into()],
            coverage_map,
            ..Default::default()
        };
        let config = StrategyConfig::default();
        let plan = RiskStrategy.select(&request(), &context, &config);
        // score = 0.2*churn(1.0) + 0.3*criticality(0.25) = 0.275 -> priority = 1 + floor(0.725*4) = 3
        assert_eq!(plan.selected[0].priority, 3);
    }

    #[test]
    fn test_max_tests_caps_selection() {
        let context = ExecutionContext {
            discovered: (1..=10).map(|i| TestCase::new(format!("t{i}"), "pytest")).collect(),
            ..Default::default()
        };
        let config = StrategyConfig {
            max_tests: 3,
            ..Default::default()
        };
        let plan = RiskStrategy.select(&request(), &context, &config);
        assert_eq!(plan.selected.len(), 3);
    }
}
