//! Smoke strategy: selects every test carrying any tag in
//! `strategies.smoke_tags` (default `{smoke, sanity, critical, p0}`).
//!
//! This is the strategy every other strategy falls back to when it cannot
//! assemble enough signal to select a richer slice, so it must never itself
//! fail or require external context (coverage, history, embeddings) beyond
//! the discovered test list.

use crate::config::StrategyConfig;
use crate::model::{ExecutionContext, ExecutionPlan, ExecutionRequest, SelectedTest, TestCase};

use super::{stable_sort, Strategy};

pub struct SmokeStrategy;

impl Strategy for SmokeStrategy {
    fn tag(&self) -> &'static str {
        "smoke"
    }

    fn select(
        &self,
        request: &ExecutionRequest,
        context: &ExecutionContext,
        config: &StrategyConfig,
    ) -> ExecutionPlan {
        let mut selected: Vec<SelectedTest> = context
            .discovered
            .iter()
            .filter_map(|t| {
                first_matching_tag(t, &config.smoke_tags).map(|tag| SelectedTest {
                    test: t.clone(),
                    priority: 1,
                    reason: format!("tag:{tag}"),
                })
            })
            .collect();

        if selected.is_empty() && !context.discovered.is_empty() {
            selected = critical_fallback(context, config);
        }

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

/// The first tag (in `smoke_tags` configured order) a test carries, so two
/// tests tagged identically always get the same reason string regardless of
/// the order `TestCase::tags` happens to list them in.
fn first_matching_tag<'a>(test: &TestCase, smoke_tags: &'a [String]) -> Option<&'a str> {
    smoke_tags.iter().find(|tag| test.tags.contains(tag)).map(String::as_str)
}

/// Edge case: no test carries a smoke tag but tests exist at all. Falls back
/// to the highest-risk critical-tagged tests by historical failure rate, so
/// a smoke run is never vacuously empty. If no test is tagged critical
/// either, the whole discovered set is ranked instead.
fn critical_fallback(context: &ExecutionContext, config: &StrategyConfig) -> Vec<SelectedTest> {
    let mut candidates: Vec<&TestCase> = context
        .discovered
        .iter()
        .filter(|t| t.tags.iter().any(|tag| config.critical_tags.contains(tag)))
        .collect();
    if candidates.is_empty() {
        candidates = context.discovered.iter().collect();
    }

    candidates.sort_by(|a, b| {
        let fail_a = context.history_stats_for(&a.id).fail_rate();
        let fail_b = context.history_stats_for(&b.id).fail_rate();
        fail_b.partial_cmp(&fail_a).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.id.cmp(&b.id))
    });

    candidates
        .into_iter()
        .take(config.min_tests.max(1))
        .map(|t| SelectedTest {
            test: t.clone(),
            priority: 1,
            reason: "critical-fallback".to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestCase;

    fn request() -> ExecutionRequest {
        ExecutionRequest {
            run_id: "r1".into(),
            strategy: "smoke".into(),
            base_branch: "main".into(),
            frameworks: vec![],
            dry_run: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_smoke_selection_scenario() {
        // spec.md §8 scenario 1: t1{smoke}, t2{smoke,p0}, t3{regression}, t4{}
        // smoke tags = {smoke, p0} -> selected = [t1, t2], both tag:smoke.
        let context = ExecutionContext {
            discovered: vec![
                TestCase::new("t1", "pytest").with_tags(vec!["smoke".into()]),
                TestCase::new("t2", "pytest").with_tags(vec!["smoke".into(), "p0".into()]),
                TestCase::new("t3", "pytest").with_tags(vec!["regression".into()]),
                TestCase::new("t4", "pytest"),
            ],
            ..Default::default()
        };
        let config = StrategyConfig {
            smoke_tags: vec!["smoke".into(), "p0".into()],
            ..Default::default()
        };
        let plan = SmokeStrategy.select(&request(), &context, &config);

        assert_eq!(plan.selected.len(), 2);
        assert_eq!(plan.selected[0].test.id, "t1");
        assert_eq!(plan.selected[0].priority, 1);
        assert_eq!(plan.selected[0].reason, "tag:smoke");
        assert_eq!(plan.selected[1].test.id, "t2");
        assert_eq!(plan.selected[1].reason, "tag:smoke");
    }

    #[test]
    fn test_smoke_falls_back_to_critical_history_when_no_tag_matches() {
        let context = ExecutionContext {
            discovered: vec![
                TestCase::new("t1", "pytest").with_tags(vec!["critical".into()]),
                TestCase::new("t2", "pytest").with_tags(vec!["regression".into()]),
            ],
            ..Default::default()
        };
        let config = StrategyConfig {
            smoke_tags: vec!["smoke".into()],
            critical_tags: vec!["critical".into()],
            min_tests: 5,
            ..Default::default()
        };
        let plan = SmokeStrategy.select(&request(), &context, &config);

        assert_eq!(plan.selected.len(), 1);
        assert_eq!(plan.selected[0].test.id, "t1");
        assert_eq!(plan.selected[0].reason, "critical-fallback");
    }

    #[test]
    fn test_smoke_is_never_vacuous_when_tests_are_available() {
        let context = ExecutionContext {
            discovered: vec![TestCase::new("t1", "pytest"), TestCase::new("t2", "pytest")],
            ..Default::default()
        };
        let config = StrategyConfig {
            smoke_tags: vec!["smoke".into()],
            critical_tags: vec!["critical".into()],
            min_tests: 5,
            ..Default::default()
        };
        let plan = SmokeStrategy.select(&request(), &context, &config);
        assert_eq!(plan.selected.len(), 2);
    }

    #[test]
    fn test_smoke_empty_when_available_is_empty() {
        let context = ExecutionContext::default();
        let config = StrategyConfig::default();
        let plan = SmokeStrategy.select(&request(), &context, &config);
        assert!(plan.selected.is_empty());
    }
}
