//! Full strategy: selects every discovered test, uncapped by `max_tests`.
//! Used for scheduled/nightly runs where coverage matters more than speed.

use crate::config::StrategyConfig;
use crate::model::{ExecutionContext, ExecutionPlan, ExecutionRequest, SelectedTest};

use super::{stable_sort, Strategy};

pub struct FullStrategy;

impl Strategy for FullStrategy {
    fn tag(&self) -> &'static str {
        "full"
    }

    fn select(
        &self,
        request: &ExecutionRequest,
        context: &ExecutionContext,
        _config: &StrategyConfig,
    ) -> ExecutionPlan {
        let selected = context
            .discovered
            .iter()
            .map(|test| SelectedTest {
                test: test.clone(),
                priority: 5,
                reason: "full-suite".to_string(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestCase;

    #[test]
    fn test_full_selects_every_discovered_test() {
        let context = ExecutionContext {
            discovered: (1..=10).map(|i| TestCase::new(format!("t{i}"), "pytest")).collect(),
            ..Default::default()
        };
        let request = ExecutionRequest {
            run_id: "r1".into(),
            strategy: "full".into(),
            base_branch: "main".into(),
            frameworks: vec![],
            dry_run: false,
            ..Default::default()
        };
        let plan = FullStrategy.select(&request, &context, &StrategyConfig::default());
        assert_eq!(plan.selected.len(), 10);
        assert!(plan.selected.iter().all(|s| s.priority == 5 && s.reason == "full-suite"));
    }
}
