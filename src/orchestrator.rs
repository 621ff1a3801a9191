//! Execution orchestration: planning a slice of tests to run, running that
//! plan, and tying the two together with classification and persistence.
//!
//! Grounded on `offload`'s `Orchestrator<P, D, R>` (`examples/imbue-ai-offload/src/orchestrator.rs`)
//! for the overall shape of "own the components, drive a run, aggregate
//! results" — but the teacher's orchestrator drives a single framework
//! against a single sandbox provider with retry-expanded instances. This one
//! drives many framework adapters through a strategy-selected plan, with no
//! sandbox/provider abstraction and no retry expansion: a flaky test is a
//! classifier concern (see [`crate::classifier`]), not a scheduling one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::adapter::AdapterRegistry;
use crate::classifier::Classifier;
use crate::config::Config;
use crate::context::ContextAssembler;
use crate::error::ExecutionError;
use crate::model::{
    ExecutionContext, ExecutionPlan, ExecutionRequest, ExecutionResult, RunStatus, TestRunResult,
};
use crate::persistence::Persistence;
use crate::strategy::StrategyRegistry;

/// Coordinates planning and execution of a test run.
///
/// Owns the adapter registry, the strategy registry, and a persistence
/// handle. Strategies and adapters are looked up by tag at plan/run time
/// rather than fixed as type parameters, since a single orchestrator must
/// serve every configured framework and strategy, not one of each.
pub struct Orchestrator {
    config: Config,
    adapters: AdapterRegistry,
    strategies: StrategyRegistry,
    classifier: Classifier,
    persistence: Arc<dyn Persistence>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        adapters: AdapterRegistry,
        strategies: StrategyRegistry,
        classifier: Classifier,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            config,
            adapters,
            strategies,
            classifier,
            persistence,
        }
    }

    /// Assembles context, invokes the requested strategy, and returns the
    /// resulting plan. Every context-assembly step is best-effort: a failed
    /// step (unreadable git history, missing coverage map, cold flaky cache)
    /// falls back to its documented default and is logged, never aborts the
    /// plan.
    pub async fn plan(&self, request: &ExecutionRequest) -> Result<ExecutionPlan, ExecutionError> {
        self.plan_with_context(request).await.map(|(plan, _)| plan)
    }

    /// Same as [`Self::plan`] but also returns the assembled context, so
    /// `execute` can reuse the same history slice for classification
    /// without assembling it twice.
    async fn plan_with_context(
        &self,
        request: &ExecutionRequest,
    ) -> Result<(ExecutionPlan, ExecutionContext), ExecutionError> {
        let assembler = ContextAssembler::new(&self.config, &self.adapters, self.persistence.as_ref());
        let mut context: ExecutionContext = assembler.assemble(request).await;
        apply_request_filters(&mut context, request);

        let strategy = self
            .strategies
            .get(&request.strategy)
            .ok_or_else(|| ExecutionError::UnknownStrategy(request.strategy.clone()))?;

        let mut plan = strategy.select(request, &context, &self.config.strategies);
        if plan.selected.is_empty() {
            plan.metadata.entry("status".to_string()).or_insert_with(|| "empty".to_string());
        }
        plan.available_count = context.discovered.len();
        if let Some(max_tests) = request.max_tests {
            plan.selected.truncate(max_tests);
        }
        info!(
            run_id = %request.run_id,
            strategy = %request.strategy,
            selected = plan.selected.len(),
            fallback = ?plan.fallback_reason,
            "produced execution plan"
        );
        Ok((plan, context))
    }

    /// Executes an already-produced plan. In dry-run mode no adapter is
    /// invoked: the plan's selections are echoed back as a synthetic
    /// all-skipped result so callers exercise the same code path whether or
    /// not tests actually run.
    pub async fn run(&self, plan: &ExecutionPlan) -> Result<ExecutionResult, ExecutionError> {
        let start = Instant::now();

        if plan.is_empty() {
            warn!(run_id = %plan.run_id, "execution plan selected no tests");
            return Ok(ExecutionResult::empty(plan.run_id.clone()));
        }

        if plan.timeout_override_secs == Some(0) {
            warn!(run_id = %plan.run_id, "max_duration_minutes=0, cancelling before any adapter is spawned");
            return Ok(ExecutionResult::cancelled(plan.run_id.clone()));
        }

        if plan.dry_run {
            let results = plan
                .selected
                .iter()
                .map(|s| {
                    TestRunResult::new(s.test.id.clone(), crate::model::TestOutcome::Skipped)
                })
                .collect::<Vec<_>>();
            return Ok(ExecutionResult {
                run_id: plan.run_id.clone(),
                status: RunStatus::classify_status(&results),
                results,
                duration: start.elapsed(),
            });
        }

        let mut by_framework: HashMap<String, Vec<&crate::model::SelectedTest>> = HashMap::new();
        for selected in &plan.selected {
            by_framework
                .entry(selected.test.framework.clone())
                .or_default()
                .push(selected);
        }

        let max_parallel = if plan.parallel { self.config.orchestrator.max_parallel.max(1) } else { 1 };
        let semaphore = Arc::new(tokio::sync::Semaphore::new(max_parallel));
        let mut handles = Vec::new();

        for (framework_tag, selected) in by_framework {
            let adapter = match self.adapters.get(&framework_tag) {
                Some(a) => a,
                None => {
                    warn!(framework = %framework_tag, "no adapter registered, skipping");
                    continue;
                }
            };
            let tests: Vec<_> = selected.iter().map(|s| s.test.clone()).collect();
            let timeout = plan
                .timeout_override_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| Duration::from_secs(self.config.orchestrator.test_timeout_secs));
            let grace = Duration::from_secs(self.config.orchestrator.grace_window_secs);
            let semaphore = semaphore.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                adapter.execute(&tests, timeout, grace).await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Ok(batch)) => results.extend(batch),
                Ok(Err(e)) => warn!(error = %e, "adapter batch failed"),
                Err(e) => warn!(error = %e, "adapter task panicked"),
            }
        }

        let status = RunStatus::classify_status(&results);
        Ok(ExecutionResult {
            run_id: plan.run_id.clone(),
            status,
            results,
            duration: start.elapsed(),
        })
    }

    /// Plans, runs, classifies every non-passing result, and persists the
    /// run. This is the single entry point the CLI's `exec run` subcommand
    /// drives; `plan`/`run` stay separately callable for `exec plan`
    /// (dry-run preview with no execution) and for tests. Returns the plan
    /// alongside the result and classifications so the CLI can report
    /// selection reasons and the reduction-vs-full-suite percentage without
    /// a second planning pass.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<(ExecutionPlan, ExecutionResult, Vec<crate::model::Classification>), ExecutionError> {
        let (plan, context) = self.plan_with_context(request).await?;
        let result = self.run(&plan).await?;

        let classifications = self.classifier.classify_results(&result.results, &context).await;

        if let Err(e) = self
            .persistence
            .save_execution(&plan, &result, &classifications)
            .await
        {
            warn!(run_id = %request.run_id, error = %e, "failed to persist execution, continuing");
        }

        Ok((plan, result, classifications))
    }
}

/// Applies `ExecutionRequest` tag-include/exclude and flaky filters to the
/// discovered test set before a strategy ever sees it, so every strategy
/// gets the same narrowed `available_tests` the spec's context model
/// describes rather than reimplementing the filter itself.
fn apply_request_filters(context: &mut ExecutionContext, request: &ExecutionRequest) {
    const FLAKY_THRESHOLD: f64 = 0.4;

    context.discovered.retain(|test| {
        if !request.tags_include.is_empty() && !test.tags.iter().any(|t| request.tags_include.contains(t)) {
            return false;
        }
        if request.tags_exclude.iter().any(|t| test.tags.contains(t)) {
            return false;
        }
        if !request.include_flaky {
            if let Some(score) = context.flaky_cache.get(&test.id) {
                if *score >= FLAKY_THRESHOLD {
                    return false;
                }
            }
        }
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExecutionPlan, SelectedTest, TestCase};

    #[test]
    fn test_dry_run_plan_detection() {
        let plan = ExecutionPlan {
            run_id: "r1".into(),
            strategy: "smoke".into(),
            selected: vec![SelectedTest {
                test: TestCase::new("t1", "pytest"),
                priority: 1,
                reason: "tag-match".into(),
            }],
            fallback_reason: None,
            dry_run: true,
            timeout_override_secs: None,
            parallel: true,
            metadata: HashMap::new(),
            available_count: 1,
        };
        assert!(plan.dry_run);
        assert!(!plan.is_empty());
    }
}
