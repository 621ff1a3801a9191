//! Test selection strategies: smoke, impacted, risk-weighted and full.
//!
//! Grounded on `offload`'s `executor::scheduler::Scheduler` (batching
//! already-selected tests for parallel execution) generalized one layer up:
//! here a strategy decides *which* tests run at all and with what priority,
//! before the orchestrator ever schedules or executes anything.

pub mod full;
pub mod impacted;
pub mod risk;
pub mod smoke;

use std::collections::HashMap;

use crate::config::StrategyConfig;
use crate::model::{ExecutionContext, ExecutionPlan, ExecutionRequest};

/// A test selection strategy. Implementations must sort `selected` by
/// `priority` ascending, then by `test.id` lexicographically, so two calls
/// with identical inputs always produce an identical plan.
pub trait Strategy: Send + Sync {
    fn tag(&self) -> &'static str;

    fn select(
        &self,
        request: &ExecutionRequest,
        context: &ExecutionContext,
        config: &StrategyConfig,
    ) -> ExecutionPlan;
}

/// Sorts a plan's selections into the canonical deterministic order.
pub fn stable_sort(plan: &mut ExecutionPlan) {
    plan.selected
        .sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.test.id.cmp(&b.test.id)));
}

pub struct StrategyRegistry {
    strategies: HashMap<&'static str, Box<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    pub fn register(mut self, strategy: Box<dyn Strategy>) -> Self {
        self.strategies.insert(strategy.tag(), strategy);
        self
    }

    pub fn get(&self, tag: &str) -> Option<&dyn Strategy> {
        self.strategies.get(tag).map(|s| s.as_ref())
    }

    /// Builds the registry with all four built-in strategies.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(Box::new(smoke::SmokeStrategy))
            .register(Box::new(impacted::ImpactedStrategy))
            .register(Box::new(risk::RiskStrategy))
            .register(Box::new(full::FullStrategy))
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
