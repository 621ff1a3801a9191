//! Framework adapters: discovery, command synthesis and result parsing for
//! every supported test framework.
//!
//! Grounded on `offload`'s `#[async_trait] trait TestFramework`
//! (`examples/imbue-ai-offload/src/framework.rs`) and its `pytest`/`cargo`
//! implementations (`examples/imbue-ai-offload/src/framework/{pytest,cargo}.rs`),
//! generalized from two frameworks to thirteen and switched from
//! `provider::Sandbox::exec` (which shells out via `Command::to_shell_string()`)
//! to [`crate::process::run_with_timeout`], which spawns argv directly.

pub mod cargo;
pub mod common;
pub mod cypress;
pub mod gotest;
pub mod jest;
pub mod junit;
pub mod mocha;
pub mod nunit;
pub mod phpunit;
pub mod playwright;
pub mod pytest;
pub mod robot;
pub mod rspec;
pub mod testng;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AdapterError;
use crate::model::{TestCase, TestRunResult};
use crate::process::{run_with_timeout, ProcessOutput, ProcessSpec};

/// A framework adapter: discovers tests, synthesizes a run command for a
/// selected subset, and parses that subset's results back out.
///
/// `execute` has a default implementation shared by every adapter (spawn,
/// wait with the timeout/grace-window contract, parse); individual adapters
/// only need to implement the framework-specific pieces.
#[async_trait]
pub trait FrameworkAdapter: Send + Sync {
    fn tag(&self) -> &'static str;

    async fn discover(&self) -> Result<Vec<TestCase>, AdapterError>;

    /// Builds the argv for running exactly `tests` (never a shell string).
    fn plan_to_command(&self, tests: &[TestCase]) -> ProcessSpec;

    /// Parses adapter-native output (a junit XML report, JSON results file,
    /// or raw stdout, depending on the framework) into per-test results.
    fn parse_results(
        &self,
        output: &ProcessOutput,
        tests: &[TestCase],
    ) -> Result<Vec<TestRunResult>, AdapterError>;

    async fn execute(
        &self,
        tests: &[TestCase],
        timeout: Duration,
        grace_window: Duration,
    ) -> Result<Vec<TestRunResult>, AdapterError> {
        if tests.is_empty() {
            return Ok(Vec::new());
        }
        let spec = self.plan_to_command(tests);
        let output = run_with_timeout(&spec, timeout, grace_window).await?;
        if output.timed_out {
            return Ok(tests
                .iter()
                .map(|t| TestRunResult::new(t.id.clone(), crate::model::TestOutcome::Timeout))
                .collect());
        }
        self.parse_results(&output, tests)
    }
}

pub struct AdapterRegistry {
    adapters: HashMap<&'static str, Box<dyn FrameworkAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(mut self, adapter: Box<dyn FrameworkAdapter>) -> Self {
        self.adapters.insert(adapter.tag(), adapter);
        self
    }

    pub fn get(&self, tag: &str) -> Option<&dyn FrameworkAdapter> {
        self.adapters.get(tag).map(|a| a.as_ref())
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds an [`AdapterRegistry`] with one adapter per `[frameworks.*]`
/// section in `config`.
pub fn build_registry(config: &crate::config::Config) -> AdapterRegistry {
    use crate::config::FrameworkConfig;

    let mut registry = AdapterRegistry::new();
    for framework in config.frameworks.values() {
        registry = match framework {
            FrameworkConfig::Pytest(c) => registry.register(Box::new(pytest::PytestAdapter::new(c.clone()))),
            FrameworkConfig::Cargo(c) => registry.register(Box::new(cargo::CargoAdapter::new(c.clone()))),
            FrameworkConfig::GoTest(c) => registry.register(Box::new(gotest::GoTestAdapter::new(c.clone()))),
            FrameworkConfig::Jest(c) => registry.register(Box::new(jest::JestAdapter::new(c.clone()))),
            FrameworkConfig::Mocha(c) => registry.register(Box::new(mocha::MochaAdapter::new(c.clone()))),
            FrameworkConfig::TestNg(c) => registry.register(Box::new(testng::TestNgAdapter::new(c.clone()))),
            FrameworkConfig::Junit(c) => registry.register(Box::new(junit::JunitAdapter::new(c.clone()))),
            FrameworkConfig::Nunit(c) => registry.register(Box::new(nunit::NunitAdapter::new(c.clone()))),
            FrameworkConfig::Phpunit(c) => registry.register(Box::new(phpunit::PhpunitAdapter::new(c.clone()))),
            FrameworkConfig::Rspec(c) => registry.register(Box::new(rspec::RspecAdapter::new(c.clone()))),
            FrameworkConfig::Robot(c) => registry.register(Box::new(robot::RobotAdapter::new(c.clone()))),
            FrameworkConfig::Cypress(c) => registry.register(Box::new(cypress::CypressAdapter::new(c.clone()))),
            FrameworkConfig::Playwright(c) => {
                registry.register(Box::new(playwright::PlaywrightAdapter::new(c.clone())))
            }
        };
    }
    registry
}
