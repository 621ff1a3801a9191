//! Configuration schema definitions for CrossBridge.
//!
//! Generalizes `offload`'s `config::schema` (tagged-enum provider/framework
//! selection, `#[serde(default = "...")]` per-field defaults,
//! `#[serde(flatten)]` for nested sections) to a layered layout:
//! `[orchestrator]`, `[sidecar]`, `[classifier]`, `[persistence]`, and one
//! `[frameworks.<tag>]` table per configured adapter.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration structure, loaded from `crossbridge.yml` via
/// `serde_yaml`, layered over [`Config::default()`] and then over
/// `CROSSBRIDGE_`-prefixed environment variables (see [`crate::config::load_config`]).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub strategies: StrategyConfig,
    #[serde(default)]
    pub frameworks: HashMap<String, FrameworkConfig>,
    #[serde(default)]
    pub sidecar: SidecarConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            strategies: StrategyConfig::default(),
            frameworks: HashMap::new(),
            sidecar: SidecarConfig::default(),
            classifier: ClassifierConfig::default(),
            persistence: PersistenceConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

/// Orchestrator run settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default = "default_test_timeout_secs")]
    pub test_timeout_secs: u64,
    #[serde(default = "default_grace_window_secs")]
    pub grace_window_secs: u64,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    pub workspace: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            base_branch: default_base_branch(),
            test_timeout_secs: default_test_timeout_secs(),
            grace_window_secs: default_grace_window_secs(),
            max_parallel: default_max_parallel(),
            workspace: None,
        }
    }
}

fn default_base_branch() -> String {
    "main".to_string()
}
fn default_test_timeout_secs() -> u64 {
    900
}
fn default_grace_window_secs() -> u64 {
    10
}
fn default_max_parallel() -> usize {
    8
}

/// Selection strategy tuning knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    #[serde(default = "default_min_tests")]
    pub min_tests: usize,
    #[serde(default = "default_max_tests")]
    pub max_tests: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default)]
    pub critical_tags: Vec<String>,
    /// Tags the smoke strategy selects on, in priority order for the
    /// "first match wins" reason (`tag:<matched-tag>`) when a test carries
    /// more than one.
    #[serde(default = "default_smoke_tags")]
    pub smoke_tags: Vec<String>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_tests: default_min_tests(),
            max_tests: default_max_tests(),
            similarity_threshold: default_similarity_threshold(),
            critical_tags: vec!["critical".to_string()],
            smoke_tags: default_smoke_tags(),
        }
    }
}

fn default_smoke_tags() -> Vec<String> {
    vec!["smoke".to_string(), "sanity".to_string(), "critical".to_string(), "p0".to_string()]
}

fn default_min_tests() -> usize {
    5
}
fn default_max_tests() -> usize {
    100
}
fn default_similarity_threshold() -> f64 {
    0.7
}

/// Per-framework adapter configuration (tagged enum selected by `type`).
///
/// Every framework shares the same shape (discovery paths plus passthrough
/// extra args) since the adapter contract is uniform across all 13 supported
/// tags; bespoke fields live in adapter-specific sections when an adapter
/// genuinely needs one (e.g. `python` for pytest).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FrameworkConfig {
    Pytest(PytestAdapterConfig),
    Cargo(CargoAdapterConfig),
    GoTest(GenericAdapterConfig),
    Jest(GenericAdapterConfig),
    Mocha(GenericAdapterConfig),
    TestNg(GenericAdapterConfig),
    Junit(GenericAdapterConfig),
    Nunit(GenericAdapterConfig),
    Phpunit(GenericAdapterConfig),
    Rspec(GenericAdapterConfig),
    Robot(GenericAdapterConfig),
    Cypress(GenericAdapterConfig),
    Playwright(GenericAdapterConfig),
}

impl FrameworkConfig {
    pub fn tag(&self) -> &'static str {
        match self {
            FrameworkConfig::Pytest(_) => "pytest",
            FrameworkConfig::Cargo(_) => "cargo",
            FrameworkConfig::GoTest(_) => "gotest",
            FrameworkConfig::Jest(_) => "jest",
            FrameworkConfig::Mocha(_) => "mocha",
            FrameworkConfig::TestNg(_) => "testng",
            FrameworkConfig::Junit(_) => "junit",
            FrameworkConfig::Nunit(_) => "nunit",
            FrameworkConfig::Phpunit(_) => "phpunit",
            FrameworkConfig::Rspec(_) => "rspec",
            FrameworkConfig::Robot(_) => "robot",
            FrameworkConfig::Cypress(_) => "cypress",
            FrameworkConfig::Playwright(_) => "playwright",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PytestAdapterConfig {
    #[serde(default = "default_test_paths")]
    pub paths: Vec<PathBuf>,
    pub markers: Option<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "default_python")]
    pub python: String,
}

fn default_test_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("tests")]
}
fn default_python() -> String {
    "python".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CargoAdapterConfig {
    pub package: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
}

/// Shared shape for adapters whose discovery/run commands are uniform
/// modulo their program name, used by every non-pytest/cargo tag.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GenericAdapterConfig {
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    #[serde(default)]
    pub extra_args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// Sidecar runtime settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SidecarConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub sample_rates: SampleRates,
    #[serde(default = "default_anomaly_boost_secs")]
    pub anomaly_boost_secs: u64,
    #[serde(default = "default_anomaly_boost_factor")]
    pub anomaly_boost_factor: f64,
    #[serde(default = "default_cpu_budget_pct")]
    pub cpu_budget_pct: f64,
    #[serde(default = "default_memory_budget_mb")]
    pub memory_budget_mb: u64,
    #[serde(default = "default_profiler_interval_secs")]
    pub profiler_interval_secs: u64,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_queue_size: default_max_queue_size(),
            worker_count: default_worker_count(),
            sample_rates: SampleRates::default(),
            anomaly_boost_secs: default_anomaly_boost_secs(),
            anomaly_boost_factor: default_anomaly_boost_factor(),
            cpu_budget_pct: default_cpu_budget_pct(),
            memory_budget_mb: default_memory_budget_mb(),
            profiler_interval_secs: default_profiler_interval_secs(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:7878".to_string()
}
fn default_max_queue_size() -> usize {
    10_000
}
fn default_worker_count() -> usize {
    2
}
fn default_anomaly_boost_secs() -> u64 {
    60
}
fn default_anomaly_boost_factor() -> f64 {
    5.0
}
fn default_cpu_budget_pct() -> f64 {
    80.0
}
fn default_memory_budget_mb() -> u64 {
    512
}
fn default_profiler_interval_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SampleRates {
    #[serde(default = "default_events_rate")]
    pub events: f64,
    #[serde(default = "default_traces_rate")]
    pub traces: f64,
    #[serde(default = "default_profiling_rate")]
    pub profiling: f64,
    #[serde(default = "default_test_events_rate")]
    pub test_events: f64,
}

impl Default for SampleRates {
    fn default() -> Self {
        Self {
            events: default_events_rate(),
            traces: default_traces_rate(),
            profiling: default_profiling_rate(),
            test_events: default_test_events_rate(),
        }
    }
}

fn default_events_rate() -> f64 {
    0.1
}
fn default_traces_rate() -> f64 {
    0.05
}
fn default_profiling_rate() -> f64 {
    0.01
}
fn default_test_events_rate() -> f64 {
    0.2
}

/// Failure classifier settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_rules_path")]
    pub rules_path: PathBuf,
    #[serde(default)]
    pub ai_enrichment_enabled: bool,
    #[serde(default = "default_ai_confidence_delta")]
    pub ai_confidence_delta_max: f64,
    /// HTTP endpoint of the AI enrichment provider. `None` disables
    /// enrichment regardless of `ai_enrichment_enabled`.
    #[serde(default)]
    pub ai_provider_url: Option<String>,
    #[serde(default = "default_ai_timeout_secs")]
    pub ai_timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rules_path: default_rules_path(),
            ai_enrichment_enabled: false,
            ai_confidence_delta_max: default_ai_confidence_delta(),
            ai_provider_url: None,
            ai_timeout_secs: default_ai_timeout_secs(),
        }
    }
}

fn default_rules_path() -> PathBuf {
    PathBuf::from("crossbridge-rules.yml")
}
fn default_ai_confidence_delta() -> f64 {
    0.1
}
fn default_ai_timeout_secs() -> u64 {
    30
}

/// Persistence backend settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    #[serde(default = "default_history_slice_limit")]
    pub history_slice_limit: usize,
    #[serde(default = "default_cleanup_older_than_days")]
    pub cleanup_older_than_days: i64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            spool_dir: default_spool_dir(),
            cache_dir: default_cache_dir(),
            reports_dir: default_reports_dir(),
            history_slice_limit: default_history_slice_limit(),
            cleanup_older_than_days: default_cleanup_older_than_days(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/data/crossbridge.sqlite")
}
fn default_spool_dir() -> PathBuf {
    PathBuf::from("/data/cache/spool")
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("/data/cache")
}
fn default_reports_dir() -> PathBuf {
    PathBuf::from("/data/reports")
}
fn default_history_slice_limit() -> usize {
    50
}
fn default_cleanup_older_than_days() -> i64 {
    30
}

/// Health aggregation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    #[serde(default = "default_cold_start_grace_secs")]
    pub cold_start_grace_secs: u64,
    #[serde(default = "default_degraded_error_rate")]
    pub degraded_error_rate: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            cold_start_grace_secs: default_cold_start_grace_secs(),
            degraded_error_rate: default_degraded_error_rate(),
        }
    }
}

fn default_cold_start_grace_secs() -> u64 {
    30
}
fn default_degraded_error_rate() -> f64 {
    0.1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framework_tagged_enum_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let yaml_src = "
frameworks:
  unit:
    type: pytest
    paths: [\"tests\"]
";
        let config: Config = serde_yaml::from_str(yaml_src)?;
        let framework = config
            .frameworks
            .get("unit")
            .expect("frameworks.unit present");
        assert!(matches!(framework, FrameworkConfig::Pytest(_)));
        assert_eq!(framework.tag(), "pytest");
        Ok(())
    }

    #[test]
    fn test_defaults_populate_without_any_section() -> Result<(), Box<dyn std::error::Error>> {
        let config: Config = serde_yaml::from_str("")?;
        assert_eq!(config.orchestrator.base_branch, "main");
        assert_eq!(config.sidecar.max_queue_size, 10_000);
        assert_eq!(config.strategies.min_tests, 5);
        Ok(())
    }
}
