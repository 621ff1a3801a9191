//! # crossbridge
//!
//! Test execution orchestration paired with a sidecar observability runtime:
//! select a slice of tests under a budget, run them through thirteen
//! framework-specific adapters, classify failures deterministically (with
//! optional bounded AI enrichment), and persist the run — while a long-lived
//! sidecar process ingests lifecycle events from in-test listeners
//! independent of any single run.
//!
//! ## Architecture
//!
//! ### Model ([`model`])
//!
//! The shared data model every other module reasons over: [`model::TestCase`],
//! [`model::ExecutionPlan`], [`model::ExecutionResult`], [`model::Classification`].
//!
//! ### Adapters ([`adapter`])
//!
//! One [`adapter::FrameworkAdapter`] per supported framework (pytest, cargo,
//! go test, Jest, Mocha, TestNG, JUnit, NUnit, PHPUnit, RSpec, Robot
//! Framework, Cypress, Playwright), each implementing discovery, command
//! synthesis and report parsing. [`adapter::build_registry`] wires one up
//! per configured `[frameworks.*]` section.
//!
//! ### Strategies ([`strategy`])
//!
//! Deterministic, budget-aware test selection: [`strategy::smoke`],
//! [`strategy::impacted`], [`strategy::risk`] and [`strategy::full`], chosen
//! by [`model::ExecutionRequest::strategy`] and registered in a
//! [`strategy::StrategyRegistry`].
//!
//! ### Orchestrator ([`orchestrator`])
//!
//! [`orchestrator::Orchestrator`] ties context assembly, strategy selection,
//! parallel adapter execution, classification and persistence together for
//! a single run.
//!
//! ### Classifier ([`classifier`])
//!
//! [`classifier::Classifier`] turns a failing [`model::TestRunResult`] into
//! a [`model::Classification`]: ordered substring rules first
//! ([`classifier::rules`]), then history-derived categories
//! ([`classifier::history`]), then an optional bounded AI enrichment pass
//! ([`classifier::ai`]) that may annotate but never overturn the category.
//!
//! ### Sidecar ([`sidecar`])
//!
//! [`sidecar::Sidecar`] is the long-lived HTTP observer: a bounded
//! drop-oldest event queue ([`sidecar::queue::Observer`]), a lock-free
//! adaptive sampler ([`sidecar::sampler::Sampler`]), a background CPU/RSS
//! profiler ([`sidecar::profiler::Profiler`]), a worker pool draining the
//! queue ([`sidecar::worker::WorkerPool`]), and the `axum` routes serving
//! `/events`, `/events/batch`, `/parse/{framework}`, `/health`, `/metrics`
//! and `/stats` ([`sidecar::server`]).
//!
//! ### Persistence ([`persistence`])
//!
//! [`persistence::Persistence`] is a narrow async trait in front of
//! [`persistence::sqlite::SqlitePersistence`], with
//! [`persistence::spool::SpoolWriter`] buffering writes to local JSON lines
//! during a database outage for later replay.
//!
//! ### Health and metrics ([`health`], [`metrics`])
//!
//! [`health::HealthAggregator`] folds queue pressure, persistence health and
//! error rate into a single [`health::Severity`], with a cold-start grace
//! window. [`metrics::Metrics`] exposes the canonical Prometheus gauges and
//! counters every running sidecar publishes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use crossbridge::config::Config;
//! use crossbridge::adapter::build_registry;
//! use crossbridge::classifier::Classifier;
//! use crossbridge::strategy::StrategyRegistry;
//! use crossbridge::orchestrator::Orchestrator;
//! use crossbridge::persistence::sqlite::SqlitePersistence;
//! use crossbridge::model::ExecutionRequest;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let adapters = build_registry(&config);
//!     let strategies = StrategyRegistry::with_defaults();
//!     let classifier = Classifier::load(&config.classifier);
//!     let persistence = Arc::new(SqlitePersistence::open(
//!         &config.persistence.cache_dir.join("crossbridge.db"),
//!         &config.persistence.cache_dir.join("spool"),
//!     )?);
//!
//!     let orchestrator = Orchestrator::new(config, adapters, strategies, classifier, persistence);
//!     let request = ExecutionRequest {
//!         run_id: "local-run".to_string(),
//!         strategy: "smoke".to_string(),
//!         base_branch: "main".to_string(),
//!         frameworks: vec!["pytest".to_string()],
//!         dry_run: false,
//!         ..Default::default()
//!     };
//!     let plan = orchestrator.plan(&request).await?;
//!     let result = orchestrator.run(&plan).await?;
//!
//!     std::process::exit(result.exit_code());
//! }
//! ```

pub mod adapter;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod health;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod persistence;
pub mod process;
pub mod sidecar;
pub mod strategy;

pub use config::Config;
pub use error::{AdapterError, ConfigError, ExecutionError, ExitKind, SidecarError};
pub use model::{ExecutionPlan, ExecutionRequest, ExecutionResult};
pub use orchestrator::Orchestrator;
pub use sidecar::Sidecar;
