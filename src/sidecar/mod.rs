//! The sidecar runtime (C4): a long-lived HTTP observer that in-test
//! listeners POST lifecycle events to, independent of and outliving any
//! single orchestrator run.
//!
//! Grounded on `offload`'s `provider::modal` background-task plumbing
//! (`examples/imbue-ai-offload/src/provider/modal.rs`) for the general shape
//! of "a long-running background component with its own shutdown signal",
//! generalized here to an HTTP server plus two auxiliary background tasks
//! (the profiler and the worker pool) coordinated through one
//! `tokio_util::sync::CancellationToken`.

pub mod events;
pub mod handlers;
pub mod parse;
pub mod profiler;
pub mod queue;
pub mod sampler;
pub mod server;
pub mod state;
pub mod worker;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{HealthConfig, SidecarConfig};
use crate::error::SidecarError;
use crate::health::HealthAggregator;
use crate::metrics::Metrics;
use crate::persistence::Persistence;

use events::ObservedEvent;
use profiler::Profiler;
use queue::Observer;
use sampler::Sampler;
use server::AppState;
use state::SidecarState;
use worker::{EventHandler, WorkerPool};

/// A running sidecar instance: the bound HTTP server plus its background
/// tasks. `stop` drains the queue (per the Draining lifecycle state) before
/// tearing down workers, so events already admitted are not silently lost.
pub struct Sidecar {
    state: Arc<SidecarState>,
    sampler: Arc<Sampler>,
    app_state: Arc<AppState>,
    cancel: CancellationToken,
    server_handle: JoinHandle<()>,
    profiler_handle: JoinHandle<()>,
    worker_pool: Option<WorkerPool>,
    bound_addr: SocketAddr,
}

impl Sidecar {
    /// Binds the HTTP listener and starts the profiler and worker-pool
    /// background tasks. Returns once the listener is bound and accepting;
    /// the lifecycle state is `Running` by the time this returns.
    pub async fn start(
        config: SidecarConfig,
        health_config: HealthConfig,
        persistence: Arc<dyn Persistence>,
        handlers: Vec<Arc<dyn EventHandler>>,
    ) -> Result<Self, SidecarError> {
        let addr: SocketAddr = config
            .bind_addr
            .parse()
            .map_err(|e| SidecarError::MalformedEvent(format!("invalid bind_addr '{}': {e}", config.bind_addr)))?;

        let queue: Arc<Observer<ObservedEvent>> = Arc::new(Observer::new(config.max_queue_size));
        let sampler = Arc::new(Sampler::new(&config.sample_rates, config.anomaly_boost_secs, config.anomaly_boost_factor));
        let sidecar_state = Arc::new(SidecarState::new(config.clone()));
        let metrics = Arc::new(Metrics::new());
        let health = Arc::new(HealthAggregator::new(health_config.cold_start_grace_secs, health_config.degraded_error_rate));
        let profiler = Arc::new(Profiler::new(config.cpu_budget_pct, config.memory_budget_mb));

        let app_state = Arc::new(AppState::new(
            queue.clone(),
            sampler.clone(),
            sidecar_state.clone(),
            metrics.clone(),
            health.clone(),
            profiler.clone(),
            persistence,
        ));

        let cancel = CancellationToken::new();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(SidecarError::Io)?;
        let bound_addr = listener.local_addr().map_err(SidecarError::Io)?;

        let router = server::router(app_state.clone());
        let server_cancel = cancel.clone();
        let server_handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { server_cancel.cancelled().await })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "sidecar http server exited with error");
            }
        });

        let profiler_task = profiler.clone();
        let profiler_cancel = cancel.clone();
        let profiler_sampler = sampler.clone();
        let interval = Duration::from_secs(config.profiler_interval_secs.max(1));
        let profiler_handle = tokio::spawn(async move {
            profiler_task.run(interval, profiler_cancel, profiler_sampler).await;
        });

        let worker_pool = if handlers.is_empty() {
            None
        } else {
            Some(WorkerPool::spawn(
                config.worker_count,
                queue.clone(),
                Arc::new(handlers),
                metrics.clone(),
                health.clone(),
                cancel.clone(),
            ))
        };

        sidecar_state.mark_running();
        info!(bind_addr = %bound_addr, "sidecar started");

        Ok(Self {
            state: sidecar_state,
            sampler,
            app_state,
            cancel,
            server_handle,
            profiler_handle,
            worker_pool,
            bound_addr,
        })
    }

    pub fn bound_addr(&self) -> SocketAddr {
        self.bound_addr
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.app_state.metrics.clone()
    }

    pub fn report_anomaly(&self, event_type: &str, kind: &str) {
        self.sampler.report_anomaly(event_type, kind);
    }

    /// `reload_config` per the C4 contract: re-applies sample rates and
    /// budgets atomically without dropping in-flight events. The queue
    /// capacity itself cannot change without reallocating the queue, so a
    /// `max_queue_size` change takes effect only on the next restart; this
    /// is noted as a known limitation rather than silently ignored.
    pub fn reload_config(&self, new_config: SidecarConfig) {
        self.sampler.reload_rates(&new_config.sample_rates);
        if new_config.max_queue_size != self.state.config().max_queue_size {
            warn!(
                "sidecar max_queue_size change requires a restart to take effect; new value ignored until then"
            );
        }
        self.state.reload_config(new_config);
    }

    /// Begins draining: stops accepting new events, lets in-flight worker
    /// handlers finish, then tears down the HTTP server and background
    /// tasks. Waits at most `grace` for the worker pool to empty the queue.
    pub async fn stop(self, grace: Duration) {
        self.state.begin_draining();

        let deadline = tokio::time::Instant::now() + grace;
        while !self.app_state.queue.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        self.cancel.cancel();
        if let Some(pool) = self.worker_pool {
            pool.shutdown().await;
        }
        let _ = self.server_handle.await;
        let _ = self.profiler_handle.await;
        self.state.mark_stopped();
        info!("sidecar stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SampleRates;

    #[tokio::test]
    async fn test_sidecar_starts_and_stops_cleanly() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let persistence = Arc::new(
            crate::persistence::sqlite::SqlitePersistence::open(
                &dir.path().join("test.db"),
                &dir.path().join("spool"),
            )
            .expect("open sqlite persistence"),
        );

        let mut config = SidecarConfig::default();
        config.bind_addr = "127.0.0.1:0".to_string();
        config.sample_rates = SampleRates { events: 1.0, traces: 1.0, profiling: 1.0, test_events: 1.0 };

        let sidecar = Sidecar::start(config, HealthConfig::default(), persistence, Vec::new())
            .await
            .expect("sidecar starts");
        assert!(sidecar.bound_addr().port() > 0);
        sidecar.stop(Duration::from_millis(200)).await;
    }
}
