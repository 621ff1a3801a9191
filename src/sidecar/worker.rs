//! Worker pool draining the observer queue. Each worker loops
//! `queue.dequeue().await` and hands the event to every registered handler;
//! a handler's error is counted toward the health aggregator's error rate
//! but never stops the worker or the queue.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::health::HealthAggregator;
use crate::metrics::Metrics;
use crate::sidecar::events::ObservedEvent;
use crate::sidecar::queue::Observer;

/// A consumer of drained events, e.g. a framework-specific parser feeding
/// results back into the classifier, or a persistence writer. Handlers run
/// sequentially per event within a worker; slow handlers should offload
/// their own work rather than block the worker loop indefinitely.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &ObservedEvent) -> Result<(), anyhow::Error>;
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `worker_count` tasks draining `queue`, each invoking every
    /// handler in `handlers` in order. Returns immediately; call `shutdown`
    /// to cancel and join every worker.
    pub fn spawn(
        worker_count: usize,
        queue: Arc<Observer<ObservedEvent>>,
        handlers: Arc<Vec<Arc<dyn EventHandler>>>,
        metrics: Arc<Metrics>,
        health: Arc<HealthAggregator>,
        cancel: CancellationToken,
    ) -> Self {
        let mut handles = Vec::with_capacity(worker_count.max(1));
        for worker_id in 0..worker_count.max(1) {
            let queue = queue.clone();
            let handlers = handlers.clone();
            let metrics = metrics.clone();
            let health = health.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, queue, handlers, metrics, health, cancel).await;
            }));
        }
        Self { handles }
    }

    pub async fn shutdown(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Observer<ObservedEvent>>,
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
    metrics: Arc<Metrics>,
    health: Arc<HealthAggregator>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            event = queue.dequeue() => event,
        };

        let started = std::time::Instant::now();
        let mut had_error = false;
        for handler in handlers.iter() {
            if let Err(e) = handler.handle(&event).await {
                had_error = true;
                warn!(worker_id, error = %e, "event handler failed");
                metrics.errors_total.with_label_values(&["worker"]).inc();
            }
        }
        health.record_event(had_error);
        metrics
            .processing_latency_ms
            .observe(started.elapsed().as_secs_f64() * 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sidecar::events::{EventType, IncomingEvent};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &ObservedEvent) -> Result<(), anyhow::Error> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait::async_trait]
    impl EventHandler for FailingHandler {
        async fn handle(&self, _event: &ObservedEvent) -> Result<(), anyhow::Error> {
            Err(anyhow::anyhow!("boom"))
        }
    }

    fn sample_event() -> ObservedEvent {
        IncomingEvent {
            event_type: EventType::TestEnd,
            framework: "pytest".into(),
            data: serde_json::Value::Null,
            timestamp: Utc::now(),
            run_id: Some("run-1".into()),
            test_id: Some("test-1".into()),
        }
        .into_observed(1)
    }

    #[tokio::test]
    async fn test_worker_drains_queue_and_invokes_handlers() {
        let queue = Arc::new(Observer::new(16));
        queue.enqueue(sample_event());
        let count = Arc::new(AtomicUsize::new(0));
        let handlers: Arc<Vec<Arc<dyn EventHandler>>> =
            Arc::new(vec![Arc::new(CountingHandler(count.clone()))]);
        let metrics = Arc::new(Metrics::new());
        let health = Arc::new(HealthAggregator::new(0, 0.5));
        let cancel = CancellationToken::new();

        let pool = WorkerPool::spawn(1, queue, handlers, metrics, health, cancel.clone());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();
        pool.shutdown().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_failure_is_recorded_but_does_not_stop_worker() {
        let queue = Arc::new(Observer::new(16));
        queue.enqueue(sample_event());
        queue.enqueue(sample_event());
        let handlers: Arc<Vec<Arc<dyn EventHandler>>> = Arc::new(vec![Arc::new(FailingHandler)]);
        let metrics = Arc::new(Metrics::new());
        let health = Arc::new(HealthAggregator::new(0, 0.5));
        let cancel = CancellationToken::new();

        let pool = WorkerPool::spawn(1, queue, handlers, metrics.clone(), health, cancel.clone());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();
        pool.shutdown().await;

        let rendered = metrics.render();
        assert!(rendered.contains("sidecar_errors_total"));
    }
}
