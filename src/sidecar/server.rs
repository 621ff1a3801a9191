//! The sidecar's HTTP ingestion surface: `/events`, `/events/batch`,
//! `/parse/{framework}`, `/health`, `/metrics`, `/stats`. Built on `axum`,
//! the only HTTP stack this crate depends on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::warn;

use crate::health::HealthAggregator;
use crate::metrics::Metrics;
use crate::persistence::Persistence;
use crate::sidecar::events::{BatchRequest, IncomingEvent, ObservedEvent, SequenceAllocator};
use crate::sidecar::parse;
use crate::sidecar::profiler::Profiler;
use crate::sidecar::queue::Observer;
use crate::sidecar::sampler::Sampler;
use crate::sidecar::state::SidecarState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Default)]
struct IngestStats {
    total_events: AtomicU64,
    by_type: Mutex<HashMap<String, u64>>,
    by_framework: Mutex<HashMap<String, u64>>,
}

impl IngestStats {
    fn record(&self, event_type: &str, framework: &str) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        *self.by_type.lock().expect("stats lock poisoned").entry(event_type.to_string()).or_insert(0) += 1;
        *self
            .by_framework
            .lock()
            .expect("stats lock poisoned")
            .entry(framework.to_string())
            .or_insert(0) += 1;
    }
}

pub struct AppState {
    pub queue: Arc<Observer<ObservedEvent>>,
    pub sequence: SequenceAllocator,
    pub sampler: Arc<Sampler>,
    pub state: Arc<SidecarState>,
    pub metrics: Arc<Metrics>,
    pub health: Arc<HealthAggregator>,
    pub profiler: Arc<Profiler>,
    pub persistence: Arc<dyn Persistence>,
    stats: IngestStats,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        queue: Arc<Observer<ObservedEvent>>,
        sampler: Arc<Sampler>,
        state: Arc<SidecarState>,
        metrics: Arc<Metrics>,
        health: Arc<HealthAggregator>,
        profiler: Arc<Profiler>,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            queue,
            sequence: SequenceAllocator::new(),
            sampler,
            state,
            metrics,
            health,
            profiler,
            persistence,
            stats: IngestStats::default(),
            started_at: Instant::now(),
        }
    }

    fn queue_utilization(&self, max_queue_size: usize) -> f64 {
        if max_queue_size == 0 {
            return 1.0;
        }
        self.queue.len() as f64 / max_queue_size as f64
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/events", post(post_event))
        .route("/events/batch", post(post_event_batch))
        .route("/parse/:framework", post(post_parse))
        .route("/health", get(get_health))
        .route("/metrics", get(get_metrics))
        .route("/stats", get(get_stats))
        .with_state(state)
}

/// Admits `event` per the sampler's decision for its dimension and the
/// queue's drop-oldest policy. Both a sampling skip and a queue eviction are
/// "dropped", which per the ingestion contract is still `202`, never `5xx`.
fn ingest(state: &AppState, event: IncomingEvent) {
    state.stats.record(event.event_type.as_str(), &event.framework);
    state.metrics.events_total.with_label_values(&[event.event_type.as_str()]).inc();

    if !state.state.accepts_events() {
        state.metrics.events_dropped_total.with_label_values(&[event.event_type.as_str()]).inc();
        return;
    }
    if !state.sampler.decide(event.event_type.sample_dimension()) {
        return;
    }

    let sequence = state.sequence.next();
    let observed = event.into_observed(sequence);
    if state.queue.enqueue(observed).is_some() {
        state.metrics.events_dropped_total.with_label_values(&["queue_full"]).inc();
    }
}

async fn post_event(State(state): State<Arc<AppState>>, Json(event): Json<IncomingEvent>) -> StatusCode {
    ingest(&state, event);
    StatusCode::ACCEPTED
}

async fn post_event_batch(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<BatchRequest>,
) -> StatusCode {
    for event in batch.events {
        ingest(&state, event);
    }
    StatusCode::ACCEPTED
}

async fn post_parse(
    State(_state): State<Arc<AppState>>,
    Path(framework): Path<String>,
    body: String,
) -> Response {
    match parse::parse_report(&framework, &body) {
        Ok(envelope) => Json(envelope).into_response(),
        Err(e) => {
            warn!(framework, error = %e, "log parse failed");
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: f64,
    version: &'static str,
    components: HashMap<&'static str, &'static str>,
}

async fn get_health(State(state): State<Arc<AppState>>) -> Response {
    let config = state.state.config();
    let utilization = state.queue_utilization(config.max_queue_size);
    let persistence_health = state.persistence.health().await;
    let report = state.health.report(utilization, persistence_health);

    let mut components = HashMap::new();
    components.insert(
        "observer",
        if utilization >= 1.0 {
            "unhealthy"
        } else if utilization >= 0.8 {
            "degraded"
        } else {
            "healthy"
        },
    );
    components.insert("profiler", if state.profiler.is_over_budget() { "degraded" } else { "healthy" });
    components.insert("persistence", report.persistence);

    let status = match report.status {
        crate::health::Severity::Healthy => "healthy",
        crate::health::Severity::Degraded => "degraded",
        crate::health::Severity::Unhealthy => "unhealthy",
    };

    let body = HealthResponse {
        status,
        uptime_seconds: state.started_at.elapsed().as_secs_f64(),
        version: VERSION,
        components,
    };
    (StatusCode::from_u16(report.status.as_status_code()).expect("valid status code"), Json(body)).into_response()
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Response {
    state.metrics.queue_size.set(state.queue.len() as i64);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}

#[derive(Serialize)]
struct StatsResponse {
    total_events: u64,
    events_by_type: HashMap<String, u64>,
    events_by_framework: HashMap<String, u64>,
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        total_events: state.stats.total_events.load(Ordering::Relaxed),
        events_by_type: state.stats.by_type.lock().expect("stats lock poisoned").clone(),
        events_by_framework: state.stats.by_framework.lock().expect("stats lock poisoned").clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SampleRates;
    use crate::persistence::sqlite::SqlitePersistence;

    async fn test_state() -> (Arc<AppState>, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let persistence = SqlitePersistence::open(&dir.path().join("test.db"), &dir.path().join("spool"))
            .expect("open sqlite persistence");
        let app = AppState::new(
            Arc::new(Observer::new(16)),
            Arc::new(Sampler::new(
                &SampleRates { events: 1.0, traces: 1.0, profiling: 1.0, test_events: 1.0 },
                60,
                5.0,
            )),
            Arc::new(SidecarState::new(crate::config::SidecarConfig::default())),
            Arc::new(Metrics::new()),
            Arc::new(HealthAggregator::new(0, 0.5)),
            Arc::new(Profiler::new(80.0, 512)),
            Arc::new(persistence),
        );
        app.state.mark_running();
        (Arc::new(app), dir)
    }

    #[tokio::test]
    async fn test_ingest_enqueues_when_sampled_and_running() {
        let (state, _dir) = test_state().await;
        let event = IncomingEvent {
            event_type: crate::sidecar::events::EventType::TestEnd,
            framework: "pytest".into(),
            data: serde_json::Value::Null,
            timestamp: chrono::Utc::now(),
            run_id: None,
            test_id: Some("t1".into()),
        };
        ingest(&state, event);
        assert_eq!(state.queue.len(), 1);
        assert_eq!(state.stats.total_events.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_ingest_drops_when_not_running() {
        let (state, _dir) = test_state().await;
        state.state.begin_draining();
        let event = IncomingEvent {
            event_type: crate::sidecar::events::EventType::RunStart,
            framework: "pytest".into(),
            data: serde_json::Value::Null,
            timestamp: chrono::Utc::now(),
            run_id: None,
            test_id: None,
        };
        ingest(&state, event);
        assert_eq!(state.queue.len(), 0);
    }
}
