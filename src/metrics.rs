//! Sidecar metrics: a `prometheus::Registry` exposing the canonical set of
//! gauges/counters/histograms every running sidecar publishes at `/metrics`.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    pub events_total: IntCounterVec,
    pub events_dropped_total: IntCounterVec,
    pub errors_total: IntCounterVec,
    pub queue_size: IntGauge,
    pub queue_utilization: prometheus::Gauge,
    pub cpu_usage: prometheus::Gauge,
    pub memory_usage_mb: prometheus::Gauge,
    pub processing_latency_ms: Histogram,
    pub health_status: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let events_total = IntCounterVec::new(
            Opts::new("sidecar_events_total", "Total events accepted by the sidecar"),
            &["type"],
        )
        .expect("valid metric");
        let events_dropped_total = IntCounterVec::new(
            Opts::new("sidecar_events_dropped_total", "Total events dropped due to a full queue"),
            &["type"],
        )
        .expect("valid metric");
        let errors_total = IntCounterVec::new(
            Opts::new("sidecar_errors_total", "Total internal sidecar errors"),
            &["component"],
        )
        .expect("valid metric");
        let queue_size = IntGauge::new("sidecar_queue_size", "Current number of queued events")
            .expect("valid metric");
        let queue_utilization = prometheus::Gauge::new(
            "sidecar_queue_utilization",
            "Queue size as a fraction of max_queue_size",
        )
        .expect("valid metric");
        let cpu_usage =
            prometheus::Gauge::new("sidecar_cpu_usage", "Sidecar process CPU usage, percent")
                .expect("valid metric");
        let memory_usage_mb =
            prometheus::Gauge::new("sidecar_memory_usage_mb", "Sidecar process resident memory, MB")
                .expect("valid metric");
        let processing_latency_ms = Histogram::with_opts(HistogramOpts::new(
            "sidecar_processing_latency_ms",
            "Time to process a single event, milliseconds",
        ))
        .expect("valid metric");
        let health_status = IntGauge::new(
            "crossbridge_health_status",
            "Aggregate health status: 0 healthy, 1 degraded, 2 unhealthy",
        )
        .expect("valid metric");

        for collector in [
            Box::new(events_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(events_dropped_total.clone()),
            Box::new(errors_total.clone()),
            Box::new(queue_size.clone()),
            Box::new(queue_utilization.clone()),
            Box::new(cpu_usage.clone()),
            Box::new(memory_usage_mb.clone()),
            Box::new(processing_latency_ms.clone()),
            Box::new(health_status.clone()),
        ] {
            registry.register(collector).expect("register metric");
        }

        Self {
            registry,
            events_total,
            events_dropped_total,
            errors_total,
            queue_size,
            queue_utilization,
            cpu_usage,
            memory_usage_mb,
            processing_latency_ms,
            health_status,
        }
    }

    pub fn render(&self) -> String {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buf)
            .expect("encode metrics");
        String::from_utf8(buf).expect("metrics are valid utf8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_registered_metric_names() {
        let metrics = Metrics::new();
        metrics.events_total.with_label_values(&["test_event"]).inc();
        let rendered = metrics.render();
        assert!(rendered.contains("sidecar_events_total"));
    }
}
