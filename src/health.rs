//! Health aggregation: combines queue pressure, persistence health and
//! error rate into a single severity, with a cold-start grace window so a
//! freshly-started sidecar isn't reported unhealthy before it has had a
//! chance to drain its initial backlog.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::persistence::PersistenceHealth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Healthy,
    Degraded,
    Unhealthy,
}

impl Severity {
    pub fn as_status_code(self) -> u16 {
        match self {
            Severity::Healthy => 200,
            Severity::Degraded => 200,
            Severity::Unhealthy => 503,
        }
    }

    pub fn as_metric_value(self) -> i64 {
        match self {
            Severity::Healthy => 0,
            Severity::Degraded => 1,
            Severity::Unhealthy => 2,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: Severity,
    pub cold_start: bool,
    pub queue_utilization: f64,
    pub persistence: &'static str,
    pub error_rate: f64,
}

pub struct HealthAggregator {
    started_at: Instant,
    cold_start_grace_secs: u64,
    degraded_error_rate: f64,
    errors: AtomicU64,
    total: AtomicU64,
}

impl HealthAggregator {
    pub fn new(cold_start_grace_secs: u64, degraded_error_rate: f64) -> Self {
        Self {
            started_at: Instant::now(),
            cold_start_grace_secs,
            degraded_error_rate,
            errors: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    pub fn record_event(&self, is_error: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn in_cold_start(&self) -> bool {
        self.started_at.elapsed().as_secs() < self.cold_start_grace_secs
    }

    fn error_rate(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            self.errors.load(Ordering::Relaxed) as f64 / total as f64
        }
    }

    pub fn report(&self, queue_utilization: f64, persistence: PersistenceHealth) -> HealthReport {
        let cold_start = self.in_cold_start();
        let error_rate = self.error_rate();

        let persistence_label = match persistence {
            PersistenceHealth::Healthy => "healthy",
            PersistenceHealth::Degraded => "degraded",
            PersistenceHealth::Unavailable => "unavailable",
        };

        let status = if cold_start {
            Severity::Healthy
        } else if persistence == PersistenceHealth::Unavailable || queue_utilization >= 1.0 {
            Severity::Unhealthy
        } else if persistence == PersistenceHealth::Degraded
            || queue_utilization >= 0.8
            || error_rate >= self.degraded_error_rate
        {
            Severity::Degraded
        } else {
            Severity::Healthy
        };

        HealthReport {
            status,
            cold_start,
            queue_utilization,
            persistence: persistence_label,
            error_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_error_rate_degrades_health_outside_cold_start() {
        let aggregator = HealthAggregator::new(0, 0.1);
        for _ in 0..10 {
            aggregator.record_event(true);
        }
        let report = aggregator.report(0.1, PersistenceHealth::Healthy);
        assert_eq!(report.status, Severity::Degraded);
    }

    #[test]
    fn test_unavailable_persistence_is_unhealthy_outside_cold_start() {
        let aggregator = HealthAggregator::new(0, 0.5);
        let report = aggregator.report(0.0, PersistenceHealth::Unavailable);
        assert_eq!(report.status, Severity::Unhealthy);
    }

    #[test]
    fn test_cold_start_masks_otherwise_unhealthy_state() {
        let aggregator = HealthAggregator::new(300, 0.1);
        let report = aggregator.report(1.0, PersistenceHealth::Unavailable);
        assert_eq!(report.status, Severity::Healthy);
        assert!(report.cold_start);
    }
}
