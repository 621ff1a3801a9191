//! Background CPU/RSS sampler for the sidecar's own process, backing the
//! `/stats` endpoint and the queue-pressure response when a run is noisy.
//! A ring buffer keeps a short rolling window so `get_summary` can average
//! over the last few samples instead of reacting to a single spike.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use sysinfo::{Pid, System};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::sampler::Sampler;

const RING_CAPACITY: usize = 120;
const OVER_BUDGET_CONSECUTIVE: u32 = 2;
const OVER_BUDGET_RATE_SCALE: f64 = 0.25;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ResourceSample {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProfilerSummary {
    pub avg_cpu_percent: f32,
    pub avg_memory_mb: f64,
    pub max_cpu_percent: f32,
    pub sample_count: usize,
}

/// Samples this process's CPU and RSS on an interval, retaining a bounded
/// ring buffer. `is_over_budget` requires two consecutive over-threshold
/// samples before tripping, so a single scheduler hiccup doesn't flap the
/// sidecar into a degraded sample-rate response.
pub struct Profiler {
    pid: Pid,
    ring: Mutex<VecDeque<ResourceSample>>,
    cpu_budget_pct: f64,
    memory_budget_mb: f64,
    /// Consecutive over-threshold samples required to trip `over_budget`.
    /// A budget of zero means any sample is already over budget, so a
    /// single sample trips it rather than waiting for a second.
    required_consecutive: u32,
    over_budget: AtomicBool,
    consecutive_over: Mutex<u32>,
}

impl Profiler {
    pub fn new(cpu_budget_pct: f64, memory_budget_mb: u64) -> Self {
        let required_consecutive = if cpu_budget_pct <= 0.0 || memory_budget_mb == 0 {
            1
        } else {
            OVER_BUDGET_CONSECUTIVE
        };
        Self {
            pid: Pid::from_u32(std::process::id()),
            ring: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            cpu_budget_pct,
            memory_budget_mb: memory_budget_mb as f64,
            required_consecutive,
            over_budget: AtomicBool::new(false),
            consecutive_over: Mutex::new(0),
        }
    }

    /// Runs until `cancel` fires, sampling every `interval`. Intended to be
    /// spawned as its own task; never returns an error since a failed
    /// refresh just means the next tick retains the last reading. When a
    /// sample newly trips `over_budget`, `sampler`'s rates are cut to 25% of
    /// their current value so ingestion pressure eases along with the
    /// resource pressure that caused it.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken, sampler: Arc<Sampler>) {
        let mut system = System::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    system.refresh_process(self.pid);
                    if let Some(process) = system.process(self.pid) {
                        let sample = ResourceSample {
                            cpu_percent: process.cpu_usage(),
                            memory_mb: process.memory() as f64 / (1024.0 * 1024.0),
                        };
                        if self.record(sample) {
                            warn!(cpu_percent = sample.cpu_percent, memory_mb = sample.memory_mb, "profiler over resource budget, scaling sampling rates down");
                            sampler.scale_rates(OVER_BUDGET_RATE_SCALE);
                        }
                    } else {
                        debug!("profiler could not find own pid in process table");
                    }
                }
            }
        }
    }

    /// Records `sample` and returns whether this call is the one that newly
    /// tripped `over_budget` (false on every call after the first while it
    /// stays tripped, and on every call while under budget).
    fn record(&self, sample: ResourceSample) -> bool {
        {
            let mut ring = self.ring.lock().expect("profiler ring lock poisoned");
            if ring.len() >= RING_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(sample);
        }

        let over = sample.cpu_percent as f64 >= self.cpu_budget_pct
            || sample.memory_mb >= self.memory_budget_mb;
        let mut consecutive = self.consecutive_over.lock().expect("consecutive lock poisoned");
        if over {
            *consecutive += 1;
        } else {
            *consecutive = 0;
        }
        let was_over = self.over_budget.load(Ordering::Relaxed);
        let now_over = *consecutive >= self.required_consecutive;
        self.over_budget.store(now_over, Ordering::Relaxed);
        now_over && !was_over
    }

    pub fn is_over_budget(&self) -> bool {
        self.over_budget.load(Ordering::Relaxed)
    }

    pub fn get_summary(&self, window: usize) -> ProfilerSummary {
        let ring = self.ring.lock().expect("profiler ring lock poisoned");
        let samples: Vec<&ResourceSample> = ring.iter().rev().take(window.max(1)).collect();
        if samples.is_empty() {
            return ProfilerSummary {
                avg_cpu_percent: 0.0,
                avg_memory_mb: 0.0,
                max_cpu_percent: 0.0,
                sample_count: 0,
            };
        }
        let count = samples.len() as f32;
        let avg_cpu = samples.iter().map(|s| s.cpu_percent).sum::<f32>() / count;
        let avg_mem = samples.iter().map(|s| s.memory_mb).sum::<f64>() / samples.len() as f64;
        let max_cpu = samples.iter().map(|s| s.cpu_percent).fold(0.0f32, f32::max);
        ProfilerSummary {
            avg_cpu_percent: avg_cpu,
            avg_memory_mb: avg_mem,
            max_cpu_percent: max_cpu,
            sample_count: samples.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary_has_zero_samples() {
        let profiler = Profiler::new(80.0, 512);
        let summary = profiler.get_summary(10);
        assert_eq!(summary.sample_count, 0);
    }

    #[test]
    fn test_over_budget_requires_two_consecutive_samples() {
        let profiler = Profiler::new(10.0, 512);
        assert!(!profiler.record(ResourceSample { cpu_percent: 90.0, memory_mb: 50.0 }));
        assert!(!profiler.is_over_budget());
        assert!(profiler.record(ResourceSample { cpu_percent: 90.0, memory_mb: 50.0 }));
        assert!(profiler.is_over_budget());
    }

    #[test]
    fn test_under_budget_sample_resets_consecutive_counter() {
        let profiler = Profiler::new(10.0, 512);
        profiler.record(ResourceSample { cpu_percent: 90.0, memory_mb: 50.0 });
        profiler.record(ResourceSample { cpu_percent: 1.0, memory_mb: 50.0 });
        profiler.record(ResourceSample { cpu_percent: 90.0, memory_mb: 50.0 });
        assert!(!profiler.is_over_budget());
    }

    #[test]
    fn test_zero_cpu_budget_trips_over_budget_on_first_sample() {
        let profiler = Profiler::new(0.0, 512);
        assert!(profiler.record(ResourceSample { cpu_percent: 1.0, memory_mb: 50.0 }));
        assert!(profiler.is_over_budget());
    }

    #[test]
    fn test_record_only_reports_true_on_the_transition() {
        let profiler = Profiler::new(0.0, 512);
        assert!(profiler.record(ResourceSample { cpu_percent: 1.0, memory_mb: 50.0 }));
        assert!(!profiler.record(ResourceSample { cpu_percent: 1.0, memory_mb: 50.0 }));
    }

    #[test]
    fn test_summary_averages_the_requested_window() {
        let profiler = Profiler::new(80.0, 512);
        profiler.record(ResourceSample { cpu_percent: 10.0, memory_mb: 100.0 });
        profiler.record(ResourceSample { cpu_percent: 20.0, memory_mb: 100.0 });
        let summary = profiler.get_summary(2);
        assert_eq!(summary.sample_count, 2);
        assert!((summary.avg_cpu_percent - 15.0).abs() < 0.01);
    }
}
