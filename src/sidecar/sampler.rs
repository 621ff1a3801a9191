//! Probabilistic event admission. The hot path (`decide`) is lock-free:
//! base rates are fixed at construction and the adaptive boost deadline is
//! a single atomic, so a handler reporting an anomaly never blocks a
//! concurrent ingestion request.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::config::SampleRates;

const NANOS_PER_SEC: i64 = 1_000_000_000;

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// Per-dimension base rate plus a shared adaptive-boost deadline. One
/// `Sampler` instance covers all four dimensions (`events`, `traces`,
/// `profiling`, `test_events`); each has its own base rate but anomaly
/// boost is global, matching `report_anomaly`'s lack of a dimension
/// parameter in the spec.
pub struct Sampler {
    events_rate: AtomicU64,
    traces_rate: AtomicU64,
    profiling_rate: AtomicU64,
    test_events_rate: AtomicU64,
    boost_factor: AtomicU64,
    boost_until_nanos: AtomicI64,
    boost_duration_secs: u64,
    default_boost_factor: f64,
}

fn to_bits(rate: f64) -> u64 {
    rate.to_bits()
}

fn from_bits(bits: u64) -> f64 {
    f64::from_bits(bits)
}

impl Sampler {
    pub fn new(rates: &SampleRates, boost_duration_secs: u64, default_boost_factor: f64) -> Self {
        Self {
            events_rate: AtomicU64::new(to_bits(rates.events)),
            traces_rate: AtomicU64::new(to_bits(rates.traces)),
            profiling_rate: AtomicU64::new(to_bits(rates.profiling)),
            test_events_rate: AtomicU64::new(to_bits(rates.test_events)),
            boost_factor: AtomicU64::new(to_bits(1.0)),
            boost_until_nanos: AtomicI64::new(0),
            boost_duration_secs,
            default_boost_factor,
        }
    }

    fn rate_cell(&self, dimension: &str) -> &AtomicU64 {
        match dimension {
            "traces" => &self.traces_rate,
            "profiling" => &self.profiling_rate,
            "test_events" => &self.test_events_rate,
            _ => &self.events_rate,
        }
    }

    fn base_rate(&self, dimension: &str) -> f64 {
        from_bits(self.rate_cell(dimension).load(Ordering::Relaxed))
    }

    fn active_boost(&self) -> f64 {
        let deadline = self.boost_until_nanos.load(Ordering::Relaxed);
        if deadline > now_nanos() {
            from_bits(self.boost_factor.load(Ordering::Relaxed))
        } else {
            1.0
        }
    }

    /// Returns `true` with probability `base_rate(dimension) *
    /// active_boost_factor`, clipped to `1.0`. Entirely lock-free: two
    /// atomic loads plus an RNG draw.
    pub fn decide(&self, dimension: &str) -> bool {
        let rate = (self.base_rate(dimension) * self.active_boost()).min(1.0);
        if rate >= 1.0 {
            return true;
        }
        if rate <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_bool(rate)
    }

    /// Activates the adaptive boost for `boost_duration_secs` (default 60s).
    /// `kind` is accepted for parity with the spec's `report_anomaly(type,
    /// kind)` signature but does not currently vary the boost factor by
    /// anomaly kind.
    pub fn report_anomaly(&self, _event_type: &str, _kind: &str) {
        self.boost_factor
            .store(to_bits(self.default_boost_factor), Ordering::Relaxed);
        self.boost_until_nanos.store(
            now_nanos() + self.boost_duration_secs as i64 * NANOS_PER_SEC,
            Ordering::Relaxed,
        );
    }

    /// Scales every base rate to `fraction` of its currently configured
    /// value, used by the profiler's over-CPU-budget response (drops rates
    /// to 25%).
    pub fn scale_rates(&self, fraction: f64) {
        for cell in [&self.events_rate, &self.traces_rate, &self.profiling_rate, &self.test_events_rate] {
            let current = from_bits(cell.load(Ordering::Relaxed));
            cell.store(to_bits((current * fraction).clamp(0.0, 1.0)), Ordering::Relaxed);
        }
    }

    /// Atomically swaps in a freshly configured set of base rates, used by
    /// `reload_config`.
    pub fn reload_rates(&self, rates: &SampleRates) {
        self.events_rate.store(to_bits(rates.events), Ordering::Relaxed);
        self.traces_rate.store(to_bits(rates.traces), Ordering::Relaxed);
        self.profiling_rate.store(to_bits(rates.profiling), Ordering::Relaxed);
        self.test_events_rate.store(to_bits(rates.test_events), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_never_admits() {
        let sampler = Sampler::new(
            &SampleRates {
                events: 0.0,
                traces: 0.0,
                profiling: 0.0,
                test_events: 0.0,
            },
            60,
            5.0,
        );
        for _ in 0..100 {
            assert!(!sampler.decide("events"));
        }
    }

    #[test]
    fn test_rate_one_always_admits() {
        let sampler = Sampler::new(
            &SampleRates {
                events: 1.0,
                traces: 1.0,
                profiling: 1.0,
                test_events: 1.0,
            },
            60,
            5.0,
        );
        for _ in 0..100 {
            assert!(sampler.decide("events"));
        }
    }

    #[test]
    fn test_anomaly_boost_raises_effective_rate_above_one_and_clips() {
        let sampler = Sampler::new(
            &SampleRates {
                events: 0.5,
                traces: 0.05,
                profiling: 0.01,
                test_events: 0.2,
            },
            60,
            10.0,
        );
        sampler.report_anomaly("test_events", "spike");
        // rate * boost = 0.5 * 10 = 5.0, clipped to 1.0 -> always admits.
        for _ in 0..50 {
            assert!(sampler.decide("events"));
        }
    }

    #[test]
    fn test_scale_rates_halves_effective_probability_bounds() {
        let sampler = Sampler::new(
            &SampleRates {
                events: 1.0,
                traces: 1.0,
                profiling: 1.0,
                test_events: 1.0,
            },
            60,
            5.0,
        );
        sampler.scale_rates(0.25);
        assert!((sampler.base_rate("events") - 0.25).abs() < 1e-9);
    }
}
