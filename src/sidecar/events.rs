//! Wire shapes for the sidecar's HTTP ingestion surface: the event taxonomy
//! in-test listeners POST, and the envelopes `/events`, `/events/batch` and
//! `/parse/<framework>` accept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// The lifecycle event taxonomy a listener may emit. `#[serde(other)]` is
/// deliberately not used here: an unrecognized `event_type` is a malformed
/// payload (`400`), not a silently-accepted unknown variant, since sampling
/// and handler dispatch both key off this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStart,
    RunEnd,
    TestStart,
    TestEnd,
    StepStart,
    StepEnd,
    SuiteStart,
    SuiteEnd,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::RunStart => "run_start",
            EventType::RunEnd => "run_end",
            EventType::TestStart => "test_start",
            EventType::TestEnd => "test_end",
            EventType::StepStart => "step_start",
            EventType::StepEnd => "step_end",
            EventType::SuiteStart => "suite_start",
            EventType::SuiteEnd => "suite_end",
        }
    }

    /// The sampler dimension this event type counts against. `events` is the
    /// catch-all bucket for run/suite boundaries; step events are `traces`,
    /// test start/end is `test_events`.
    pub fn sample_dimension(self) -> &'static str {
        match self {
            EventType::RunStart | EventType::RunEnd | EventType::SuiteStart | EventType::SuiteEnd => "events",
            EventType::StepStart | EventType::StepEnd => "traces",
            EventType::TestStart | EventType::TestEnd => "test_events",
        }
    }
}

/// A single event as POSTed by an in-test listener, before the sidecar
/// assigns it a `receive_sequence`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingEvent {
    pub event_type: EventType,
    pub framework: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub run_id: Option<String>,
    pub test_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub events: Vec<IncomingEvent>,
}

/// An event as it exists inside the sidecar: the incoming payload plus a
/// monotonic `receive_sequence`, assigned once at ingestion and never
/// mutated afterward (`ObservedEvent` in the data model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedEvent {
    pub event_type: EventType,
    pub framework: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub run_id: Option<String>,
    pub test_id: Option<String>,
    pub receive_sequence: u64,
}

/// Monotonic sequence generator; ordering is only guaranteed within a
/// single sidecar process's lifetime, which matches the spec's "ordering is
/// unspecified across runs" invariant.
pub struct SequenceAllocator(AtomicU64);

impl SequenceAllocator {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IncomingEvent {
    pub fn into_observed(self, sequence: u64) -> ObservedEvent {
        ObservedEvent {
            event_type: self.event_type,
            framework: self.framework,
            data: self.data,
            timestamp: self.timestamp,
            run_id: self.run_id,
            test_id: self.test_id,
            receive_sequence: sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trips_through_json() {
        let json = r#""test_end""#;
        let parsed: EventType = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, EventType::TestEnd);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), json);
    }

    #[test]
    fn test_sequence_allocator_is_monotonic() {
        let alloc = SequenceAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        assert!(b > a);
    }
}
