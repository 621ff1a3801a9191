//! Error types shared across the orchestration and sidecar subsystems.
//!
//! Library code returns these typed errors; the CLI layer (`main.rs`) wraps
//! them in `anyhow::Result` with `.context(...)` the way `offload`'s CLI does.

use std::path::PathBuf;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<serde_yaml::Error>,
    },

    #[error("invalid value for '{field}': {message}")]
    Invalid { field: String, message: String },

    #[error("unknown configuration key: '{0}'")]
    UnknownKey(String),

    #[error("environment variable error: {0}")]
    Env(String),
}

/// Errors raised while assembling an `ExecutionPlan` or running it.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("no framework adapter registered for tag '{0}'")]
    UnknownFramework(String),

    #[error("no strategy registered for tag '{0}'")]
    UnknownStrategy(String),

    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("persistence error: {0}")]
    Persistence(#[from] crate::persistence::PersistenceError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Errors raised by framework adapters (discovery, command synthesis, parsing).
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("test discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("failed to parse test report: {0}")]
    ParseFailed(String),

    #[error("failed to spawn test process: {0}")]
    SpawnFailed(String),

    #[error("test process timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Errors internal to the sidecar runtime. Per the design invariant that a
/// sidecar outage must never fail an orchestrator run, callers on the
/// orchestrator side treat every variant of this type as fail-open: log and
/// continue. The type still exists so the sidecar's own code can reason
/// about failure modes precisely.
#[derive(Debug, thiserror::Error)]
pub enum SidecarError {
    #[error("queue is draining, rejecting new events")]
    Draining,

    #[error("malformed event payload: {0}")]
    MalformedEvent(String),

    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A cancellation signal reached an in-flight run or test batch.
#[derive(Debug, thiserror::Error)]
#[error("execution cancelled: {reason}")]
pub struct Cancellation {
    pub reason: String,
}

/// Top-level kinds used for CLI exit-code mapping.
///
/// `0` success, `1` test failures, `2` execution error, `3` config error.
/// Sidecar errors never surface here: they are swallowed at the sidecar
/// boundary and never become a CLI-visible error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Success,
    TestFailures,
    ExecutionError,
    ConfigError,
}

impl ExitKind {
    pub fn code(self) -> i32 {
        match self {
            ExitKind::Success => 0,
            ExitKind::TestFailures => 1,
            ExitKind::ExecutionError => 2,
            ExitKind::ConfigError => 3,
        }
    }
}
