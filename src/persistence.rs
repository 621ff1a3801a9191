//! Persistence façade: execution history, sidecar event batches, and health
//! reporting, backed by SQLite with a spool-directory fallback for outages.
//!
//! Grounded on `offload`'s `cache::ImageCache` (`examples/imbue-ai-offload/src/cache.rs`)
//! for the general shape of "durable local state behind a narrow trait",
//! though that cache stored Modal image IDs in a JSON file rather than
//! execution history in SQLite — the storage technology and schema are new,
//! the "a narrow trait in front of a concrete backend, with explicit health
//! reporting" posture is the teacher's.

pub mod spool;
pub mod sqlite;

use async_trait::async_trait;

use crate::model::{Classification, ExecutionPlan, ExecutionResult, HistoricalRun};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(String),
    #[error("spool io error: {0}")]
    Spool(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Health of the persistence backend, surfaced through the `/health` C7
/// aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceHealth {
    Healthy,
    Degraded,
    Unavailable,
}

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn save_execution(
        &self,
        plan: &ExecutionPlan,
        result: &ExecutionResult,
        classifications: &[Classification],
    ) -> Result<(), PersistenceError>;

    async fn load_history_slice(&self, limit: usize) -> Result<Vec<HistoricalRun>, PersistenceError>;

    async fn save_event_batch(&self, events: &[serde_json::Value]) -> Result<(), PersistenceError>;

    async fn cleanup(&self, older_than: chrono::Duration) -> Result<usize, PersistenceError>;

    async fn health(&self) -> PersistenceHealth;
}
