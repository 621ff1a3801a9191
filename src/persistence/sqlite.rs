//! SQLite-backed `Persistence` implementation. `rusqlite::Connection` is
//! blocking and `!Sync`, so every access is funneled through
//! `tokio::task::spawn_blocking` behind a `std::sync::Mutex`, the same
//! pattern `offload`'s `cache::ImageCache` uses for its JSON-file-backed
//! cache (`examples/imbue-ai-offload/src/cache.rs`) — serialize access to a
//! shared local file behind a narrow async-friendly API.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::warn;

use crate::model::{Classification, ExecutionPlan, ExecutionResult, HistoricalRun};

use super::spool::SpoolWriter;
use super::{Persistence, PersistenceError, PersistenceHealth};

pub struct SqlitePersistence {
    conn: Arc<Mutex<Connection>>,
    spool: SpoolWriter,
}

impl SqlitePersistence {
    pub fn open(db_path: &Path, spool_dir: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path).map_err(|e| PersistenceError::Database(e.to_string()))?;
        init_schema(&conn)?;

        let persistence = Self {
            conn: Arc::new(Mutex::new(conn)),
            spool: SpoolWriter::new(spool_dir.to_path_buf()),
        };
        Ok(persistence)
    }

    /// Replays every spooled execution/event batch written while the
    /// database was unavailable. Called once at startup and whenever a
    /// write succeeds after a prior failure. Spooled entries come in two
    /// shapes — an execution payload (`run_id` at top level) or an event
    /// batch (`{"events": [...]}`) — and are routed back to the table each
    /// came from.
    pub async fn replay_spool(&self) -> Result<usize, PersistenceError> {
        let entries = self.spool.drain()?;
        let count = entries.len();
        for entry in entries {
            match entry.get("events") {
                Some(events) => {
                    let events: Vec<serde_json::Value> = serde_json::from_value(events.clone())?;
                    self.write_raw_events(&events).await?;
                }
                None => self.write_raw_execution(&entry).await?,
            }
        }
        Ok(count)
    }

    async fn write_raw_events(&self, events: &[serde_json::Value]) -> Result<(), PersistenceError> {
        let conn = self.conn.clone();
        let events = events.to_vec();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("sqlite connection mutex poisoned");
            for event in events {
                conn.execute(
                    "INSERT INTO events (recorded_at, payload) VALUES (?1, ?2)",
                    rusqlite::params![chrono::Utc::now().to_rfc3339(), event.to_string()],
                )
                .map_err(|e| PersistenceError::Database(e.to_string()))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| PersistenceError::Database(e.to_string()))?
    }

    async fn write_raw_execution(&self, payload: &serde_json::Value) -> Result<(), PersistenceError> {
        let conn = self.conn.clone();
        let payload = payload.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("sqlite connection mutex poisoned");
            conn.execute(
                "INSERT INTO executions (run_id, recorded_at, payload) VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    payload["run_id"].as_str().unwrap_or_default(),
                    chrono::Utc::now().to_rfc3339(),
                    payload.to_string(),
                ],
            )
            .map_err(|e| PersistenceError::Database(e.to_string()))
        })
        .await
        .map_err(|e| PersistenceError::Database(e.to_string()))??;
        Ok(())
    }
}

fn init_schema(conn: &Connection) -> Result<(), PersistenceError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS executions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            payload TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recorded_at TEXT NOT NULL,
            payload TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_executions_recorded_at ON executions(recorded_at);",
    )
    .map_err(|e| PersistenceError::Database(e.to_string()))
}

#[async_trait]
impl Persistence for SqlitePersistence {
    async fn save_execution(
        &self,
        plan: &ExecutionPlan,
        result: &ExecutionResult,
        classifications: &[Classification],
    ) -> Result<(), PersistenceError> {
        let payload = serde_json::json!({
            "run_id": result.run_id,
            "strategy": plan.strategy,
            "status": result.status,
            "results": result.results,
            "classifications": classifications,
        });

        match self.write_raw_execution(&payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(run_id = %result.run_id, error = %e, "sqlite write failed, spooling to disk");
                self.spool.write(&payload)?;
                Ok(())
            }
        }
    }

    async fn load_history_slice(&self, limit: usize) -> Result<Vec<HistoricalRun>, PersistenceError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("sqlite connection mutex poisoned");
            let mut stmt = conn
                .prepare(
                    "SELECT run_id, recorded_at, payload FROM executions ORDER BY id DESC LIMIT ?1",
                )
                .map_err(|e| PersistenceError::Database(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![limit as i64], |row| {
                    let run_id: String = row.get(0)?;
                    let recorded_at: String = row.get(1)?;
                    let payload: String = row.get(2)?;
                    Ok((run_id, recorded_at, payload))
                })
                .map_err(|e| PersistenceError::Database(e.to_string()))?;

            let mut history = Vec::new();
            for row in rows {
                let (run_id, recorded_at, payload) =
                    row.map_err(|e| PersistenceError::Database(e.to_string()))?;
                let value: serde_json::Value = serde_json::from_str(&payload)?;
                let results = serde_json::from_value(value["results"].clone()).unwrap_or_default();
                let timestamp = chrono::DateTime::parse_from_rfc3339(&recorded_at)
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                    .unwrap_or_else(|_| chrono::Utc::now());
                history.push(HistoricalRun {
                    run_id,
                    timestamp,
                    results,
                });
            }
            Ok(history)
        })
        .await
        .map_err(|e| PersistenceError::Database(e.to_string()))?
    }

    async fn save_event_batch(&self, events: &[serde_json::Value]) -> Result<(), PersistenceError> {
        match self.write_raw_events(events).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "sqlite event batch write failed, spooling to disk");
                self.spool.write(&serde_json::json!({ "events": events }))?;
                Ok(())
            }
        }
    }

    async fn cleanup(&self, older_than: chrono::Duration) -> Result<usize, PersistenceError> {
        let cutoff = (chrono::Utc::now() - older_than).to_rfc3339();
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("sqlite connection mutex poisoned");
            let deleted = conn
                .execute("DELETE FROM events WHERE recorded_at < ?1", rusqlite::params![cutoff])
                .map_err(|e| PersistenceError::Database(e.to_string()))?;
            Ok(deleted)
        })
        .await
        .map_err(|e| PersistenceError::Database(e.to_string()))?
    }

    async fn health(&self) -> PersistenceHealth {
        let conn = self.conn.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("sqlite connection mutex poisoned");
            conn.execute_batch("SELECT 1")
        })
        .await;

        match result {
            Ok(Ok(())) if self.spool.is_empty() => PersistenceHealth::Healthy,
            Ok(Ok(())) => PersistenceHealth::Degraded,
            _ => PersistenceHealth::Unavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExecutionPlan, ExecutionResult, RunStatus};

    fn persistence() -> (SqlitePersistence, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let persistence = SqlitePersistence::open(&dir.path().join("test.db"), &dir.path().join("spool"))
            .expect("open sqlite persistence");
        (persistence, dir)
    }

    #[tokio::test]
    async fn test_save_then_load_history_round_trips() {
        let (persistence, _dir) = persistence();
        let plan = ExecutionPlan::empty("r1", "smoke");
        let result = ExecutionResult {
            run_id: "r1".into(),
            status: RunStatus::Passed,
            results: Vec::new(),
            duration: std::time::Duration::from_secs(1),
        };
        persistence.save_execution(&plan, &result, &[]).await.expect("save");

        let history = persistence.load_history_slice(10).await.expect("load");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].run_id, "r1");
    }

    #[tokio::test]
    async fn test_spooled_event_batch_replays_into_events_table() {
        let (persistence, _dir) = persistence();
        persistence
            .spool
            .write(&serde_json::json!({ "events": [{"event_type": "test_end"}] }))
            .expect("write spool entry");

        let replayed = persistence.replay_spool().await.expect("replay");
        assert_eq!(replayed, 1);
        assert!(persistence.spool.is_empty());
    }

    #[tokio::test]
    async fn test_spooled_execution_replays_into_executions_table() {
        let (persistence, _dir) = persistence();
        persistence
            .spool
            .write(&serde_json::json!({ "run_id": "r2", "strategy": "full", "status": "passed", "results": [] }))
            .expect("write spool entry");

        let replayed = persistence.replay_spool().await.expect("replay");
        assert_eq!(replayed, 1);
        let history = persistence.load_history_slice(10).await.expect("load");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].run_id, "r2");
    }
}
