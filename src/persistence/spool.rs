//! On-disk spool directory used as a write buffer when SQLite is
//! unreachable. Each spooled payload is written as its own JSON file named
//! by a monotonic counter; `drain` reads and removes every spooled file in
//! write order so a later reconnect replays history faithfully.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::persistence::PersistenceError;

pub struct SpoolWriter {
    dir: PathBuf,
    counter: AtomicU64,
}

impl SpoolWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            counter: AtomicU64::new(0),
        }
    }

    pub fn write(&self, payload: &serde_json::Value) -> Result<(), PersistenceError> {
        std::fs::create_dir_all(&self.dir)?;
        let seq = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("{:020}-{}.json", now_nanos(), seq));
        std::fs::write(path, serde_json::to_vec(payload)?)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.len().unwrap_or(0) == 0
    }

    pub fn len(&self) -> std::io::Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }
        Ok(std::fs::read_dir(&self.dir)?.count())
    }

    /// Reads and deletes every spooled payload, in filename (write) order.
    pub fn drain(&self) -> Result<Vec<serde_json::Value>, PersistenceError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        paths.sort();

        let mut payloads = Vec::new();
        for path in paths {
            let raw = std::fs::read(&path)?;
            payloads.push(serde_json::from_slice(&raw)?);
            std::fs::remove_file(&path)?;
        }
        Ok(payloads)
    }
}

fn now_nanos() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_drain_round_trips_payload() {
        let dir = tempfile::tempdir().unwrap();
        let spool = SpoolWriter::new(dir.path().to_path_buf());
        spool.write(&serde_json::json!({"run_id": "r1"})).unwrap();
        spool.write(&serde_json::json!({"run_id": "r2"})).unwrap();

        let drained = spool.drain().unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0]["run_id"], "r1");
        assert!(spool.is_empty());
    }
}
