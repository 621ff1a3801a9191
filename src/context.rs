//! Assembles the `ExecutionContext` a strategy reasons over: discovered
//! tests, the changeset against the base branch, recent history, a coverage
//! map and a flaky-score cache.
//!
//! Every step here is best-effort. None of offload's framework discovery
//! ever had to tolerate a missing git repository or an absent coverage
//! report, but this crate's strategies do: a failed step logs a warning and
//! falls back to an empty default rather than failing the whole plan.

use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

use crate::adapter::AdapterRegistry;
use crate::config::Config;
use crate::model::{ExecutionContext, ExecutionRequest, HistoricalRun, TestCase};
use crate::persistence::Persistence;

pub struct ContextAssembler<'a> {
    config: &'a Config,
    adapters: &'a AdapterRegistry,
    persistence: &'a dyn Persistence,
}

impl<'a> ContextAssembler<'a> {
    pub fn new(config: &'a Config, adapters: &'a AdapterRegistry, persistence: &'a dyn Persistence) -> Self {
        Self {
            config,
            adapters,
            persistence,
        }
    }

    pub async fn assemble(&self, request: &ExecutionRequest) -> ExecutionContext {
        let discovered = self.discover_tests(request).await;
        let changed_files = self.changed_files(&request.base_branch);
        let history = self.load_history().await;
        let coverage_map = self.load_coverage_map();
        let flaky_cache = self.load_flaky_cache();
        let embeddings = self.load_embeddings();

        ExecutionContext {
            discovered,
            changed_files,
            history,
            coverage_map,
            flaky_cache,
            embeddings,
        }
    }

    /// Reads the most recent execution history via the persistence façade.
    /// Falls back to an empty slice (per-test defaults downstream: 0 runs,
    /// 0% failure, no signature) when the backend is unavailable, never
    /// propagating the failure into plan assembly.
    async fn load_history(&self) -> Vec<HistoricalRun> {
        match self
            .persistence
            .load_history_slice(self.config.persistence.history_slice_limit)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, "failed to load execution history, treating as empty");
                Vec::new()
            }
        }
    }

    /// Reads the coverage cache (`cache/coverage.json` under the
    /// configured cache directory), a `file -> test-ids` JSON map produced
    /// out-of-band by a framework's coverage collector. Falls back to an
    /// empty map when absent or unparseable.
    fn load_coverage_map(&self) -> HashMap<String, Vec<String>> {
        let path = self.config.persistence.cache_dir.join("coverage.json");
        read_json_map(&path).unwrap_or_default()
    }

    /// Reads the flaky-test cache (`cache/flaky.json`), a `test-id ->
    /// flaky-score` JSON map refreshed within its TTL by whatever process
    /// maintains flaky history (out of scope for this crate). Falls back to
    /// an empty map when absent, stale parsing is not attempted here.
    fn load_flaky_cache(&self) -> HashMap<String, f64> {
        let path = self.config.persistence.cache_dir.join("flaky.json");
        read_json_map(&path).unwrap_or_default()
    }

    /// Reads the memory embedding cache (`cache/embeddings.json`), a
    /// `file-path -> vector` JSON map maintained out-of-band, feeding the
    /// impacted strategy's semantic-neighbor source. Falls back to an empty
    /// map when absent, which `semantic_neighbors` treats as "no embeddings
    /// computed", not an error.
    fn load_embeddings(&self) -> HashMap<String, Vec<f32>> {
        let path = self.config.persistence.cache_dir.join("embeddings.json");
        read_json_map(&path).unwrap_or_default()
    }

    async fn discover_tests(&self, request: &ExecutionRequest) -> Vec<TestCase> {
        let tags: Vec<&str> = if request.frameworks.is_empty() {
            self.config.frameworks.keys().map(String::as_str).collect()
        } else {
            request.frameworks.iter().map(String::as_str).collect()
        };

        let mut discovered = Vec::new();
        for tag in tags {
            let Some(adapter) = self.adapters.get(tag) else {
                warn!(framework = tag, "no adapter registered, skipping discovery");
                continue;
            };
            match adapter.discover().await {
                Ok(mut tests) => discovered.append(&mut tests),
                Err(e) => warn!(framework = tag, error = %e, "discovery failed, skipping framework"),
            }
        }
        discovered
    }

    /// Walks the git history between `HEAD` and `base_branch` for changed
    /// file paths. Falls back to an empty changeset (treated by the
    /// impacted strategy as "nothing impacted, fall back to smoke") when the
    /// workspace is not a git repository, has no such branch, or the diff
    /// otherwise cannot be computed.
    fn changed_files(&self, base_branch: &str) -> Vec<String> {
        let workspace = self
            .config
            .orchestrator
            .workspace
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

        match diff_against_branch(&workspace, base_branch) {
            Ok(files) => files,
            Err(e) => {
                warn!(base_branch, error = %e, "failed to compute changeset, treating as empty");
                Vec::new()
            }
        }
    }
}

fn diff_against_branch(workspace: &Path, base_branch: &str) -> Result<Vec<String>, git2::Error> {
    let repo = git2::Repository::discover(workspace)?;
    let head = repo.head()?.peel_to_tree()?;

    let base_ref = repo
        .find_branch(base_branch, git2::BranchType::Local)
        .or_else(|_| repo.find_branch(&format!("origin/{base_branch}"), git2::BranchType::Remote))?;
    let base_tree = base_ref.get().peel_to_tree()?;

    let diff = repo.diff_tree_to_tree(Some(&base_tree), Some(&head), None)?;

    let mut files = Vec::new();
    diff.foreach(
        &mut |delta, _| {
            if let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) {
                files.push(path.to_string_lossy().into_owned());
            }
            true
        },
        None,
        None,
        None,
    )?;
    files.sort();
    files.dedup();
    Ok(files)
}

fn read_json_map<V: serde::de::DeserializeOwned>(path: &Path) -> Option<HashMap<String, V>> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(map) => Some(map),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to parse cache file, treating as empty");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterRegistry;
    use crate::config::Config;
    use crate::persistence::sqlite::SqlitePersistence;

    #[tokio::test]
    async fn test_assemble_loads_embeddings_and_coverage_caches() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let cache_dir = dir.path().join("cache");
        std::fs::create_dir_all(&cache_dir).expect("mkdir cache");
        std::fs::write(
            cache_dir.join("embeddings.json"),
            r#"{"src/lib.rs": [0.1, 0.2, 0.3]}"#,
        )
        .expect("write embeddings cache");
        std::fs::write(
            cache_dir.join("coverage.json"),
            r#"{"src/lib.rs": ["test_a"]}"#,
        )
        .expect("write coverage cache");

        let mut config = Config::default();
        config.persistence.cache_dir = cache_dir;

        let adapters = AdapterRegistry::new();
        let persistence = SqlitePersistence::open(&dir.path().join("test.db"), &dir.path().join("spool"))
            .expect("open sqlite persistence");

        let assembler = ContextAssembler::new(&config, &adapters, &persistence);
        let request = crate::model::ExecutionRequest {
            run_id: "r1".into(),
            strategy: "full".into(),
            base_branch: "main".into(),
            ..Default::default()
        };
        let context = assembler.assemble(&request).await;

        assert_eq!(context.embeddings.get("src/lib.rs"), Some(&vec![0.1, 0.2, 0.3]));
        assert_eq!(context.coverage_map.get("src/lib.rs"), Some(&vec!["test_a".to_string()]));
    }

    #[test]
    fn test_missing_embeddings_cache_yields_empty_map() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("missing.json");
        let result: Option<HashMap<String, Vec<f32>>> = read_json_map(&path);
        assert!(result.is_none());
    }
}
