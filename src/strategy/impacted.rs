//! Impacted strategy: unions three sources — coverage hits on changed
//! files, semantic neighbors via embedding cosine similarity, and an
//! always-in critical-tag safety net — falling back to the smoke strategy
//! when too few tests would run to be a meaningful signal.

use std::collections::HashMap;

use crate::config::StrategyConfig;
use crate::model::{ExecutionContext, ExecutionPlan, ExecutionRequest, SelectedTest, TestCase};

use super::smoke::SmokeStrategy;
use super::{stable_sort, Strategy};

pub struct ImpactedStrategy;

impl Strategy for ImpactedStrategy {
    fn tag(&self) -> &'static str {
        "impacted"
    }

    fn select(
        &self,
        request: &ExecutionRequest,
        context: &ExecutionContext,
        config: &StrategyConfig,
    ) -> ExecutionPlan {
        // Lower priority number wins when a test qualifies through more
        // than one source: critical safety net (1) > coverage hit (2) >
        // semantic neighbor (3).
        let mut picked: HashMap<&str, SelectedTest> = HashMap::new();

        for test in &context.discovered {
            if let Some(file) = coverage_hit_file(context, test) {
                picked.insert(test.id.as_str(), SelectedTest {
                    test: test.clone(),
                    priority: 2,
                    reason: format!("covers:{file}"),
                });
            }
        }

        for (test, file, score) in semantic_neighbors(context, config.similarity_threshold) {
            picked
                .entry(test.id.as_str())
                .and_modify(|existing| {
                    if existing.priority > 3 {
                        existing.priority = 3;
                        existing.reason = format!("semantic:{file}:{score:.2}");
                    }
                })
                .or_insert_with(|| SelectedTest {
                    test: test.clone(),
                    priority: 3,
                    reason: format!("semantic:{file}:{score:.2}"),
                });
        }

        for test in &context.discovered {
            if test.tags.iter().any(|tag| config.critical_tags.contains(tag)) {
                picked.insert(test.id.as_str(), SelectedTest {
                    test: test.clone(),
                    priority: 1,
                    reason: "critical-safety-net".to_string(),
                });
            }
        }

        let mut selected: Vec<SelectedTest> = picked.into_values().collect();
        selected.truncate_or_keep(config.max_tests);

        if selected.len() < config.min_tests {
            let mut fallback = SmokeStrategy.select(request, context, config);
            fallback.strategy = self.tag().to_string();
            fallback.fallback_reason = Some("impacted<min".to_string());
            return fallback;
        }

        let mut plan = ExecutionPlan {
            run_id: request.run_id.clone(),
            strategy: self.tag().to_string(),
            selected,
            fallback_reason: None,
            dry_run: request.dry_run,
            timeout_override_secs: request.max_duration_minutes.map(|m| m * 60),
            parallel: request.parallel,
            metadata: request.metadata.clone(),
        };
        stable_sort(&mut plan);
        plan
    }
}

/// Helper trait so the truncation reads as "keep at most N" without
/// confusing a truncate-by-priority call with `Vec::truncate`'s
/// keep-the-first-N-as-inserted semantics; selection order here is
/// unsorted, so we sort by priority first.
trait TruncateByPriority {
    fn truncate_or_keep(&mut self, max: usize);
}

impl TruncateByPriority for Vec<SelectedTest> {
    fn truncate_or_keep(&mut self, max: usize) {
        if self.len() <= max {
            return;
        }
        self.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.test.id.cmp(&b.test.id)));
        self.truncate(max);
    }
}

fn coverage_hit_file(context: &ExecutionContext, test: &TestCase) -> Option<String> {
    context
        .changed_files
        .iter()
        .find(|file| context.coverage_map.get(file.as_str()).is_some_and(|tests| tests.contains(&test.id)))
        .cloned()
}

/// Finds, for every discovered test whose file has an embedding, the
/// changed file it is most similar to, when that similarity clears
/// `threshold`. Returns an empty set whenever no embeddings were computed
/// for this context, which is the common case since embedding computation
/// is itself best-effort context assembly.
fn semantic_neighbors<'a>(
    context: &'a ExecutionContext,
    threshold: f64,
) -> Vec<(&'a TestCase, &'a str, f64)> {
    if context.embeddings.is_empty() {
        return Vec::new();
    }

    let changed_vectors: Vec<(&str, &Vec<f32>)> = context
        .changed_files
        .iter()
        .filter_map(|f| context.embeddings.get(f).map(|v| (f.as_str(), v)))
        .collect();
    if changed_vectors.is_empty() {
        return Vec::new();
    }

    let mut neighbors = Vec::new();
    for test in &context.discovered {
        let Some(file) = &test.file else { continue };
        let Some(vector) = context.embeddings.get(file) else { continue };
        if let Some((changed_file, score)) = changed_vectors
            .iter()
            .map(|(f, v)| (*f, cosine_similarity(v, vector)))
            .filter(|(_, score)| *score >= threshold)
            .fold(None, |best: Option<(&str, f64)>, (f, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((f, score)),
            })
        {
            neighbors.push((test, changed_file, score));
        }
    }
    neighbors
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestCase;
    use std::collections::HashMap;

    fn request() -> ExecutionRequest {
        ExecutionRequest {
            run_id: "r1".into(),
            strategy: "impacted".into(),
            base_branch: "main".into(),
            frameworks: vec![],
            dry_run: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_falls_back_to_smoke_below_min_tests() {
        // spec.md §8 scenario 2: empty changeset, empty coverage -> fallback.
        let context = ExecutionContext {
            discovered: vec![
                TestCase::new("t1", "pytest"),
                TestCase::new("t2", "pytest"),
                TestCase::new("t3", "pytest"),
            ],
            ..Default::default()
        };
        let config = StrategyConfig {
            min_tests: 5,
            ..Default::default()
        };
        let plan = ImpactedStrategy.select(&request(), &context, &config);
        assert_eq!(plan.fallback_reason.as_deref(), Some("impacted<min"));
        // Smoke's own fallback still kicks in (no smoke-tagged and no
        // critical-tagged tests, so it ranks the whole discovered set).
        assert_eq!(plan.selected.len(), 3);
        assert!(plan.selected.iter().all(|s| s.reason == "critical-fallback"));
    }

    #[test]
    fn test_selects_coverage_hit_tests_with_file_in_reason() {
        let mut coverage_map = HashMap::new();
        coverage_map.insert("src/lib.rs".to_string(), vec!["t1".to_string(), "t2".to_string()]);
        let context = ExecutionContext {
            discovered: (1..=6)
                .map(|i| TestCase::new(format!("t{i}"), "pytest"))
                .collect(),
            changed_files: vec!["src/lib.rs".into()],
            coverage_map,
            ..Default::default()
        };
        let config = StrategyConfig {
            min_tests: 1,
            ..Default::default()
        };
        let plan = ImpactedStrategy.select(&request(), &context, &config);
        assert!(plan.fallback_reason.is_none());
        assert_eq!(plan.selected.len(), 2);
        assert!(plan.selected.iter().all(|s| s.priority == 2 && s.reason == "covers:src/lib.rs"));
    }

    #[test]
    fn test_critical_safety_net_always_included() {
        let context = ExecutionContext {
            discovered: vec![
                TestCase::new("t1", "pytest").with_tags(vec!["critical".into()]),
                TestCase::new("t2", "pytest"),
                TestCase::new("t3", "pytest"),
                TestCase::new("t4", "pytest"),
                TestCase::new("t5", "pytest"),
            ],
            changed_files: vec![],
            ..Default::default()
        };
        let config = StrategyConfig {
            min_tests: 1,
            critical_tags: vec!["critical".into()],
            ..Default::default()
        };
        let plan = ImpactedStrategy.select(&request(), &context, &config);
        assert!(plan.fallback_reason.is_none());
        assert_eq!(plan.selected.len(), 1);
        assert_eq!(plan.selected[0].test.id, "t1");
        assert_eq!(plan.selected[0].priority, 1);
        assert_eq!(plan.selected[0].reason, "critical-safety-net");
    }

    #[test]
    fn test_critical_safety_net_outranks_coverage_hit_priority() {
        let mut coverage_map = HashMap::new();
        coverage_map.insert("src/lib.rs".to_string(), vec!["t1".to_string()]);
        let context = ExecutionContext {
            discovered: vec![TestCase::new("t1", "pytest").with_tags(vec!["critical".into()])],
            changed_files: vec!["src/lib.rs".into()],
            coverage_map,
            ..Default::default()
        };
        let config = StrategyConfig {
            min_tests: 1,
            critical_tags: vec!["critical".into()],
            ..Default::default()
        };
        let plan = ImpactedStrategy.select(&request(), &context, &config);
        assert_eq!(plan.selected[0].priority, 1);
        assert_eq!(plan.selected[0].reason, "critical-safety-net");
    }
}
