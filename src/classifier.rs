//! Failure classification: deterministic rule matching, history-derived
//! categories, and optional strictly-bounded AI enrichment.
//!
//! Grounded on `offload`'s `framework::TestRecord`/`TestResult` shapes for
//! what a classifier reads (error_signature, stdout/stderr tails), but the
//! classification logic itself has no teacher counterpart — `offload` never
//! categorizes failures, it only reports pass/fail. Built fresh in the
//! teacher's idiom: typed config, `tracing` on every decision path, and the
//! same "never hard-fail the caller" posture `report.rs` takes for output.

pub mod ai;
pub mod history;
pub mod rules;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::model::{Category, Classification, CodeReference, ExecutionContext, TestOutcome, TestRunResult};
use ai::{AiEnricher, HttpAiEnricher, NullEnricher};
use rules::{Rule, RuleSet};

pub struct Classifier {
    rules: RuleSet,
    ai_enrichment_enabled: bool,
    ai_confidence_delta_max: f64,
    enricher: Arc<dyn AiEnricher>,
}

impl Classifier {
    /// Loads rules from `rules_path`. A missing file falls back to the
    /// bundled default ruleset (shipped via `RuleSet::defaults()`), since a
    /// fresh install with no `crossbridge-rules.yml` on disk should still
    /// classify the taxonomy's well-known patterns rather than return
    /// `UNKNOWN` for everything. An unparseable file at a path that does
    /// exist is a configuration mistake, not an absence, so that case falls
    /// back to an empty ruleset instead and is logged at `warn`.
    pub fn load(config: &crate::config::ClassifierConfig) -> Self {
        let rules = match rules::load_rules(&config.rules_path) {
            Ok(rules) => rules,
            Err(crate::error::ConfigError::Read { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %config.rules_path.display(), "no classifier rules file found, using bundled defaults");
                RuleSet::defaults()
            }
            Err(e) => {
                warn!(path = %config.rules_path.display(), error = %e, "failed to load classifier rules, classification will rely on history categories and UNKNOWN");
                RuleSet::empty()
            }
        };

        let enricher: Arc<dyn AiEnricher> = match (&config.ai_provider_url, config.ai_enrichment_enabled) {
            (Some(url), true) => Arc::new(HttpAiEnricher::new(
                url.clone(),
                Duration::from_secs(config.ai_timeout_secs),
            )),
            _ => Arc::new(NullEnricher),
        };

        Self {
            rules,
            ai_enrichment_enabled: config.ai_enrichment_enabled,
            ai_confidence_delta_max: config.ai_confidence_delta_max,
            enricher,
        }
    }

    /// The loaded rule set, for `rules list`/`rules validate`-style CLI
    /// introspection.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    #[cfg(test)]
    fn with_rules(rules: RuleSet) -> Self {
        Self {
            rules,
            ai_enrichment_enabled: false,
            ai_confidence_delta_max: 0.1,
            enricher: Arc::new(NullEnricher),
        }
    }

    /// Classifies every non-passing result, plus two kinds of passing result
    /// the history layer still has something to say about: a pass reached
    /// only after a retry (`FLAKY`) and a pass on a test stable enough to
    /// earn `STABLE`. Plain single-try passes with no stability history
    /// are not classified at all, keeping the output proportional to what's
    /// actually noteworthy.
    ///
    /// `context` supplies the history this module's `FLAKY`/`REGRESSION`/
    /// `NEW`/`STABLE` categories read; callers with no context available
    /// (e.g. the `analyze logs` CLI path, which has no orchestrator run to
    /// draw history from) should pass `ExecutionContext::default()`, which
    /// degrades every history check to its "no signal" branch.
    pub async fn classify_results(
        &self,
        results: &[TestRunResult],
        context: &ExecutionContext,
    ) -> Vec<Classification> {
        let mut classifications = Vec::new();
        for result in results {
            if result.outcome.is_success() {
                if result.retry_count >= 1 {
                    classifications.push(self.classify_one(result, context).await);
                } else if let Some(classification) = classify_stable(result, context) {
                    classifications.push(classification);
                }
            } else {
                classifications.push(self.classify_one(result, context).await);
            }
        }
        classifications
    }

    async fn classify_one(&self, result: &TestRunResult, context: &ExecutionContext) -> Classification {
        let signature = result.error_signature.as_deref().unwrap_or_default();
        let body = format!("{signature}\n{}\n{}", result.stdout_tail, result.stderr_tail);

        let matched = self.rules.first_match(&body);
        let (category, confidence, matched_rule, evidence) = match matched {
            Some(rule) => (
                rule.category,
                adjusted_confidence(rule, &body),
                Some(rule.name.clone()),
                rule.matched_evidence(&body),
            ),
            None => match history::classify_from_history(context, result) {
                Some((category, confidence)) => (category, confidence, None, Vec::new()),
                None => (fallback_category(result), 0.3, None, Vec::new()),
            },
        };

        let code_reference = matched.and_then(|rule| resolve_code_reference(rule, &body));

        debug!(
            test_id = %result.test_id,
            category = category.as_str(),
            confidence,
            rule = ?matched_rule,
            "classified failure"
        );

        let mut classification = Classification {
            test_id: result.test_id.clone(),
            category,
            confidence,
            matched_rule,
            evidence,
            code_reference,
            ai_enrichment: None,
            ai_enhanced: false,
        };

        if self.ai_enrichment_enabled {
            self.apply_ai_enrichment(&mut classification, &body).await;
        }

        classification
    }

    /// Calls the configured enricher and, if it returned something, applies
    /// a bounded confidence adjustment. The category a rule (or history
    /// check) already assigned is immutable: enrichment may only nudge
    /// confidence by at most `ai_confidence_delta_max` in either direction.
    /// Enricher failure (already swallowed inside the trait impl) leaves the
    /// classification exactly as the deterministic stage produced it.
    async fn apply_ai_enrichment(&self, classification: &mut Classification, body: &str) {
        let Some(enrichment) = self
            .enricher
            .enrich(body, classification.category.as_str(), classification.confidence)
            .await
        else {
            return;
        };

        let delta = enrichment
            .confidence_delta
            .clamp(-self.ai_confidence_delta_max, self.ai_confidence_delta_max);
        classification.confidence = (classification.confidence + delta).clamp(0.0, 1.0);
        classification.ai_enrichment = Some(crate::model::AiEnrichment {
            confidence_delta: delta,
            ..enrichment
        });
        classification.ai_enhanced = true;
    }
}

/// Base confidence per rule, reduced by 0.10 when only one required
/// substring matched against a very short (<100 char) signature, but never
/// clipped below 0.50 for a positive match.
fn adjusted_confidence(rule: &Rule, body: &str) -> f64 {
    let mut confidence = rule.confidence;
    if rule.contains_len() == 1 && body.len() < 100 {
        confidence -= 0.10;
    }
    confidence.max(0.50)
}

/// `STABLE` is the one category assignable to a clean pass. Confidence
/// tracks how clean: `1 - fail_rate` over the qualifying history window.
fn classify_stable(result: &TestRunResult, context: &ExecutionContext) -> Option<Classification> {
    if !history::is_stable(context, &result.test_id, result.outcome) {
        return None;
    }

    Some(Classification {
        test_id: result.test_id.clone(),
        category: Category::Stable,
        confidence: 1.0 - context.history_stats_for(&result.test_id).fail_rate(),
        matched_rule: None,
        evidence: Vec::new(),
        code_reference: None,
        ai_enrichment: None,
        ai_enhanced: false,
    })
}

fn fallback_category(result: &TestRunResult) -> Category {
    match result.outcome {
        TestOutcome::Timeout => Category::EnvironmentIssue,
        TestOutcome::Error => Category::AutomationDefect,
        _ => Category::Unknown,
    }
}

fn resolve_code_reference(rule: &Rule, body: &str) -> Option<CodeReference> {
    let captures = rule.file_line_pattern.as_ref()?.captures(body)?;
    let file = captures.get(1)?.as_str().to_string();
    let line: u32 = captures.get(2)?.as_str().parse().ok()?;

    if is_framework_internal(&file) {
        return None;
    }

    let snippet = std::fs::read_to_string(&file).ok().map(|contents| {
        let lines: Vec<&str> = contents.lines().collect();
        let start = line.saturating_sub(6) as usize;
        let end = (line as usize + 5).min(lines.len());
        lines[start.min(lines.len())..end].join("\n")
    });

    let function_or_class = snippet.as_deref().and_then(find_enclosing_symbol);

    Some(CodeReference {
        file,
        line,
        snippet,
        function_or_class,
    })
}

/// Excludes frames inside framework-internal library paths (pytest/junit/
/// robot runner guts) from code-reference resolution, per the classifier's
/// "first frame inside the workspace" contract.
fn is_framework_internal(path: &str) -> bool {
    const EXCLUDED: &[&str] = &[
        "site-packages/_pytest",
        "site-packages/pytest",
        "/junit/",
        "robot/running",
        "robot/result",
        "node_modules/",
    ];
    EXCLUDED.iter().any(|pattern| path.contains(pattern))
}

/// Best-effort `def`/`fn`/`class` scan over the resolved snippet, used only
/// to label the code reference; resolution failure is not an error.
fn find_enclosing_symbol(snippet: &str) -> Option<String> {
    snippet.lines().find_map(|line| {
        let trimmed = line.trim_start();
        for keyword in ["def ", "fn ", "class ", "func ", "public void ", "it(", "test("] {
            if let Some(rest) = trimmed.strip_prefix(keyword) {
                let name = rest.split(['(', ':', ' ']).next().unwrap_or(rest).trim();
                if !name.is_empty() {
                    return Some(name.to_string());
                }
            }
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestOutcome;

    #[tokio::test]
    async fn test_unmatched_failure_falls_back_to_unknown() {
        let classifier = Classifier::with_rules(RuleSet::empty());
        let result = TestRunResult::new("t1", TestOutcome::Failed)
            .with_error_signature("some novel assertion text nobody has a rule for");
        let context = ExecutionContext::default();
        let classifications = classifier.classify_results(&[result], &context).await;
        assert_eq!(classifications[0].category, Category::Unknown);
        assert!(classifications[0].matched_rule.is_none());
    }

    #[tokio::test]
    async fn test_timeout_without_rule_match_is_environment_issue() {
        let classifier = Classifier::with_rules(RuleSet::empty());
        let result = TestRunResult::new("t1", TestOutcome::Timeout);
        let context = ExecutionContext::default();
        let classifications = classifier.classify_results(&[result], &context).await;
        assert_eq!(classifications[0].category, Category::EnvironmentIssue);
    }

    #[tokio::test]
    async fn test_load_falls_back_to_bundled_defaults_when_rules_file_absent() {
        let config = crate::config::ClassifierConfig {
            rules_path: std::path::PathBuf::from("/nonexistent/crossbridge-rules.yml"),
            ..Default::default()
        };
        let classifier = Classifier::load(&config);
        let result = TestRunResult::new("t1", TestOutcome::Failed)
            .with_error_signature("selenium.common.exceptions.NoSuchElementException: Unable to locate element");
        let context = ExecutionContext::default();
        let classifications = classifier.classify_results(&[result], &context).await;
        assert_eq!(classifications[0].category, Category::AutomationDefect);
    }

    #[tokio::test]
    async fn test_selenium_signature_is_automation_defect() {
        let yaml = r#"
            - name: selenium-no-such-element
              category: AUTOMATION_DEFECT
              priority: 1
              confidence: 0.9
              contains: ["NoSuchElementException"]
        "#;
        let rules = rules::parse_rules_for_test(yaml).unwrap();
        let classifier = Classifier::with_rules(rules);
        let result = TestRunResult::new("t1", TestOutcome::Failed).with_error_signature(
            "selenium.common.exceptions.NoSuchElementException: Unable to locate element",
        );
        let context = ExecutionContext::default();
        let classifications = classifier.classify_results(&[result], &context).await;
        assert_eq!(classifications[0].category, Category::AutomationDefect);
        assert!(classifications[0].confidence >= 0.85);
        assert!(classifications[0]
            .evidence
            .iter()
            .any(|e| e.contains("NoSuchElementException")));
    }

    #[tokio::test]
    async fn test_retried_pass_is_classified_flaky() {
        let classifier = Classifier::with_rules(RuleSet::empty());
        let result = TestRunResult::new("t1", TestOutcome::Passed).with_retry_count(2);
        let context = ExecutionContext::default();
        let classifications = classifier.classify_results(&[result], &context).await;
        assert_eq!(classifications.len(), 1);
        assert_eq!(classifications[0].category, Category::Flaky);
    }

    #[tokio::test]
    async fn test_clean_single_try_pass_is_not_classified() {
        let classifier = Classifier::with_rules(RuleSet::empty());
        let result = TestRunResult::new("t1", TestOutcome::Passed);
        let context = ExecutionContext::default();
        let classifications = classifier.classify_results(&[result], &context).await;
        assert!(classifications.is_empty());
    }

    #[tokio::test]
    async fn test_stable_history_pass_is_classified_stable() {
        use crate::model::HistoricalRun;

        let classifier = Classifier::with_rules(RuleSet::empty());
        let history = (0..6)
            .map(|_| HistoricalRun {
                run_id: "r".into(),
                timestamp: chrono::Utc::now(),
                results: vec![TestRunResult::new("t1", TestOutcome::Passed)],
            })
            .collect();
        let context = ExecutionContext {
            history,
            ..Default::default()
        };
        let result = TestRunResult::new("t1", TestOutcome::Passed);
        let classifications = classifier.classify_results(&[result], &context).await;
        assert_eq!(classifications.len(), 1);
        assert_eq!(classifications[0].category, Category::Stable);
    }

    #[tokio::test]
    async fn test_fixture_exclusion_falls_through_assertion_rule() {
        let yaml = r#"
            - name: product-defect
              category: PRODUCT_DEFECT
              priority: 1
              confidence: 0.85
              contains: ["AssertionError"]
              excludes: ["fixture"]
            - name: automation-defect-fallback
              category: AUTOMATION_DEFECT
              priority: 2
              confidence: 0.6
              contains: ["AssertionError"]
        "#;
        let rules = rules::parse_rules_for_test(yaml).unwrap();
        let classifier = Classifier::with_rules(rules);
        let result = TestRunResult::new("t1", TestOutcome::Failed)
            .with_error_signature("AssertionError: fixture teardown failed");
        let context = ExecutionContext::default();
        let classifications = classifier.classify_results(&[result], &context).await;
        assert_eq!(classifications[0].category, Category::AutomationDefect);
    }
}
