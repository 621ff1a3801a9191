//! Classifier rule definitions, loaded from a YAML rules file.
//!
//! Rules are evaluated in ascending `priority` order; the first rule whose
//! `contains` substrings all match and whose `excludes` substrings all fail
//! to match wins. `serde_yaml` is used here (rather than the crate's
//! otherwise-TOML configuration) because rule sets are naturally a list of
//! similarly-shaped records, the shape YAML communicates best and the shape
//! most classifier-rule tooling elsewhere in the ecosystem already uses.

use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::Category;

#[derive(Debug, Clone, Deserialize)]
struct RuleDef {
    name: String,
    category: Category,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    contains: Vec<String>,
    #[serde(default)]
    excludes: Vec<String>,
    /// Optional regex with two capture groups: file path, then line number,
    /// used to resolve a code reference for the matched failure.
    #[serde(default)]
    file_line_pattern: Option<String>,
}

fn default_confidence() -> f64 {
    0.8
}

pub struct Rule {
    pub name: String,
    pub category: Category,
    pub confidence: f64,
    pub priority: i32,
    contains: Vec<String>,
    excludes: Vec<String>,
    pub file_line_pattern: Option<Regex>,
}

impl Rule {
    fn matches(&self, body: &str) -> bool {
        self.contains.iter().all(|needle| body.contains(needle.as_str()))
            && !self.excludes.iter().any(|needle| body.contains(needle.as_str()))
    }

    pub fn contains_len(&self) -> usize {
        self.contains.len()
    }

    /// The `required_substrings that actually matched, formatted as
    /// `<rule-name>:<substring>` evidence entries.
    pub fn matched_evidence(&self, body: &str) -> Vec<String> {
        self.contains
            .iter()
            .filter(|needle| body.contains(needle.as_str()))
            .map(|needle| format!("{}:{}", self.name, needle))
            .collect()
    }
}

/// The bundled ruleset shipped alongside the binary, covering every §4.5
/// category family with representative patterns. Used whenever no rules
/// file is configured or the configured path doesn't exist, so a fresh
/// install classifies real failures instead of returning `UNKNOWN` for
/// everything.
const DEFAULT_RULES_YAML: &str = include_str!("../../crossbridge-rules.yml");

pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn defaults() -> Self {
        parse_rules(DEFAULT_RULES_YAML).expect("bundled crossbridge-rules.yml is valid")
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn first_match(&self, body: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.matches(body))
    }

    /// Rules in evaluation order, for `rules list`-style introspection.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

pub fn load_rules(path: &Path) -> Result<RuleSet, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_rules(&raw)
}

#[cfg(test)]
pub fn parse_rules_for_test(raw: &str) -> Result<RuleSet, ConfigError> {
    parse_rules(raw)
}

fn parse_rules(raw: &str) -> Result<RuleSet, ConfigError> {
    let defs: Vec<RuleDef> = serde_yaml::from_str(raw)
        .map_err(|e| ConfigError::Invalid {
            field: "classifier.rules_path".to_string(),
            message: e.to_string(),
        })?;

    let mut rules: Vec<Rule> = defs
        .into_iter()
        .map(|def| {
            let file_line_pattern = def
                .file_line_pattern
                .as_deref()
                .and_then(|p| Regex::new(p).ok());
            Rule {
                name: def.name,
                category: def.category,
                confidence: def.confidence,
                priority: def.priority,
                contains: def.contains,
                excludes: def.excludes,
                file_line_pattern,
            }
        })
        .collect();

    rules.sort_by_key(|r| r.priority);
    Ok(RuleSet { rules })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_respects_priority_order() {
        let yaml = r#"
            - name: generic-assertion
              category: PRODUCT_DEFECT
              priority: 10
              contains: ["AssertionError"]
            - name: flaky-timeout
              category: FLAKY
              priority: 1
              contains: ["AssertionError", "timed out"]
        "#;
        let rules = parse_rules(yaml).unwrap();
        let matched = rules.first_match("AssertionError: request timed out after 5s").unwrap();
        assert_eq!(matched.name, "flaky-timeout");
    }

    #[test]
    fn test_defaults_cover_every_taxonomy_family() {
        let rules = RuleSet::defaults();
        assert!(rules.first_match("selenium.common.exceptions.NoSuchElementException").is_some());
        assert_eq!(
            rules.first_match("AssertionError: expected 1 == 2").unwrap().category,
            Category::ProductDefect
        );
        assert_eq!(
            rules.first_match("requests.exceptions.ConnectionError: Max retries exceeded").unwrap().category,
            Category::EnvironmentIssue
        );
        assert_eq!(
            rules.first_match("ImportError: No module named 'foo'").unwrap().category,
            Category::ConfigurationIssue
        );
    }

    #[test]
    fn test_excludes_prevent_a_match() {
        let yaml = r#"
            - name: network-flake
              category: ENVIRONMENT_ISSUE
              priority: 1
              contains: ["connection reset"]
              excludes: ["intentional"]
        "#;
        let rules = parse_rules(yaml).unwrap();
        assert!(rules.first_match("connection reset by peer").is_some());
        assert!(rules
            .first_match("connection reset by peer (intentional test fixture)")
            .is_none());
    }
}
