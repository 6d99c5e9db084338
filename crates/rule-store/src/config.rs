//! Rules Configuration Document

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::RuleConfigError;
use crate::rule::Rule;

/// A versioned set of rules, replaced wholesale on reload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Config version string
    pub version: String,
    /// Rules in file order
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Administrative rule templates (opaque)
    #[serde(default)]
    pub templates: Vec<Value>,
}

impl RulesConfig {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, RuleConfigError> {
        let config: RulesConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check document-level invariants
    ///
    /// Per-rule parameter requirements are enforced while parsing each
    /// [`Rule`]; this covers what a single rule cannot see.
    pub fn validate(&self) -> Result<(), RuleConfigError> {
        let mut seen = HashSet::with_capacity(self.rules.len());
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(RuleConfigError::DuplicateRuleId(rule.id.clone()));
            }
        }
        Ok(())
    }

    /// Enabled rules ordered by priority, highest first
    ///
    /// The sort is stable so equal priorities keep file order.
    pub fn enabled_rules(&self) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self.rules.iter().filter(|r| r.enabled).cloned().collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        rules
    }

    /// Number of enabled rules
    pub fn enabled_count(&self) -> usize {
        self.rules.iter().filter(|r| r.enabled).count()
    }

    /// Find a rule by id
    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub(crate) fn rule_mut(&mut self, id: &str) -> Option<&mut Rule> {
        self.rules.iter_mut().find(|r| r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn rule(id: &str, priority: u8, enabled: bool) -> Value {
        json!({
            "id": id,
            "name": id,
            "category": "content",
            "priority": priority,
            "enabled": enabled,
            "rule_type": "length",
            "parameters": {"min_length": 1},
            "error_type": "content_error",
            "error_level": "warning",
            "description": "too short"
        })
    }

    fn config(rules: Vec<Value>) -> String {
        json!({"version": "1.0", "rules": rules, "templates": []}).to_string()
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = config(vec![rule("a", 10, true), rule("a", 20, true)]);
        let err = RulesConfig::from_json(&json).unwrap_err();
        assert!(matches!(err, RuleConfigError::DuplicateRuleId(id) if id == "a"));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            RulesConfig::from_json("{\"version\": \"1.0\", \"rules\": ["),
            Err(RuleConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_enabled_rules_sorted_by_priority() {
        let json = config(vec![
            rule("low", 10, true),
            rule("off", 99, false),
            rule("high", 90, true),
            rule("mid", 50, true),
        ]);
        let config = RulesConfig::from_json(&json).unwrap();
        let ids: Vec<_> = config.enabled_rules().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);
        assert_eq!(config.enabled_count(), 3);
    }

    #[test]
    fn test_equal_priority_keeps_file_order() {
        let json = config(vec![
            rule("first", 50, true),
            rule("top", 80, true),
            rule("second", 50, true),
            rule("third", 50, true),
        ]);
        let config = RulesConfig::from_json(&json).unwrap();
        let ids: Vec<_> = config.enabled_rules().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["top", "first", "second", "third"]);
    }

    #[test]
    fn test_shipped_rules_file_is_valid() {
        let config = RulesConfig::from_json(include_str!("../../../config/validation_rules.json")).unwrap();
        assert_eq!(config.enabled_rules()[0].id, "issuing_authority");
        assert!(config.rule("semantic_consistency").is_some_and(|r| !r.enabled));
        assert_eq!(config.templates.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_enabled_rules_are_stably_ordered(
            specs in proptest::collection::vec((1u8..=100, any::<bool>()), 0..40)
        ) {
            let rules: Vec<Value> = specs
                .iter()
                .enumerate()
                .map(|(i, (p, e))| rule(&format!("r{i}"), *p, *e))
                .collect();
            let config = RulesConfig::from_json(&config(rules)).unwrap();

            let first = config.enabled_rules();
            let second = config.enabled_rules();
            prop_assert_eq!(&first, &second);

            for pair in first.windows(2) {
                prop_assert!(pair[0].priority >= pair[1].priority);
                if pair[0].priority == pair[1].priority {
                    let a: usize = pair[0].id[1..].parse().unwrap();
                    let b: usize = pair[1].id[1..].parse().unwrap();
                    prop_assert!(a < b);
                }
            }
            prop_assert!(first.iter().all(|r| r.enabled));
        }
    }
}
