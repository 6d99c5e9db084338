//! Rule Configuration Error Types

use std::path::PathBuf;
use thiserror::Error;

/// Errors while loading or validating a rules configuration
#[derive(Debug, Error)]
pub enum RuleConfigError {
    /// Config file could not be read
    #[error("Failed to read rules config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document is not valid JSON or does not match the rule schema
    #[error("Invalid rules config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two rules share the same id
    #[error("Duplicate rule id: {0}")]
    DuplicateRuleId(String),

    /// Rule type requires a parameter that is absent
    #[error("Rule {rule_id} is missing required parameter `{parameter}`")]
    MissingParameter {
        rule_id: String,
        parameter: &'static str,
    },

    /// Parameters are present but malformed
    #[error("Rule {rule_id} has invalid parameters: {reason}")]
    InvalidParameters { rule_id: String, reason: String },

    /// Pattern rule with a regular expression that does not compile
    #[error("Rule {rule_id} has an invalid pattern: {source}")]
    InvalidPattern {
        rule_id: String,
        #[source]
        source: regex::Error,
    },

    /// Priority outside 1..=100
    #[error("Rule {rule_id} priority {priority} is outside 1..=100")]
    InvalidPriority { rule_id: String, priority: i64 },

    /// File system watcher could not be set up
    #[error("Config watcher error: {0}")]
    Watch(#[from] notify::Error),
}
