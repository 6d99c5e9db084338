//! Validation Result Types

use rule_store::{ErrorLevel, ErrorType, Rule};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where in the document an error applies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

/// A single problem found in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub level: ErrorLevel,
    pub position: Option<Position>,
    pub description: String,
    pub suggestion: Option<String>,
    /// Id of the rule that produced this error
    pub reference: Option<String>,
}

impl ValidationError {
    /// Error reported by `rule` using its configured type and level
    pub fn from_rule(rule: &Rule, description: impl Into<String>) -> Self {
        Self {
            error_type: rule.error_type,
            level: rule.error_level,
            position: None,
            description: description.into(),
            suggestion: rule.suggestion.clone(),
            reference: Some(rule.id.clone()),
        }
    }

    /// Attach a field locator
    pub fn with_field(mut self, field: Option<&str>) -> Self {
        self.position = field.map(|f| Position {
            field: Some(f.to_string()),
            ..Default::default()
        });
        self
    }

    /// Whether this entry fails validation
    pub fn is_error(&self) -> bool {
        self.level == ErrorLevel::Error
    }
}

/// Outcome of validating one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// True iff no error-level entry is present
    pub success: bool,
    pub errors: Vec<ValidationError>,
    pub summary: String,
    pub fallback_mode: bool,
    pub fallback_notice: Option<String>,
    /// Estimated seconds until the AI service recovers
    pub estimated_recovery: Option<u64>,
    /// Wall clock seconds for the whole call
    pub execution_time: f64,
    pub rules_executed: usize,
}

impl ValidationResult {
    /// Result when there are no enabled rules
    pub fn no_rules() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            summary: "No rules are enabled, validation skipped".to_string(),
            fallback_mode: false,
            fallback_notice: None,
            estimated_recovery: None,
            execution_time: 0.0,
            rules_executed: 0,
        }
    }

    /// Result when the executor itself failed; partial results are dropped
    pub fn pipeline_failure(reason: &dyn std::fmt::Display, elapsed: Duration) -> Self {
        Self {
            success: false,
            errors: vec![ValidationError {
                error_type: ErrorType::ContentError,
                level: ErrorLevel::Error,
                position: None,
                description: format!("Rule execution failed: {reason}"),
                suggestion: Some("Check the document format or contact an administrator".to_string()),
                reference: None,
            }],
            summary: "Rule execution failed".to_string(),
            fallback_mode: false,
            fallback_notice: None,
            estimated_recovery: None,
            execution_time: elapsed.as_secs_f64(),
            rules_executed: 0,
        }
    }

    /// Aggregate flattened rule errors into a result
    pub fn from_errors(errors: Vec<ValidationError>, elapsed: Duration, rules_executed: usize) -> Self {
        Self {
            success: !errors.iter().any(ValidationError::is_error),
            summary: summarize(&errors),
            errors,
            fallback_mode: false,
            fallback_notice: None,
            estimated_recovery: None,
            execution_time: elapsed.as_secs_f64(),
            rules_executed,
        }
    }

    /// Mark the result as produced in fallback mode
    pub fn in_fallback(mut self, notice: impl Into<String>, estimated_recovery: Option<u64>) -> Self {
        self.fallback_mode = true;
        self.fallback_notice = Some(notice.into());
        self.estimated_recovery = estimated_recovery;
        self
    }

    /// Number of entries at the given level
    pub fn count_level(&self, level: ErrorLevel) -> usize {
        self.errors.iter().filter(|e| e.level == level).count()
    }
}

fn summarize(errors: &[ValidationError]) -> String {
    if errors.is_empty() {
        return "Document passed validation, no issues found".to_string();
    }

    let count = |level: ErrorLevel| errors.iter().filter(|e| e.level == level).count();
    let mut parts = vec![format!("Found {} issue(s)", errors.len())];
    for (level, label) in [
        (ErrorLevel::Error, "error(s)"),
        (ErrorLevel::Warning, "warning(s)"),
        (ErrorLevel::Info, "notice(s)"),
    ] {
        let n = count(level);
        if n > 0 {
            parts.push(format!("{n} {label}"));
        }
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: ErrorLevel) -> ValidationError {
        ValidationError {
            error_type: ErrorType::FormatError,
            level,
            position: None,
            description: "x".into(),
            suggestion: None,
            reference: Some("r".into()),
        }
    }

    #[test]
    fn test_success_ignores_warnings_and_info() {
        let result = ValidationResult::from_errors(
            vec![entry(ErrorLevel::Warning), entry(ErrorLevel::Info)],
            Duration::from_millis(5),
            2,
        );
        assert!(result.success);
        assert_eq!(result.summary, "Found 2 issue(s), 1 warning(s), 1 notice(s)");
    }

    #[test]
    fn test_error_level_fails_validation() {
        let result = ValidationResult::from_errors(
            vec![entry(ErrorLevel::Error), entry(ErrorLevel::Error), entry(ErrorLevel::Info)],
            Duration::ZERO,
            3,
        );
        assert!(!result.success);
        assert_eq!(result.count_level(ErrorLevel::Error), 2);
        assert_eq!(result.summary, "Found 3 issue(s), 2 error(s), 1 notice(s)");
    }

    #[test]
    fn test_clean_summary() {
        let result = ValidationResult::from_errors(Vec::new(), Duration::ZERO, 4);
        assert!(result.success);
        assert_eq!(result.summary, "Document passed validation, no issues found");
    }

    #[test]
    fn test_error_serializes_type_field() {
        let json = serde_json::to_value(entry(ErrorLevel::Warning).with_field(Some("title"))).unwrap();
        assert_eq!(json["type"], "format_error");
        assert_eq!(json["level"], "warning");
        assert_eq!(json["position"]["field"], "title");
    }

    #[test]
    fn test_fallback_annotation() {
        let result = ValidationResult::no_rules().in_fallback("AI unavailable", Some(60));
        assert!(result.fallback_mode);
        assert_eq!(result.fallback_notice.as_deref(), Some("AI unavailable"));
        assert_eq!(result.estimated_recovery, Some(60));
    }
}
