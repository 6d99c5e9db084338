//! Rule Definitions
//!
//! Rules are stored on disk with a `rule_type` tag and a loose
//! `parameters` object. On load the pair is converted into a typed
//! [`RuleKind`] so the executor never has to probe for keys.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::RuleConfigError;

/// Rule category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Format,
    Content,
    Compliance,
}

impl RuleCategory {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCategory::Format => "format",
            RuleCategory::Content => "content",
            RuleCategory::Compliance => "compliance",
        }
    }
}

/// Rule type tag as written in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// Regular expression must match
    Pattern,
    /// Content length bounds
    Length,
    /// Keyword presence/absence
    Keyword,
    /// Required document sections
    Structure,
    /// Reserved, not evaluated
    Custom,
}

/// Error type reported by a failing rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    FormatError,
    ContentError,
    ComplianceError,
}

/// Severity of a reported error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorLevel {
    Error,
    Warning,
    Info,
}

/// Keyword rule mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordMode {
    /// Every keyword must be present
    #[default]
    Required,
    /// No keyword may be present
    Prohibited,
    /// At least one keyword must be present
    AnyOf,
}

/// Regular expression compiled once when the rule is parsed
#[derive(Clone)]
pub struct Pattern(Regex);

impl Pattern {
    /// Compile a pattern
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    /// Source text of the pattern
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.as_str()).finish()
    }
}

/// Typed rule parameters, one variant per rule type
#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    Pattern {
        pattern: Pattern,
        /// Context field to match instead of the full content
        field: Option<String>,
    },
    Length {
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
    Keyword {
        keywords: Vec<String>,
        mode: KeywordMode,
    },
    Structure {
        required_sections: Vec<String>,
    },
    Custom {
        parameters: Map<String, Value>,
    },
}

#[derive(Deserialize)]
struct PatternParams {
    pattern: String,
    #[serde(default)]
    field: Option<String>,
}

#[derive(Deserialize)]
struct LengthParams {
    #[serde(default)]
    min_length: Option<usize>,
    #[serde(default)]
    max_length: Option<usize>,
}

#[derive(Deserialize)]
struct KeywordParams {
    keywords: Vec<String>,
    #[serde(default)]
    mode: KeywordMode,
}

#[derive(Deserialize)]
struct StructureParams {
    #[serde(default)]
    required_sections: Vec<String>,
}

impl RuleKind {
    /// Get the type tag for this kind
    pub fn rule_type(&self) -> RuleType {
        match self {
            RuleKind::Pattern { .. } => RuleType::Pattern,
            RuleKind::Length { .. } => RuleType::Length,
            RuleKind::Keyword { .. } => RuleType::Keyword,
            RuleKind::Structure { .. } => RuleType::Structure,
            RuleKind::Custom { .. } => RuleType::Custom,
        }
    }

    fn from_parameters(
        rule_id: &str,
        rule_type: RuleType,
        parameters: Map<String, Value>,
    ) -> Result<Self, RuleConfigError> {
        let missing = |parameter| RuleConfigError::MissingParameter {
            rule_id: rule_id.to_string(),
            parameter,
        };

        match rule_type {
            RuleType::Pattern => {
                if !parameters.contains_key("pattern") {
                    return Err(missing("pattern"));
                }
                let params: PatternParams = parse_params(rule_id, parameters)?;
                let pattern = Pattern::new(&params.pattern).map_err(|e| RuleConfigError::InvalidPattern {
                    rule_id: rule_id.to_string(),
                    source: e,
                })?;
                Ok(RuleKind::Pattern {
                    pattern,
                    field: params.field,
                })
            }
            RuleType::Length => {
                if !parameters.contains_key("min_length") && !parameters.contains_key("max_length") {
                    return Err(missing("min_length or max_length"));
                }
                let params: LengthParams = parse_params(rule_id, parameters)?;
                // A zero bound is treated as unset
                Ok(RuleKind::Length {
                    min_length: params.min_length.filter(|n| *n > 0),
                    max_length: params.max_length.filter(|n| *n > 0),
                })
            }
            RuleType::Keyword => {
                if !parameters.contains_key("keywords") {
                    return Err(missing("keywords"));
                }
                let params: KeywordParams = parse_params(rule_id, parameters)?;
                Ok(RuleKind::Keyword {
                    keywords: params.keywords,
                    mode: params.mode,
                })
            }
            RuleType::Structure => {
                let params: StructureParams = parse_params(rule_id, parameters)?;
                Ok(RuleKind::Structure {
                    required_sections: params.required_sections,
                })
            }
            RuleType::Custom => Ok(RuleKind::Custom { parameters }),
        }
    }

    fn to_parameters(&self) -> Map<String, Value> {
        let mut map = Map::new();
        match self {
            RuleKind::Pattern { pattern, field } => {
                map.insert("pattern".into(), Value::from(pattern.as_str()));
                if let Some(field) = field {
                    map.insert("field".into(), Value::from(field.as_str()));
                }
            }
            RuleKind::Length { min_length, max_length } => {
                if let Some(min) = min_length {
                    map.insert("min_length".into(), Value::from(*min));
                }
                if let Some(max) = max_length {
                    map.insert("max_length".into(), Value::from(*max));
                }
            }
            RuleKind::Keyword { keywords, mode } => {
                map.insert("keywords".into(), Value::from(keywords.clone()));
                map.insert("mode".into(), serde_json::to_value(mode).unwrap_or(Value::Null));
            }
            RuleKind::Structure { required_sections } => {
                map.insert("required_sections".into(), Value::from(required_sections.clone()));
            }
            RuleKind::Custom { parameters } => return parameters.clone(),
        }
        map
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    rule_id: &str,
    parameters: Map<String, Value>,
) -> Result<T, RuleConfigError> {
    serde_json::from_value(Value::Object(parameters)).map_err(|e| RuleConfigError::InvalidParameters {
        rule_id: rule_id.to_string(),
        reason: e.to_string(),
    })
}

/// On-disk shape of a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawRule {
    id: String,
    name: String,
    category: RuleCategory,
    priority: i64,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    critical: bool,
    rule_type: RuleType,
    #[serde(default)]
    parameters: Map<String, Value>,
    error_type: ErrorType,
    error_level: ErrorLevel,
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    suggestion: Option<String>,
}

fn default_enabled() -> bool {
    true
}

/// A validation rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRule", into = "RawRule")]
pub struct Rule {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    pub category: RuleCategory,
    /// Priority 1-100, higher runs first
    pub priority: u8,
    pub enabled: bool,
    /// A failing critical rule halts evaluation of the remaining rules
    pub critical: bool,
    /// Typed parameters
    pub kind: RuleKind,
    pub error_type: ErrorType,
    pub error_level: ErrorLevel,
    pub description: String,
    pub suggestion: Option<String>,
}

impl Rule {
    /// Get the rule type tag
    pub fn rule_type(&self) -> RuleType {
        self.kind.rule_type()
    }
}

impl TryFrom<RawRule> for Rule {
    type Error = RuleConfigError;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        let priority = u8::try_from(raw.priority)
            .ok()
            .filter(|p| (1..=100).contains(p))
            .ok_or_else(|| RuleConfigError::InvalidPriority {
                rule_id: raw.id.clone(),
                priority: raw.priority,
            })?;
        let kind = RuleKind::from_parameters(&raw.id, raw.rule_type, raw.parameters)?;

        Ok(Self {
            id: raw.id,
            name: raw.name,
            category: raw.category,
            priority,
            enabled: raw.enabled,
            critical: raw.critical,
            kind,
            error_type: raw.error_type,
            error_level: raw.error_level,
            description: raw.description,
            suggestion: raw.suggestion,
        })
    }
}

impl From<Rule> for RawRule {
    fn from(rule: Rule) -> Self {
        Self {
            parameters: rule.kind.to_parameters(),
            rule_type: rule.rule_type(),
            id: rule.id,
            name: rule.name,
            category: rule.category,
            priority: i64::from(rule.priority),
            enabled: rule.enabled,
            critical: rule.critical,
            error_type: rule.error_type,
            error_level: rule.error_level,
            description: rule.description,
            suggestion: rule.suggestion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule_json(rule_type: &str, parameters: Value) -> Value {
        json!({
            "id": "r1",
            "name": "Rule one",
            "category": "format",
            "priority": 50,
            "rule_type": rule_type,
            "parameters": parameters,
            "error_type": "format_error",
            "error_level": "error",
            "description": "desc"
        })
    }

    #[test]
    fn test_pattern_rule_parses_into_typed_kind() {
        let rule: Rule = serde_json::from_value(rule_json(
            "pattern",
            json!({"pattern": "^\\d+", "field": "title"}),
        ))
        .unwrap();

        assert!(rule.enabled);
        assert!(!rule.critical);
        match &rule.kind {
            RuleKind::Pattern { pattern, field } => {
                assert_eq!(pattern.as_str(), "^\\d+");
                assert!(pattern.is_match("12 items"));
                assert_eq!(field.as_deref(), Some("title"));
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_pattern_rejected_at_parse_time() {
        let err = RuleKind::from_parameters(
            "bad",
            RuleType::Pattern,
            json!({"pattern": "(unclosed"}).as_object().unwrap().clone(),
        )
        .unwrap_err();
        assert!(matches!(err, RuleConfigError::InvalidPattern { rule_id, .. } if rule_id == "bad"));

        assert!(serde_json::from_value::<Rule>(rule_json("pattern", json!({"pattern": "("}))).is_err());
    }

    #[test]
    fn test_missing_required_parameter_rejected() {
        assert!(serde_json::from_value::<Rule>(rule_json("pattern", json!({}))).is_err());
        assert!(serde_json::from_value::<Rule>(rule_json("length", json!({}))).is_err());
        assert!(serde_json::from_value::<Rule>(rule_json("keyword", json!({"mode": "required"}))).is_err());
    }

    #[test]
    fn test_length_accepts_either_bound() {
        let rule: Rule = serde_json::from_value(rule_json("length", json!({"max_length": 10}))).unwrap();
        assert_eq!(
            rule.kind,
            RuleKind::Length {
                min_length: None,
                max_length: Some(10),
            }
        );
    }

    #[test]
    fn test_keyword_mode_defaults_to_required() {
        let rule: Rule = serde_json::from_value(rule_json("keyword", json!({"keywords": ["a", "b"]}))).unwrap();
        match rule.kind {
            RuleKind::Keyword { mode, keywords } => {
                assert_eq!(mode, KeywordMode::Required);
                assert_eq!(keywords, vec!["a", "b"]);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_keyword_mode_rejected() {
        let raw = rule_json("keyword", json!({"keywords": ["a"], "mode": "sometimes"}));
        assert!(serde_json::from_value::<Rule>(raw).is_err());
    }

    #[test]
    fn test_priority_bounds() {
        let mut raw = rule_json("structure", json!({}));
        raw["priority"] = json!(0);
        assert!(serde_json::from_value::<Rule>(raw.clone()).is_err());
        raw["priority"] = json!(101);
        assert!(serde_json::from_value::<Rule>(raw.clone()).is_err());
        raw["priority"] = json!(100);
        assert!(serde_json::from_value::<Rule>(raw).is_ok());
    }

    #[test]
    fn test_custom_rule_keeps_parameters_when_serialized() {
        let raw = rule_json("custom", json!({"script": "check()"}));
        let rule: Rule = serde_json::from_value(raw).unwrap();
        let back = serde_json::to_value(&rule).unwrap();

        assert_eq!(back["rule_type"], "custom");
        assert_eq!(back["parameters"]["script"], "check()");
    }
}
