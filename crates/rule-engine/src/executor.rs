//! Rule Executor
//!
//! Evaluates rules in the order given, stops after a failing critical
//! rule and records execution time per rule id.

use rule_store::{ErrorLevel, KeywordMode, Rule, RuleKind};
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::result::ValidationError;

/// Structured document metadata supplied alongside the text
pub type Context = serde_json::Map<String, Value>;

/// Rules slower than this on average are reported as slow
pub const DEFAULT_SLOW_RULE_THRESHOLD: Duration = Duration::from_millis(500);

/// Fault while evaluating a single rule
#[derive(Debug, Error)]
pub enum RuleEvalError {
    /// Context field holds a value that cannot be matched as text
    #[error("Context field `{field}` holds {kind}, expected a string, number or boolean")]
    UnsupportedFieldValue { field: String, kind: &'static str },
}

/// Fault of the execution pipeline as a whole
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Rule timing telemetry is unavailable")]
    TelemetryUnavailable,
}

/// Outcome of one rule invocation
#[derive(Debug, Clone)]
pub struct RuleResult {
    pub rule_id: String,
    pub passed: bool,
    pub errors: Vec<ValidationError>,
    pub execution_time: Duration,
}

/// Aggregated timings for one rule
#[derive(Debug, Clone, Copy)]
struct RuleTiming {
    executions: u64,
    total: Duration,
    min: Duration,
    max: Duration,
}

impl RuleTiming {
    fn new(elapsed: Duration) -> Self {
        Self {
            executions: 1,
            total: elapsed,
            min: elapsed,
            max: elapsed,
        }
    }

    fn record(&mut self, elapsed: Duration) {
        self.executions += 1;
        self.total += elapsed;
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
    }

    fn average(&self) -> Duration {
        self.total.div_f64(self.executions.max(1) as f64)
    }
}

/// Per-rule timing report (seconds)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleMetrics {
    pub executions: u64,
    pub avg_time: f64,
    pub min_time: f64,
    pub max_time: f64,
}

/// Timing report for all rules seen so far
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub total_rules: usize,
    pub rules: BTreeMap<String, RuleMetrics>,
}

/// A rule whose average execution time exceeds the threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlowRule {
    pub rule_id: String,
    pub avg_time: f64,
}

/// Executes an ordered rule list
///
/// The validation engine depends on this seam rather than on
/// [`RuleExecutor`] directly.
pub trait RuleRunner: Send + Sync {
    /// Evaluate `rules` in order against `content`
    fn execute_rules(&self, rules: &[Rule], content: &str, context: &Context)
        -> Result<Vec<RuleResult>, ExecutorError>;

    /// Timing report
    fn performance_metrics(&self) -> PerformanceMetrics;

    /// Rules slower than `threshold`, slowest first
    fn slow_rules(&self, threshold: Duration) -> Vec<SlowRule>;
}

/// Local rule executor with timing telemetry
#[derive(Default)]
pub struct RuleExecutor {
    timings: Mutex<HashMap<String, RuleTiming>>,
}

impl RuleExecutor {
    /// Create a new executor
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate a single rule and record its timing
    pub fn execute_rule(&self, rule: &Rule, content: &str, context: &Context) -> Result<RuleResult, ExecutorError> {
        let start = Instant::now();
        let errors = match evaluate(rule, content, context) {
            Ok(errors) => errors,
            Err(e) => {
                error!(rule_id = %rule.id, error = %e, "Rule evaluation failed");
                vec![ValidationError {
                    level: ErrorLevel::Error,
                    ..ValidationError::from_rule(rule, format!("Rule execution error: {e}"))
                }]
            }
        };
        let execution_time = start.elapsed();
        self.record(&rule.id, execution_time)?;

        Ok(RuleResult {
            rule_id: rule.id.clone(),
            passed: errors.is_empty(),
            errors,
            execution_time,
        })
    }

    /// Evaluate rules in the order given
    ///
    /// Callers are expected to pass rules already sorted by priority.
    pub fn execute_rules(
        &self,
        rules: &[Rule],
        content: &str,
        context: &Context,
    ) -> Result<Vec<RuleResult>, ExecutorError> {
        let mut results = Vec::with_capacity(rules.len());

        for rule in rules {
            let result = self.execute_rule(rule, content, context)?;
            let halt = rule.critical && !result.passed;
            results.push(result);

            if halt {
                warn!(rule_id = %rule.id, "Critical rule failed, skipping remaining rules");
                break;
            }
        }

        Ok(results)
    }

    fn record(&self, rule_id: &str, elapsed: Duration) -> Result<(), ExecutorError> {
        let mut timings = self.timings.lock().map_err(|_| ExecutorError::TelemetryUnavailable)?;
        timings
            .entry(rule_id.to_string())
            .and_modify(|t| t.record(elapsed))
            .or_insert_with(|| RuleTiming::new(elapsed));
        Ok(())
    }

    fn timings(&self) -> HashMap<String, RuleTiming> {
        self.timings.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Average execution time of a rule, if it has run
    pub fn get_execution_time(&self, rule_id: &str) -> Option<Duration> {
        self.timings.lock().unwrap_or_else(PoisonError::into_inner).get(rule_id).map(RuleTiming::average)
    }

    /// Rules whose running average exceeds `threshold`, slowest first
    pub fn get_slow_rules(&self, threshold: Duration) -> Vec<SlowRule> {
        let mut slow: Vec<(String, Duration)> = self
            .timings()
            .into_iter()
            .map(|(id, t)| (id, t.average()))
            .filter(|(_, avg)| *avg > threshold)
            .collect();
        slow.sort_by(|a, b| b.1.cmp(&a.1));

        slow.into_iter()
            .map(|(rule_id, avg)| SlowRule {
                rule_id,
                avg_time: avg.as_secs_f64(),
            })
            .collect()
    }

    /// Timing report for all rules seen so far
    pub fn get_performance_metrics(&self) -> PerformanceMetrics {
        let rules: BTreeMap<_, _> = self
            .timings()
            .into_iter()
            .map(|(id, t)| {
                (
                    id,
                    RuleMetrics {
                        executions: t.executions,
                        avg_time: t.average().as_secs_f64(),
                        min_time: t.min.as_secs_f64(),
                        max_time: t.max.as_secs_f64(),
                    },
                )
            })
            .collect();

        PerformanceMetrics {
            total_rules: rules.len(),
            rules,
        }
    }
}

impl RuleRunner for RuleExecutor {
    fn execute_rules(
        &self,
        rules: &[Rule],
        content: &str,
        context: &Context,
    ) -> Result<Vec<RuleResult>, ExecutorError> {
        RuleExecutor::execute_rules(self, rules, content, context)
    }

    fn performance_metrics(&self) -> PerformanceMetrics {
        self.get_performance_metrics()
    }

    fn slow_rules(&self, threshold: Duration) -> Vec<SlowRule> {
        self.get_slow_rules(threshold)
    }
}

fn evaluate(rule: &Rule, content: &str, context: &Context) -> Result<Vec<ValidationError>, RuleEvalError> {
    let errors = match &rule.kind {
        RuleKind::Pattern { pattern, field } => {
            let text = match field.as_deref().and_then(|f| context.get(f).map(|v| (f, v))) {
                Some((f, value)) => context_text(f, value)?,
                None => Cow::Borrowed(content),
            };

            if pattern.is_match(&text) {
                Vec::new()
            } else {
                vec![ValidationError::from_rule(rule, rule.description.as_str()).with_field(field.as_deref())]
            }
        }
        RuleKind::Length { min_length, max_length } => {
            let length = content.chars().count();
            let mut errors = Vec::new();
            if let Some(min) = *min_length {
                if length < min {
                    errors.push(ValidationError::from_rule(
                        rule,
                        format!("{} (current length: {length}, minimum: {min})", rule.description),
                    ));
                }
            }
            if let Some(max) = *max_length {
                if length > max {
                    errors.push(ValidationError::from_rule(
                        rule,
                        format!("{} (current length: {length}, maximum: {max})", rule.description),
                    ));
                }
            }
            errors
        }
        RuleKind::Keyword { keywords, mode } => keyword_errors(rule, keywords, *mode, content),
        RuleKind::Structure { required_sections } => required_sections
            .iter()
            .filter(|section| !content.contains(section.as_str()))
            .map(|section| ValidationError::from_rule(rule, format!("{}: missing section {section}", rule.description)))
            .collect(),
        RuleKind::Custom { .. } => {
            warn!(rule_id = %rule.id, "Custom rules are not supported, skipping");
            Vec::new()
        }
    };

    debug!(rule_id = %rule.id, errors = errors.len(), "Rule evaluated");
    Ok(errors)
}

fn keyword_errors(rule: &Rule, keywords: &[String], mode: KeywordMode, content: &str) -> Vec<ValidationError> {
    match mode {
        KeywordMode::Required => {
            let missing: Vec<&str> = keywords
                .iter()
                .map(String::as_str)
                .filter(|k| !content.contains(k))
                .collect();
            if missing.is_empty() {
                Vec::new()
            } else {
                vec![ValidationError::from_rule(
                    rule,
                    format!("{}: missing {}", rule.description, missing.join(", ")),
                )]
            }
        }
        KeywordMode::Prohibited => {
            let found: Vec<&str> = keywords
                .iter()
                .map(String::as_str)
                .filter(|k| content.contains(k))
                .collect();
            if found.is_empty() {
                Vec::new()
            } else {
                vec![ValidationError::from_rule(
                    rule,
                    format!("{}: found {}", rule.description, found.join(", ")),
                )]
            }
        }
        KeywordMode::AnyOf => {
            if keywords.iter().any(|k| content.contains(k.as_str())) {
                Vec::new()
            } else {
                vec![ValidationError::from_rule(rule, rule.description.as_str())]
            }
        }
    }
}

fn context_text<'a>(field: &str, value: &'a Value) -> Result<Cow<'a, str>, RuleEvalError> {
    let unsupported = |kind| RuleEvalError::UnsupportedFieldValue {
        field: field.to_string(),
        kind,
    };
    match value {
        Value::String(s) => Ok(Cow::Borrowed(s)),
        Value::Number(_) | Value::Bool(_) => Ok(Cow::Owned(value.to_string())),
        Value::Null => Err(unsupported("null")),
        Value::Array(_) => Err(unsupported("an array")),
        Value::Object(_) => Err(unsupported("an object")),
    }
}
