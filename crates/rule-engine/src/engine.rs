//! Validation Engine
//!
//! Runs the enabled rules of the current config against a document and
//! folds the per-rule results into one [`ValidationResult`].

use rule_store::{ConfigInfo, RuleStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::executor::{Context, PerformanceMetrics, RuleExecutor, RuleRunner, SlowRule, DEFAULT_SLOW_RULE_THRESHOLD};
use crate::result::ValidationResult;

/// Running totals across validations
#[derive(Debug, Default)]
struct EngineStats {
    validation_count: u64,
    total_execution_time: Duration,
}

/// Engine level performance report
#[derive(Debug, Clone, Serialize)]
pub struct EngineMetrics {
    pub total_validations: u64,
    /// Seconds spent validating across all calls
    pub total_execution_time: f64,
    pub average_execution_time: f64,
    pub rule_metrics: PerformanceMetrics,
    pub slow_rules: Vec<SlowRule>,
}

/// Enabled rule counts for one category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub count: usize,
    pub critical_count: usize,
}

/// Administrative overview of the rule set
#[derive(Debug, Clone, Serialize)]
pub struct RuleStatistics {
    pub config_info: ConfigInfo,
    pub enabled_rules_count: usize,
    pub category_statistics: BTreeMap<String, CategoryStats>,
    pub performance_metrics: EngineMetrics,
}

/// Local document validation engine
pub struct ValidationEngine<R = RuleExecutor> {
    store: Arc<RuleStore>,
    runner: R,
    stats: Mutex<EngineStats>,
}

impl ValidationEngine<RuleExecutor> {
    /// Create an engine backed by the default executor
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self::with_runner(store, RuleExecutor::new())
    }
}

impl<R: RuleRunner> ValidationEngine<R> {
    /// Create an engine with a custom rule runner
    pub fn with_runner(store: Arc<RuleStore>, runner: R) -> Self {
        info!("Initializing validation engine");
        Self {
            store,
            runner,
            stats: Mutex::new(EngineStats::default()),
        }
    }

    /// Validate a document against the enabled rules
    ///
    /// Never fails: an executor fault is reported as a single error entry.
    pub fn validate_document(&self, content: &str, metadata: Option<&Context>) -> ValidationResult {
        let (result, completed) = self.evaluate(content, metadata);
        if let Some(elapsed) = completed {
            self.record(&result, elapsed);
        }
        result
    }

    /// Validate a document, counting it only if it finishes before `deadline`
    ///
    /// Returns `None` once the deadline has passed, since the caller has
    /// already stopped waiting for the result.
    pub fn validate_before(
        &self,
        content: &str,
        metadata: Option<&Context>,
        deadline: Instant,
    ) -> Option<ValidationResult> {
        let (result, completed) = self.evaluate(content, metadata);
        if Instant::now() > deadline {
            warn!(
                rules_executed = result.rules_executed,
                "Validation finished after its deadline, result discarded"
            );
            return None;
        }
        if let Some(elapsed) = completed {
            self.record(&result, elapsed);
        }
        Some(result)
    }

    /// Run the rules; the duration is set only for a completed rule run
    fn evaluate(&self, content: &str, metadata: Option<&Context>) -> (ValidationResult, Option<Duration>) {
        let start = Instant::now();

        let rules = self.store.get_enabled_rules();
        if rules.is_empty() {
            info!("No enabled rules, skipping validation");
            return (ValidationResult::no_rules(), None);
        }

        let empty = Context::new();
        let context = metadata.unwrap_or(&empty);

        let results = match self.runner.execute_rules(&rules, content, context) {
            Ok(results) => results,
            Err(e) => {
                error!(error = %e, "Rule execution failed");
                return (ValidationResult::pipeline_failure(&e, start.elapsed()), None);
            }
        };

        let rules_executed = results.len();
        let errors: Vec<_> = results.into_iter().flat_map(|r| r.errors).collect();
        let elapsed = start.elapsed();
        let result = ValidationResult::from_errors(errors, elapsed, rules_executed);

        debug!(
            rules_executed,
            issues = result.errors.len(),
            success = result.success,
            "Document validated in {:.3}s",
            result.execution_time
        );
        (result, Some(elapsed))
    }

    /// Validate and mark the result as a fallback result
    pub fn validate_in_fallback(
        &self,
        content: &str,
        metadata: Option<&Context>,
        notice: impl Into<String>,
        estimated_recovery: Option<u64>,
    ) -> ValidationResult {
        self.validate_document(content, metadata)
            .in_fallback(notice, estimated_recovery)
    }

    fn record(&self, result: &ValidationResult, elapsed: Duration) {
        {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            stats.validation_count += 1;
            stats.total_execution_time += elapsed;
        }

        metrics::counter!(
            "rule_validations_total",
            "outcome" => if result.success { "passed" } else { "failed" }
        )
        .increment(1);
        metrics::histogram!("rule_validation_seconds").record(elapsed.as_secs_f64());
    }

    /// Aggregate timings for validations and rules
    pub fn get_performance_metrics(&self) -> EngineMetrics {
        let (count, total) = {
            let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            (stats.validation_count, stats.total_execution_time)
        };
        let average = if count == 0 {
            0.0
        } else {
            total.as_secs_f64() / count as f64
        };

        EngineMetrics {
            total_validations: count,
            total_execution_time: total.as_secs_f64(),
            average_execution_time: average,
            rule_metrics: self.runner.performance_metrics(),
            slow_rules: self.runner.slow_rules(DEFAULT_SLOW_RULE_THRESHOLD),
        }
    }

    /// Rule counts by category plus performance data
    pub fn get_rule_statistics(&self) -> RuleStatistics {
        let enabled = self.store.get_enabled_rules();

        let mut category_statistics: BTreeMap<String, CategoryStats> = BTreeMap::new();
        for rule in &enabled {
            let entry = category_statistics.entry(rule.category.as_str().to_string()).or_default();
            entry.count += 1;
            if rule.critical {
                entry.critical_count += 1;
            }
        }

        RuleStatistics {
            config_info: self.store.get_config_info(),
            enabled_rules_count: enabled.len(),
            category_statistics,
            performance_metrics: self.get_performance_metrics(),
        }
    }
}
