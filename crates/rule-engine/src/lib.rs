//! Local Rule Engine
//!
//! Deterministic document validation used while the AI review service is
//! unavailable: ordered rule execution with critical short-circuit,
//! per-rule timing telemetry and result aggregation.

mod engine;
mod executor;
mod result;

pub use engine::{CategoryStats, EngineMetrics, RuleStatistics, ValidationEngine};
pub use executor::{
    Context, ExecutorError, PerformanceMetrics, RuleEvalError, RuleMetrics, RuleResult, RuleRunner,
    RuleExecutor, SlowRule, DEFAULT_SLOW_RULE_THRESHOLD,
};
pub use result::{Position, ValidationError, ValidationResult};
