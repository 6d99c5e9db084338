//! Rule Store
//!
//! Loads, validates and hot-reloads the versioned set of document
//! validation rules used while the AI review service is unavailable.

mod config;
mod error;
mod rule;
mod store;
mod watcher;

pub use config::RulesConfig;
pub use error::RuleConfigError;
pub use rule::{ErrorLevel, ErrorType, KeywordMode, Pattern, Rule, RuleCategory, RuleKind, RuleType};
pub use store::{ConfigInfo, RuleStore};
pub use watcher::{Debouncer, DEBOUNCE_WINDOW};
