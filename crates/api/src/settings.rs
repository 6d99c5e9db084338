//! Service Settings
//!
//! Loaded from an optional TOML file layered under `REVIEW_GUARD__*`
//! environment variables, e.g. `REVIEW_GUARD__MONITOR__FAILURE_THRESHOLD=5`.

use config::{Config, ConfigError, Environment, File};
use health_monitor::MonitorConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::rate_limit::RateLimitConfig;

/// Env var naming an alternative settings file
pub const CONFIG_PATH_ENV: &str = "REVIEW_GUARD_CONFIG";

/// Settings file used when `REVIEW_GUARD_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "config/review-guard.toml";

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// External AI provider settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    pub api_base: String,
    pub api_key: String,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.deepseek.com/v1".to_string(),
            api_key: String::new(),
        }
    }
}

/// Local rules settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RulesSettings {
    /// Rules document path
    pub config_path: PathBuf,
    /// Watch the rules document and reload on change
    pub auto_reload: bool,
    /// Upper bound for one local validation (seconds)
    pub local_validation_timeout_secs: u64,
}

impl Default for RulesSettings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/validation_rules.json"),
            auto_reload: true,
            local_validation_timeout_secs: 3,
        }
    }
}

impl RulesSettings {
    pub fn local_validation_timeout(&self) -> Duration {
        Duration::from_secs(self.local_validation_timeout_secs)
    }
}

/// Logging settings; `RUST_LOG` takes precedence over `level`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top level settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub ai: AiSettings,
    pub monitor: MonitorConfig,
    pub rules: RulesSettings,
    /// Run the health monitor; when off the service stays in normal mode
    pub fallback_enabled: bool,
    pub rate_limit: RateLimitConfig,
    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            ai: AiSettings::default(),
            monitor: MonitorConfig::default(),
            rules: RulesSettings::default(),
            fallback_enabled: true,
            rate_limit: RateLimitConfig::default(),
            log: LogSettings::default(),
        }
    }
}

impl Settings {
    /// Load from `REVIEW_GUARD_CONFIG` (or the default file) plus env
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    /// Load from a specific file plus env; a missing file is not an error
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("REVIEW_GUARD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
