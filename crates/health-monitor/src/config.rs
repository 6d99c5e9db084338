//! Monitor Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Health monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between health checks (default: 30)
    pub check_interval_secs: u64,
    /// Consecutive failures before entering fallback mode (default: 3)
    pub failure_threshold: u32,
    /// Consecutive successes before leaving fallback mode (default: 2)
    pub recovery_threshold: u32,
    /// Upper bound for a single probe in seconds (default: 5)
    pub probe_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            failure_threshold: 3,
            recovery_threshold: 2,
            probe_timeout_secs: 5,
        }
    }
}

impl MonitorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Heuristic recovery estimate once in fallback mode
    pub fn estimated_recovery_secs(&self) -> u64 {
        self.check_interval_secs * u64::from(self.recovery_threshold)
    }
}
