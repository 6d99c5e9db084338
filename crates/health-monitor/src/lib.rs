//! AI Service Health Monitor
//!
//! Periodically probes the external AI review service and switches
//! between normal and fallback mode using independent failure and
//! recovery thresholds.

mod config;
mod monitor;
mod probe;
mod state;

pub use config::MonitorConfig;
pub use monitor::HealthMonitor;
pub use probe::{AiProbe, HttpProbe, ProbeError};
pub use state::{FallbackStatistics, HealthStatus, MonitorMode, MonitorState, ModeTransition};
