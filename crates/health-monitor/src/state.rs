//! Monitor State Machine
//!
//! Pure state: counters, timestamps and the normal/fallback mode. The
//! monitor owns one instance behind a lock and feeds it probe outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Operating mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    /// Validation is delegated to the AI service
    #[default]
    Normal,
    /// Local rules are used instead
    Fallback,
}

impl MonitorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorMode::Normal => "normal",
            MonitorMode::Fallback => "fallback",
        }
    }
}

/// A mode change caused by a check outcome
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModeTransition {
    EnteredFallback { consecutive_failures: u32 },
    Recovered { consecutive_successes: u32, fallback_duration: Duration },
}

/// Cumulative fallback statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackStatistics {
    pub total_checks: u64,
    pub total_failures: u64,
    pub total_fallback_events: u64,
    /// Seconds spent in fallback across completed episodes
    pub total_fallback_duration: f64,
    /// Whole seconds into the current episode, if in fallback
    pub current_fallback_duration: Option<u64>,
    pub failure_rate: f64,
}

/// Point-in-time view of the monitor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub mode: MonitorMode,
    pub ai_service_healthy: bool,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_check_time: DateTime<Utc>,
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Seconds until recovery is expected, if in fallback
    pub estimated_recovery: Option<u64>,
    pub fallback_statistics: FallbackStatistics,
}

/// Hysteresis state machine
#[derive(Debug, Clone)]
pub struct MonitorState {
    failure_threshold: u32,
    recovery_threshold: u32,
    mode: MonitorMode,
    ai_service_healthy: bool,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_check_time: Option<DateTime<Utc>>,
    last_failure_time: Option<DateTime<Utc>>,
    fallback_started: Option<Instant>,
    total_checks: u64,
    total_failures: u64,
    total_fallback_events: u64,
    total_fallback_duration: Duration,
}

impl MonitorState {
    /// Fresh state in normal mode
    pub fn new(failure_threshold: u32, recovery_threshold: u32) -> Self {
        Self {
            failure_threshold,
            recovery_threshold,
            mode: MonitorMode::Normal,
            ai_service_healthy: true,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_check_time: None,
            last_failure_time: None,
            fallback_started: None,
            total_checks: 0,
            total_failures: 0,
            total_fallback_events: 0,
            total_fallback_duration: Duration::ZERO,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.mode == MonitorMode::Fallback
    }

    pub fn total_fallback_events(&self) -> u64 {
        self.total_fallback_events
    }

    /// Count a check that is about to probe
    pub fn begin_check(&mut self, now: DateTime<Utc>) {
        self.total_checks += 1;
        self.last_check_time = Some(now);
    }

    /// Apply a healthy probe outcome
    pub fn record_success(&mut self, now: Instant) -> Option<ModeTransition> {
        self.ai_service_healthy = true;
        self.consecutive_failures = 0;
        self.consecutive_successes += 1;

        if self.mode == MonitorMode::Fallback && self.consecutive_successes >= self.recovery_threshold {
            let fallback_duration = self
                .fallback_started
                .take()
                .map(|started| now.saturating_duration_since(started))
                .unwrap_or_default();
            self.total_fallback_duration += fallback_duration;
            self.mode = MonitorMode::Normal;
            return Some(ModeTransition::Recovered {
                consecutive_successes: self.consecutive_successes,
                fallback_duration,
            });
        }
        None
    }

    /// Apply an unhealthy probe outcome
    pub fn record_failure(&mut self, now: Instant, wall_now: DateTime<Utc>) -> Option<ModeTransition> {
        self.ai_service_healthy = false;
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;
        self.total_failures += 1;
        self.last_failure_time = Some(wall_now);

        if self.mode == MonitorMode::Normal && self.consecutive_failures >= self.failure_threshold {
            self.mode = MonitorMode::Fallback;
            self.fallback_started = Some(now);
            self.total_fallback_events += 1;
            return Some(ModeTransition::EnteredFallback {
                consecutive_failures: self.consecutive_failures,
            });
        }
        None
    }

    /// Coherent snapshot of every counter
    pub fn snapshot(&self, now: Instant, wall_now: DateTime<Utc>, estimated_recovery: Option<u64>) -> HealthStatus {
        let failure_rate = if self.total_checks == 0 {
            0.0
        } else {
            self.total_failures as f64 / self.total_checks as f64
        };

        HealthStatus {
            mode: self.mode,
            ai_service_healthy: self.ai_service_healthy,
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
            last_check_time: self.last_check_time.unwrap_or(wall_now),
            last_failure_time: self.last_failure_time,
            estimated_recovery: if self.is_fallback() { estimated_recovery } else { None },
            fallback_statistics: FallbackStatistics {
                total_checks: self.total_checks,
                total_failures: self.total_failures,
                total_fallback_events: self.total_fallback_events,
                total_fallback_duration: self.total_fallback_duration.as_secs_f64(),
                current_fallback_duration: self
                    .fallback_started
                    .map(|started| now.saturating_duration_since(started).as_secs()),
                failure_rate,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fail(state: &mut MonitorState) -> Option<ModeTransition> {
        state.begin_check(Utc::now());
        state.record_failure(Instant::now(), Utc::now())
    }

    fn succeed(state: &mut MonitorState) -> Option<ModeTransition> {
        state.begin_check(Utc::now());
        state.record_success(Instant::now())
    }

    #[test]
    fn test_fallback_after_threshold_failures() {
        let mut state = MonitorState::new(3, 2);

        assert_eq!(fail(&mut state), None);
        assert_eq!(fail(&mut state), None);
        assert_eq!(
            fail(&mut state),
            Some(ModeTransition::EnteredFallback { consecutive_failures: 3 })
        );
        assert!(state.is_fallback());
        assert_eq!(state.total_fallback_events(), 1);
    }

    #[test]
    fn test_failures_beyond_threshold_do_not_reenter() {
        let mut state = MonitorState::new(3, 2);
        for _ in 0..10 {
            fail(&mut state);
        }
        assert_eq!(state.total_fallback_events(), 1);
    }

    #[test]
    fn test_recovery_resets_failures() {
        let mut state = MonitorState::new(3, 2);
        for _ in 0..3 {
            fail(&mut state);
        }
        assert_eq!(succeed(&mut state), None);
        assert!(state.is_fallback());
        assert!(matches!(
            succeed(&mut state),
            Some(ModeTransition::Recovered { consecutive_successes: 2, .. })
        ));

        let status = state.snapshot(Instant::now(), Utc::now(), Some(60));
        assert_eq!(status.mode, MonitorMode::Normal);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.estimated_recovery, None);
        assert_eq!(status.fallback_statistics.current_fallback_duration, None);
    }

    #[test]
    fn test_interrupted_recovery_streak() {
        let mut state = MonitorState::new(3, 2);
        for _ in 0..3 {
            fail(&mut state);
        }
        succeed(&mut state);
        fail(&mut state);
        succeed(&mut state);
        assert!(state.is_fallback());
        succeed(&mut state);
        assert!(!state.is_fallback());
    }

    #[test]
    fn test_snapshot_rates() {
        let mut state = MonitorState::new(3, 2);
        let now = Utc::now();
        let fresh = state.snapshot(Instant::now(), now, None);
        assert_eq!(fresh.fallback_statistics.failure_rate, 0.0);
        assert_eq!(fresh.last_check_time, now);
        assert!(fresh.ai_service_healthy);

        fail(&mut state);
        succeed(&mut state);
        succeed(&mut state);
        fail(&mut state);
        let status = state.snapshot(Instant::now(), Utc::now(), None);
        assert_eq!(status.fallback_statistics.total_checks, 4);
        assert_eq!(status.fallback_statistics.total_failures, 2);
        assert!((status.fallback_statistics.failure_rate - 0.5).abs() < f64::EPSILON);
        assert!(status.last_failure_time.is_some());
    }

    #[test]
    fn test_mode_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&MonitorMode::Fallback).unwrap(), "\"fallback\"");
    }

    proptest! {
        #[test]
        fn prop_transitions_follow_streaks(
            failure_threshold in 1u32..6,
            recovery_threshold in 1u32..6,
            outcomes in proptest::collection::vec(any::<bool>(), 0..200),
        ) {
            let mut state = MonitorState::new(failure_threshold, recovery_threshold);
            let mut fallback = false;
            let mut failures = 0u32;
            let mut successes = 0u32;
            let mut entries = 0u64;

            for healthy in outcomes {
                let transition = if healthy { succeed(&mut state) } else { fail(&mut state) };

                if healthy {
                    failures = 0;
                    successes += 1;
                } else {
                    successes = 0;
                    failures += 1;
                }
                let expected = if !fallback && !healthy && failures >= failure_threshold {
                    fallback = true;
                    entries += 1;
                    true
                } else if fallback && healthy && successes >= recovery_threshold {
                    fallback = false;
                    true
                } else {
                    false
                };

                prop_assert_eq!(transition.is_some(), expected);
                prop_assert_eq!(state.is_fallback(), fallback);
            }
            prop_assert_eq!(state.total_fallback_events(), entries);
        }
    }
}
