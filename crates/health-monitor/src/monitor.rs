//! Health Monitor Service

use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::probe::{AiProbe, ProbeError};
use crate::state::{HealthStatus, ModeTransition, MonitorState};

struct MonitorTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Circuit breaker around the AI review service
///
/// One background task runs checks back to back with `check_interval`
/// between them. Readers take a snapshot under the state lock, which is
/// never held across the probe.
pub struct HealthMonitor {
    config: MonitorConfig,
    probe: Box<dyn AiProbe>,
    state: Mutex<MonitorState>,
    task: tokio::sync::Mutex<Option<MonitorTask>>,
}

impl HealthMonitor {
    /// Create a monitor in normal mode
    pub fn new(config: MonitorConfig, probe: Box<dyn AiProbe>) -> Self {
        info!(
            interval_secs = config.check_interval_secs,
            failure_threshold = config.failure_threshold,
            recovery_threshold = config.recovery_threshold,
            "Creating health monitor"
        );
        let state = MonitorState::new(config.failure_threshold, config.recovery_threshold);
        Self {
            config,
            probe,
            state: Mutex::new(state),
            task: tokio::sync::Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Probe the AI service once; every failure folds into `false`
    pub async fn check_ai_health(&self) -> bool {
        let timeout = self.config.probe_timeout();
        let outcome = match tokio::time::timeout(timeout, self.probe.probe()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProbeError::Timeout(timeout)),
        };

        match outcome {
            Ok(()) => {
                debug!("AI service health check passed");
                true
            }
            Err(e @ ProbeError::Request(_)) => {
                error!(error = %e, "AI service health check error");
                false
            }
            Err(e) => {
                warn!(error = %e, "AI service health check failed");
                false
            }
        }
    }

    /// Run one check and apply its outcome to the state machine
    pub async fn perform_health_check(&self) {
        self.state().begin_check(Utc::now());
        metrics::counter!("health_checks_total").increment(1);

        let healthy = self.check_ai_health().await;

        let transition = {
            let mut state = self.state();
            if healthy {
                state.record_success(Instant::now())
            } else {
                state.record_failure(Instant::now(), Utc::now())
            }
        };

        if !healthy {
            metrics::counter!("health_check_failures_total").increment(1);
        }

        match transition {
            Some(ModeTransition::EnteredFallback { consecutive_failures }) => {
                warn!(consecutive_failures, "Switching to fallback mode");
                metrics::counter!("fallback_events_total").increment(1);
                metrics::gauge!("fallback_mode").set(1.0);
            }
            Some(ModeTransition::Recovered {
                consecutive_successes,
                fallback_duration,
            }) => {
                info!(
                    consecutive_successes,
                    "Switching back to normal mode after {:.1}s in fallback",
                    fallback_duration.as_secs_f64()
                );
                metrics::gauge!("fallback_mode").set(0.0);
            }
            None => {}
        }
    }

    /// Start the periodic check task
    pub async fn start_monitoring(self: &Arc<Self>) {
        let mut slot = self.task.lock().await;
        if slot.is_some() {
            warn!("Health monitoring already running");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(self).monitoring_loop(cancel.clone()));
        *slot = Some(MonitorTask { cancel, handle });
        info!("Health monitoring started");
    }

    /// Cancel the periodic task and wait for it to finish
    pub async fn stop_monitoring(&self) {
        let task = self.task.lock().await.take();
        let Some(task) = task else {
            return;
        };

        task.cancel.cancel();
        if let Err(e) = task.handle.await {
            error!(error = %e, "Health monitoring task panicked");
        }
        info!("Health monitoring stopped");
    }

    /// Whether the periodic task is running
    pub async fn is_monitoring(&self) -> bool {
        self.task.lock().await.is_some()
    }

    async fn monitoring_loop(self: Arc<Self>, cancel: CancellationToken) {
        let interval = self.config.check_interval();
        info!("Health monitoring loop running every {:?}", interval);

        loop {
            // Dropping the check future also drops any in-flight probe
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.perform_health_check() => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        debug!("Health monitoring loop exited");
    }

    pub fn is_fallback_mode(&self) -> bool {
        self.state().is_fallback()
    }

    /// Seconds until recovery is expected, `None` in normal mode
    pub fn get_estimated_recovery_time(&self) -> Option<u64> {
        self.is_fallback_mode().then(|| self.config.estimated_recovery_secs())
    }

    /// Consistent snapshot of mode and counters
    pub fn get_health_status(&self) -> HealthStatus {
        self.state()
            .snapshot(Instant::now(), Utc::now(), Some(self.config.estimated_recovery_secs()))
    }
}
