//! Health Routes

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use health_monitor::MonitorMode;
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

/// Current mode and probe counters
#[derive(Debug, Serialize)]
pub struct HealthStatusResponse {
    pub mode: MonitorMode,
    pub ai_service_healthy: bool,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_check_time: DateTime<Utc>,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub estimated_recovery: Option<u64>,
}

/// Fallback statistics plus uptime
#[derive(Debug, Serialize)]
pub struct FallbackStatsResponse {
    pub total_checks: u64,
    pub total_failures: u64,
    pub total_fallback_events: u64,
    pub total_fallback_duration: f64,
    pub current_fallback_duration: Option<u64>,
    pub failure_rate: f64,
    pub uptime_rate: f64,
}

/// Lightweight liveness answer for load balancers
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: &'static str,
    pub mode: MonitorMode,
    pub ai_service_healthy: bool,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Get health status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<HealthStatusResponse> {
    let status = state.monitor.get_health_status();

    Json(HealthStatusResponse {
        mode: status.mode,
        ai_service_healthy: status.ai_service_healthy,
        consecutive_failures: status.consecutive_failures,
        consecutive_successes: status.consecutive_successes,
        last_check_time: status.last_check_time,
        last_failure_time: status.last_failure_time,
        estimated_recovery: status.estimated_recovery,
    })
}

/// Get fallback statistics
pub async fn get_fallback_stats(State(state): State<Arc<AppState>>) -> Json<FallbackStatsResponse> {
    let stats = state.monitor.get_health_status().fallback_statistics;

    Json(FallbackStatsResponse {
        uptime_rate: 1.0 - stats.failure_rate,
        total_checks: stats.total_checks,
        total_failures: stats.total_failures,
        total_fallback_events: stats.total_fallback_events,
        total_fallback_duration: stats.total_fallback_duration,
        current_fallback_duration: stats.current_fallback_duration,
        failure_rate: stats.failure_rate,
    })
}

/// Simple health check
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthCheckResponse> {
    let status = state.monitor.get_health_status();

    Json(HealthCheckResponse {
        status: match status.mode {
            MonitorMode::Normal => "healthy",
            MonitorMode::Fallback => "degraded",
        },
        mode: status.mode,
        ai_service_healthy: status.ai_service_healthy,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}
