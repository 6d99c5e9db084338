//! Rule Administration Routes

use axum::{
    extract::{Path, State},
    Json,
};
use rule_engine::{EngineMetrics, RuleStatistics};
use rule_store::{ConfigInfo, RuleCategory, RuleType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Rule summary for listings
#[derive(Debug, Serialize)]
pub struct RuleInfo {
    pub id: String,
    pub name: String,
    pub category: RuleCategory,
    pub priority: u8,
    pub enabled: bool,
    pub critical: bool,
    pub rule_type: RuleType,
    pub description: String,
}

/// Response for the rule listing
#[derive(Debug, Serialize)]
pub struct RulesListResponse {
    pub total_rules: usize,
    pub enabled_rules: usize,
    pub disabled_rules: usize,
    pub rules: Vec<RuleInfo>,
}

/// Response for the template listing
#[derive(Debug, Serialize)]
pub struct TemplatesResponse {
    pub count: usize,
    pub templates: Vec<Value>,
}

/// Request body for toggling a rule
#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

/// Outcome of an administrative rule operation
#[derive(Debug, Serialize)]
pub struct RuleActionResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_info: Option<ConfigInfo>,
}

/// List all rules of the active config
pub async fn list_rules(State(state): State<Arc<AppState>>) -> Json<RulesListResponse> {
    let rules: Vec<RuleInfo> = state
        .store
        .list_rules()
        .into_iter()
        .map(|rule| RuleInfo {
            rule_type: rule.rule_type(),
            id: rule.id,
            name: rule.name,
            category: rule.category,
            priority: rule.priority,
            enabled: rule.enabled,
            critical: rule.critical,
            description: rule.description,
        })
        .collect();

    let enabled = rules.iter().filter(|r| r.enabled).count();

    Json(RulesListResponse {
        total_rules: rules.len(),
        enabled_rules: enabled,
        disabled_rules: rules.len() - enabled,
        rules,
    })
}

/// Engine and per-rule performance metrics
pub async fn get_performance(State(state): State<Arc<AppState>>) -> Json<EngineMetrics> {
    Json(state.engine.get_performance_metrics())
}

/// Rule statistics by category
pub async fn get_statistics(State(state): State<Arc<AppState>>) -> Json<RuleStatistics> {
    Json(state.engine.get_rule_statistics())
}

/// Rule templates of the active config
pub async fn get_templates(State(state): State<Arc<AppState>>) -> Json<TemplatesResponse> {
    let templates = state.store.get_rule_templates();
    Json(TemplatesResponse {
        count: templates.len(),
        templates,
    })
}

/// Enable or disable a rule without restarting
pub async fn toggle_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<String>,
    Json(request): Json<ToggleRequest>,
) -> ApiResult<Json<RuleActionResponse>> {
    if !state.store.toggle_rule(&rule_id, request.enabled) {
        return Err(ApiError::NotFound(format!("Rule {rule_id} not found")));
    }

    let action = if request.enabled { "enabled" } else { "disabled" };
    Ok(Json(RuleActionResponse {
        success: true,
        message: format!("Rule {rule_id} {action}"),
        config_info: None,
    }))
}

/// Reload the rules document from disk
pub async fn reload_rules(State(state): State<Arc<AppState>>) -> ApiResult<Json<RuleActionResponse>> {
    info!("Manual rules reload requested");
    let store = Arc::clone(&state.store);
    let reloaded = tokio::task::spawn_blocking(move || store.reload_config())
        .await
        .map_err(|e| ApiError::Internal(format!("Reload task failed: {e}")))?;

    if !reloaded {
        return Err(ApiError::Internal(format!(
            "Failed to reload rules config from {}, keeping the current config",
            state.store.config_path().display()
        )));
    }

    Ok(Json(RuleActionResponse {
        success: true,
        message: "Rules config reloaded".to_string(),
        config_info: Some(state.store.get_config_info()),
    }))
}

/// Swap the previous rules config back in
pub async fn rollback_rules(State(state): State<Arc<AppState>>) -> ApiResult<Json<RuleActionResponse>> {
    if !state.store.rollback_config() {
        return Err(ApiError::Conflict("No previous rules config to roll back to".to_string()));
    }

    Ok(Json(RuleActionResponse {
        success: true,
        message: "Rules config rolled back".to_string(),
        config_info: Some(state.store.get_config_info()),
    }))
}
