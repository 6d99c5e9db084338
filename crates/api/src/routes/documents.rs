//! Document Validation Routes
//!
//! The document review workflow asks here for a local validation when the
//! AI service is unavailable. In normal mode the caller is told to use the
//! AI review path unless it explicitly forces local rules.

use axum::{extract::State, Json};
use rule_engine::{Context, ValidationResult};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Notice attached to results produced in fallback mode
pub const FALLBACK_NOTICE: &str = "AI service currently unavailable, using local rules for basic validation";

/// Request body for local validation
#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    /// Extracted document text
    pub content: String,
    /// Structured metadata, e.g. parsed title or issuer
    #[serde(default)]
    pub metadata: Option<Context>,
    /// Use local rules even when the AI service is healthy
    #[serde(default)]
    pub force_local: bool,
}

/// Validate a document with the local rules
pub async fn validate_document(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ValidateRequest>,
) -> ApiResult<Json<ValidationResult>> {
    let fallback = state.monitor.is_fallback_mode();
    if !fallback && !request.force_local {
        return Err(ApiError::Conflict(
            "AI service is available, submit the document for AI review".to_string(),
        ));
    }

    if fallback {
        info!("Validating document in fallback mode");
    }

    let engine = Arc::clone(&state.engine);
    let estimated_recovery = state.monitor.get_estimated_recovery_time();
    let limit = state.local_validation_timeout;
    // A validation still running when the request times out is not counted
    let deadline = Instant::now() + limit;
    let task = tokio::task::spawn_blocking(move || {
        let result = engine.validate_before(&request.content, request.metadata.as_ref(), deadline)?;
        Some(if fallback {
            result.in_fallback(FALLBACK_NOTICE, estimated_recovery)
        } else {
            result
        })
    });

    match tokio::time::timeout(limit, task).await {
        Ok(Ok(Some(result))) => Ok(Json(result)),
        Ok(Err(e)) => Err(ApiError::Internal(format!("Validation task failed: {e}"))),
        Ok(Ok(None)) | Err(_) => {
            warn!(timeout_secs = limit.as_secs(), "Local validation timed out");
            Err(ApiError::Timeout(limit))
        }
    }
}
