//! Review Guard API Server
//!
//! Administrative REST API over the health monitor and local rules, plus
//! the local validation endpoint used by the document review workflow.

use anyhow::Context as _;
use axum::{
    extract::State,
    routing::{get, post, put},
    Router,
};
use health_monitor::{HealthMonitor, HttpProbe};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use rule_engine::ValidationEngine;
use rule_store::RuleStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_governor::GovernorLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod error;
mod rate_limit;
mod routes;
mod settings;

pub use error::{ApiError, ApiResult};
pub use rate_limit::{create_governor_config, AdminGovernorConfig, RateLimitConfig};
pub use routes::documents::FALLBACK_NOTICE;
pub use settings::{AiSettings, LogSettings, RulesSettings, ServerSettings, Settings};

/// Application state shared across handlers
pub struct AppState {
    pub monitor: Arc<HealthMonitor>,
    pub store: Arc<RuleStore>,
    pub engine: Arc<ValidationEngine>,
    /// Upper bound for one local validation
    pub local_validation_timeout: Duration,
    /// Prometheus handle, absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(
        monitor: Arc<HealthMonitor>,
        store: Arc<RuleStore>,
        engine: Arc<ValidationEngine>,
        local_validation_timeout: Duration,
    ) -> Self {
        Self {
            monitor,
            store,
            engine,
            local_validation_timeout,
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }

    /// Attach a Prometheus handle for `/metrics`
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    build_router(state, None)
}

/// Create the router with the mutating admin routes rate limited
pub fn create_rate_limited_router(state: Arc<AppState>, limit: Arc<AdminGovernorConfig>) -> Router {
    build_router(state, Some(limit))
}

fn build_router(state: Arc<AppState>, admin_limit: Option<Arc<AdminGovernorConfig>>) -> Router {
    let mut admin_writes = Router::new()
        .route("/api/v1/admin/rules/:rule_id/toggle", put(routes::rules::toggle_rule))
        .route("/api/v1/admin/rules/reload", post(routes::rules::reload_rules))
        .route("/api/v1/admin/rules/rollback", post(routes::rules::rollback_rules));
    if let Some(config) = admin_limit {
        admin_writes = admin_writes.layer(GovernorLayer { config });
    }

    Router::new()
        .route("/api/v1/health/status", get(routes::health::get_status))
        .route("/api/v1/health/fallback-stats", get(routes::health::get_fallback_stats))
        .route("/api/v1/health/check", get(routes::health::health_check))
        .route("/api/v1/admin/rules/list", get(routes::rules::list_rules))
        .route("/api/v1/admin/rules/performance", get(routes::rules::get_performance))
        .route("/api/v1/admin/rules/statistics", get(routes::rules::get_statistics))
        .route("/api/v1/admin/rules/templates", get(routes::rules::get_templates))
        .route("/api/v1/documents/validate", post(routes::documents::validate_document))
        .route("/metrics", get(metrics_handler))
        .merge(admin_writes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Prometheus exposition
async fn metrics_handler(State(state): State<Arc<AppState>>) -> ApiResult<String> {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .ok_or_else(|| ApiError::Unavailable("Metrics recorder not installed".to_string()))
}

/// Initialize logging
///
/// `RUST_LOG` overrides the configured level.
pub fn init_logging(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wire up the services and serve until Ctrl-C or SIGTERM
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let store = Arc::new(RuleStore::new(settings.rules.config_path.clone()));
    if let Err(e) = store.load_config() {
        warn!(error = %e, "Starting without local rules, fix the rules config and reload");
    }
    if settings.rules.auto_reload {
        if let Err(e) = store.start_watching().await {
            warn!(error = %e, "Rules config watcher not started, manual reload only");
        }
    }
    let engine = Arc::new(ValidationEngine::new(Arc::clone(&store)));

    let probe = HttpProbe::new(
        &settings.ai.api_base,
        settings.ai.api_key.clone(),
        settings.monitor.probe_timeout(),
    )
    .context("Failed to build AI health probe")?;
    let monitor = Arc::new(HealthMonitor::new(settings.monitor.clone(), Box::new(probe)));
    if settings.fallback_enabled {
        monitor.start_monitoring().await;
    } else {
        info!("Fallback disabled, health monitoring not started");
    }

    let state = Arc::new(
        AppState::new(
            Arc::clone(&monitor),
            Arc::clone(&store),
            engine,
            settings.rules.local_validation_timeout(),
        )
        .with_metrics(prometheus),
    );
    let limit = create_governor_config(&settings.rate_limit).context("Invalid rate limit settings")?;
    let app = create_rate_limited_router(state, limit);

    info!("Starting API server on {}", settings.server.addr);
    let listener = tokio::net::TcpListener::bind(&settings.server.addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.server.addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped accepting connections, cleaning up");
    monitor.stop_monitoring().await;
    store.stop_watching().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C, starting graceful shutdown"),
        () = terminate => info!("Received SIGTERM, starting graceful shutdown"),
    }
}
