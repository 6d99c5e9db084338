//! Review Guard - Main Entry Point

use api::{init_logging, run_server, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_logging(&settings.log);

    info!("=== Review Guard v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        fallback_enabled = settings.fallback_enabled,
        rules = %settings.rules.config_path.display(),
        "Starting failure detection and local validation service"
    );

    run_server(settings).await
}
