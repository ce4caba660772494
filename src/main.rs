use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rewind_server::config::{CompensationConfig, SessionConfig};
use rewind_server::metrics::{self, Metrics};
use rewind_server::session::Session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Rewind Server v{}", env!("CARGO_PKG_VERSION"));

    let compensation = CompensationConfig::load_or_default();
    let session_config = SessionConfig::load_or_default();

    let metrics = Arc::new(Metrics::new());

    let metrics_clone = metrics.clone();
    let metrics_port = session_config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let session = Session::start(compensation, session_config, metrics)?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    session.stop().await;
    info!("Server stopped");

    Ok(())
}
