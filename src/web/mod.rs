//! HTTP surface of the exporter: Prometheus scrape endpoint plus a small JSON API.

pub mod config;
pub mod exposition;
pub mod handlers;
pub mod router;

// Re-export commonly used items
pub use config::WebConfig;
pub use handlers::AppState;
pub use router::create_app;

use crate::config::ExporterConfig;
use crate::error::{ExporterError, Result};
use crate::metrics::DeviceTelemetry;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Serve `telemetry` until the listener fails.
pub async fn start_web_server(
    config: WebConfig,
    telemetry: Arc<DeviceTelemetry>,
    exporter: &ExporterConfig,
) -> Result<()> {
    let state = AppState::new(
        telemetry,
        exporter.scrape_timeout,
        exporter.namespace.as_str(),
    );
    let app = create_app(state, &config);

    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| ExporterError::config_error(format!("Invalid bind address: {}", e)))?;

    info!("Starting Hygon DCU exporter on http://{}", addr);
    info!("Metrics endpoint: http://{}/metrics", addr);
    info!("API endpoint: http://{}/api/snapshot", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        ExporterError::web_server_error(format!("Failed to bind to address: {}", e))
    })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ExporterError::web_server_error(format!("Server error: {}", e)))?;

    Ok(())
}
