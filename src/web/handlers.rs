//! HTTP handlers for the exporter endpoints.

use crate::error::ExporterError;
use crate::metrics::{DeviceTelemetry, TelemetrySnapshot};
use crate::web::exposition;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub telemetry: Arc<DeviceTelemetry>,
    pub scrape_timeout: Duration,
    pub namespace: Arc<str>,
}

impl AppState {
    pub fn new(
        telemetry: Arc<DeviceTelemetry>,
        scrape_timeout: Duration,
        namespace: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            telemetry,
            scrape_timeout,
            namespace: namespace.into(),
        }
    }

    async fn snapshot(&self) -> Result<TelemetrySnapshot, Response> {
        self.telemetry
            .clone()
            .collect_snapshot(self.scrape_timeout)
            .await
            .map_err(|e| {
                error!("Failed to collect snapshot: {}", e);
                error_response(&e)
            })
    }
}

fn error_response(err: &ExporterError) -> Response {
    let status = match err {
        ExporterError::Acquisition(_) | ExporterError::ToolUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}

/// Prometheus scrape endpoint; every request re-reads the devices.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.snapshot().await {
        Ok(snapshot) => (
            [(header::CONTENT_TYPE, exposition::CONTENT_TYPE)],
            exposition::render(&snapshot, &state.namespace),
        )
            .into_response(),
        Err(response) => response,
    }
}

/// Current snapshot as JSON.
pub async fn get_snapshot(State(state): State<AppState>) -> Response {
    match state.snapshot().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(response) => response,
    }
}

/// Health check endpoint. Does not touch the devices.
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "dcu-exporter",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.telemetry.backend_name(),
        "devices": state.telemetry.devices().len(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Landing page linking to the scrape endpoint.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Hygon DCU Exporter</title>
</head>
<body>
    <h1>Hygon DCU Exporter</h1>
    <p>Version {}: {} devices via {}</p>
    <ul>
        <li><a href="/metrics">/metrics</a></li>
        <li><a href="/api/snapshot">/api/snapshot</a></li>
        <li><a href="/api/health">/api/health</a></li>
    </ul>
</body>
</html>
"#,
        env!("CARGO_PKG_VERSION"),
        state.telemetry.devices().len(),
        state.telemetry.backend_name()
    ))
}
