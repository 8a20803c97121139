//! Web application router and middleware setup.

use crate::web::config::WebConfig;
use crate::web::handlers::{self, AppState};
use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the axum application with all routes and middleware.
pub fn create_app(state: AppState, config: &WebConfig) -> Router {
    let mut app = Router::new()
        .route("/", get(handlers::index))
        .route("/metrics", get(handlers::metrics))
        .route("/api/snapshot", get(handlers::get_snapshot))
        .route("/api/health", get(handlers::health_check))
        .with_state(state);

    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExporterError, Result};
    use crate::metrics::data::{Device, DeviceLocation, DeviceReading, MetricKind};
    use crate::metrics::mapper::ValueMapper;
    use crate::metrics::{DeviceTelemetry, TelemetryBackend};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct OneDevice {
        fail: bool,
    }

    impl TelemetryBackend for OneDevice {
        fn name(&self) -> &'static str {
            "one"
        }

        fn discover(&self) -> Result<Vec<Device>> {
            Ok(vec![Device {
                index: 0,
                uuid: "DCU-0".into(),
                serial: String::new(),
                product_name: "Hygon DCU".into(),
                firmware_version: String::new(),
                location: DeviceLocation::SmiRow { row: 0 },
            }])
        }

        fn acquire(&self, _roster: &[Device]) -> Result<Vec<DeviceReading>> {
            if self.fail {
                return Err(ExporterError::tool_unavailable("hy-smi"));
            }
            Ok(vec![DeviceReading {
                average_power_watts: 259.0,
                ..Default::default()
            }])
        }
    }

    fn app(fail: bool) -> Router {
        let telemetry = DeviceTelemetry::new(
            Box::new(OneDevice { fail }),
            ValueMapper::new("node-1", false),
            vec![MetricKind::AveragePower],
        )
        .unwrap();
        let state = AppState::new(Arc::new(telemetry), Duration::from_secs(5), "hygon");
        create_app(state, &WebConfig::default())
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (status, body) = get(app(false), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("# TYPE hygon_power_watts gauge"));
        assert!(body.contains("hostname=\"node-1\"} 259\n"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint_reports_failure() {
        let (status, _) = get(app(true), "/metrics").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health_and_index() {
        let (status, body) = get(app(true), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        let health: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["devices"], 1);

        let (status, body) = get(app(false), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("1 devices via one"));
    }

    #[tokio::test]
    async fn test_snapshot_endpoint() {
        let (status, body) = get(app(false), "/api/snapshot").await;
        assert_eq!(status, StatusCode::OK);
        let snapshot: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(snapshot["backend"], "one");
        assert_eq!(snapshot["devices"][0]["labels"]["device"], "hygon0");
    }
}
