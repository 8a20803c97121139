//! # DCU Exporter - Hygon DCU telemetry for Prometheus
//!
//! Discovers Hygon DCU accelerators and exposes their temperature, power,
//! memory, utilization and mode readings as Prometheus gauges.
//!
//! Two raw-data backends are supported:
//!
//! - **sysfs**: kernel attribute files under `/sys/class/drm/card<N>`
//! - **hy-smi**: the tabular output of the vendor `hy-smi` tool
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dcu_exporter::{DeviceTelemetry, ExporterConfig};
//!
//! fn main() -> dcu_exporter::Result<()> {
//!     let config = ExporterConfig::default();
//!     let telemetry = DeviceTelemetry::from_config(&config)?;
//!     let snapshot = telemetry.snapshot()?;
//!     println!("{}", dcu_exporter::web::exposition::render(&snapshot, &config.namespace));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod web;

// Re-export public API
pub use config::{BackendKind, ExporterConfig};
pub use error::{ExporterError, Result};
pub use metrics::{
    collector::DeviceTelemetry,
    data::{Device, DeviceReading, DeviceSnapshot, MetricKind, TelemetrySnapshot},
    traits::{RowSource, TelemetryBackend},
};
pub use web::{start_web_server, WebConfig};

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 9400;

/// Prefix of every exported series name
pub const DEFAULT_NAMESPACE: &str = "hygon";

/// Upper bound on one scrape-driven acquisition, in milliseconds
pub const DEFAULT_SCRAPE_TIMEOUT_MS: u64 = 10_000;
