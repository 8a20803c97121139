//! Device discovery, raw-data backends and metric value mapping.
//!
//! Two backends feed the same normalized [`data::DeviceReading`]: kernel
//! attribute files under sysfs, and the table printed by `hy-smi`.

pub mod collector;
pub mod data;
pub mod mapper;
pub mod smi;
pub mod sysfs;
pub mod traits;

// Re-export commonly used items
pub use collector::DeviceTelemetry;
pub use data::{DeviceSnapshot, MetricKind, TelemetrySnapshot};
pub use traits::{RowSource, TelemetryBackend};
