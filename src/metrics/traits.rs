//! Capability traits implemented by the telemetry backends.

use crate::error::Result;
use crate::metrics::data::{Device, DeviceReading, SmiRow};

/// A raw-data source able to enumerate devices and read them.
///
/// Implementations perform blocking I/O and hold no state between calls,
/// so one instance can serve concurrent scrapes.
pub trait TelemetryBackend: Send + Sync {
    /// Short backend name used in logs and snapshots.
    fn name(&self) -> &'static str;

    /// Enumerate physical devices. Called once at startup.
    fn discover(&self) -> Result<Vec<Device>>;

    /// Read fresh values for every device of the roster.
    ///
    /// The returned vector is parallel to `roster`. A device whose values
    /// cannot be read yields a default reading rather than an error; an
    /// error means the backend produced no data at all.
    fn acquire(&self, roster: &[Device]) -> Result<Vec<DeviceReading>>;
}

/// Source of typed device rows from the vendor diagnostic tool.
///
/// Alternate table grammars or tool versions plug in here without
/// touching the backend that consumes the rows.
pub trait RowSource: Send + Sync {
    /// Run the tool once and return all rows that parsed.
    fn acquire(&self) -> Result<Vec<SmiRow>>;

    /// Whether the tool can be launched at all.
    fn is_available(&self) -> bool;
}
