//! Data structures for device identity, raw readings and snapshots.

use crate::error::ExporterError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Model name used when a backend exposes no product name.
pub const DEFAULT_MODEL_NAME: &str = "Hygon DCU";

/// Where a backend re-fetches a device's readings from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceLocation {
    /// Per-device sysfs directory and its hardware-monitor subdirectory
    Sysfs {
        device_path: PathBuf,
        hwmon_path: Option<PathBuf>,
    },
    /// Row position in the hy-smi table at discovery time.
    ///
    /// Informational only: later scrapes match rows by device index, since
    /// row order is not stable across tool runs.
    SmiRow { row: usize },
}

/// Identity record of one physical accelerator, fixed after discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Numeric device index (`cardN` or the tool's DCU column)
    pub index: u32,
    /// Vendor-assigned unique identifier
    pub uuid: String,
    /// Board serial number
    pub serial: String,
    /// Human-readable product name
    pub product_name: String,
    /// VBIOS / firmware version string
    pub firmware_version: String,
    /// Backend-specific location used to re-read the device
    pub location: DeviceLocation,
}

impl Device {
    /// Synthetic device name used as the `device` label.
    pub fn display_name(&self) -> String {
        format!("hygon{}", self.index)
    }
}

/// Hardware-monitor temperature inputs, in `temp1..temp3` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureSensor {
    Edge,
    Junction,
    Memory,
}

impl TemperatureSensor {
    /// Sensors in the positional order of `temp1_input`, `temp2_input`, `temp3_input`.
    pub const ALL: [TemperatureSensor; 3] = [Self::Edge, Self::Junction, Self::Memory];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edge => "edge",
            Self::Junction => "junction",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for TemperatureSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Performance level reported by the device.
///
/// Only `auto` is distinguished; every other token projects to the same
/// numeric value but is kept for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PerformanceMode {
    Auto,
    Other(String),
}

impl PerformanceMode {
    pub fn from_token(token: &str) -> Self {
        if token == "auto" {
            Self::Auto
        } else {
            Self::Other(token.to_string())
        }
    }

    pub fn as_token(&self) -> &str {
        match self {
            Self::Auto => "auto",
            Self::Other(token) => token,
        }
    }
}

impl From<String> for PerformanceMode {
    fn from(token: String) -> Self {
        Self::from_token(&token)
    }
}

impl From<PerformanceMode> for String {
    fn from(mode: PerformanceMode) -> Self {
        mode.as_token().to_string()
    }
}

/// Operating mode reported by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperatingMode {
    Normal,
    Other(String),
}

impl OperatingMode {
    pub fn from_token(token: &str) -> Self {
        if token == "Normal" {
            Self::Normal
        } else {
            Self::Other(token.to_string())
        }
    }

    pub fn as_token(&self) -> &str {
        match self {
            Self::Normal => "Normal",
            Self::Other(token) => token,
        }
    }
}

impl From<String> for OperatingMode {
    fn from(token: String) -> Self {
        Self::from_token(&token)
    }
}

impl From<OperatingMode> for String {
    fn from(mode: OperatingMode) -> Self {
        mode.as_token().to_string()
    }
}

/// Normalized values for one device from one poll.
///
/// Units are already converted: Celsius, Watts, bytes, percent, RPM.
/// Values a backend cannot provide stay at zero / `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceReading {
    /// Present temperature sensors only
    pub temperatures: Vec<(TemperatureSensor, f64)>,
    pub average_power_watts: f64,
    pub power_cap_watts: f64,
    pub vram_used_bytes: f64,
    pub vram_total_bytes: f64,
    pub vram_usage_percent: f64,
    pub utilization_percent: f64,
    pub memory_utilization_percent: f64,
    pub fan_speed_rpm: f64,
    pub performance: Option<PerformanceMode>,
    pub operating_mode: Option<OperatingMode>,
}

/// String fields captured from one line of hy-smi output, before conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTableRow {
    /// 1-based line number in the tool output
    pub line_number: usize,
    pub fields: Vec<String>,
}

/// One typed row of the hy-smi device table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmiRow {
    pub index: u32,
    pub temperature_celsius: f64,
    pub average_power_watts: f64,
    pub performance: PerformanceMode,
    pub power_cap_watts: f64,
    pub vram_usage_percent: f64,
    pub utilization_percent: f64,
    pub mode: OperatingMode,
}

/// The closed set of exportable metric kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    #[serde(rename = "temperature")]
    Temperature,
    #[serde(rename = "avg_power")]
    AveragePower,
    #[serde(rename = "power_cap")]
    PowerCap,
    #[serde(rename = "vram_used")]
    VramUsed,
    #[serde(rename = "vram_total")]
    VramTotal,
    #[serde(rename = "vram_usage_percent")]
    VramUsagePercent,
    #[serde(rename = "utilization")]
    Utilization,
    #[serde(rename = "memory_utilization")]
    MemoryUtilization,
    #[serde(rename = "fan_speed")]
    FanSpeed,
    #[serde(rename = "performance_mode")]
    PerformanceMode,
    #[serde(rename = "operating_mode")]
    OperatingMode,
    #[serde(rename = "device_info")]
    FirmwareVersion,
}

impl MetricKind {
    pub const ALL: [MetricKind; 12] = [
        Self::Temperature,
        Self::AveragePower,
        Self::PowerCap,
        Self::VramUsed,
        Self::VramTotal,
        Self::VramUsagePercent,
        Self::Utilization,
        Self::MemoryUtilization,
        Self::FanSpeed,
        Self::PerformanceMode,
        Self::OperatingMode,
        Self::FirmwareVersion,
    ];

    /// Name accepted by `FromStr` and the `--metrics` flag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::AveragePower => "avg_power",
            Self::PowerCap => "power_cap",
            Self::VramUsed => "vram_used",
            Self::VramTotal => "vram_total",
            Self::VramUsagePercent => "vram_usage_percent",
            Self::Utilization => "utilization",
            Self::MemoryUtilization => "memory_utilization",
            Self::FanSpeed => "fan_speed",
            Self::PerformanceMode => "performance_mode",
            Self::OperatingMode => "operating_mode",
            Self::FirmwareVersion => "device_info",
        }
    }

    /// Exported series name without the namespace prefix.
    pub fn series_suffix(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature_celsius",
            Self::AveragePower => "power_watts",
            Self::PowerCap => "power_cap_watts",
            Self::VramUsed => "vram_usage_bytes",
            Self::VramTotal => "vram_total_bytes",
            Self::VramUsagePercent => "vram_usage_percent",
            Self::Utilization => "dcu_utilization_percent",
            Self::MemoryUtilization => "memory_utilization_percent",
            Self::FanSpeed => "fan_speed_rpm",
            Self::PerformanceMode => "performance_mode",
            Self::OperatingMode => "operating_mode",
            Self::FirmwareVersion => "device_info",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            Self::Temperature => "DCU temperature in Celsius.",
            Self::AveragePower => "Average power consumption in Watts.",
            Self::PowerCap => "Power cap limit in Watts.",
            Self::VramUsed => "VRAM usage in bytes.",
            Self::VramTotal => "Total VRAM in bytes.",
            Self::VramUsagePercent => "VRAM usage percentage.",
            Self::Utilization => "DCU utilization percentage.",
            Self::MemoryUtilization => "Memory utilization percentage.",
            Self::FanSpeed => "Fan speed in RPM.",
            Self::PerformanceMode => "Performance mode (1 = auto, 0 = other).",
            Self::OperatingMode => "Operating mode (1 = Normal, 0 = other).",
            Self::FirmwareVersion => "Device information (always 1).",
        }
    }

    /// Parse a comma-separated list of kind names.
    ///
    /// Repeated names are kept once, at their first position.
    pub fn parse_list(list: &str) -> Result<Vec<MetricKind>, ExporterError> {
        let mut kinds: Vec<MetricKind> = Vec::new();
        for name in list.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            let kind: MetricKind = name.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetricKind {
    type Err = ExporterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ExporterError::unknown_metric(s))
    }
}

/// Base label set carried by every series of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLabels {
    pub gpu: String,
    pub uuid: String,
    pub device: String,
    pub serial: String,
    pub model_name: String,
    pub hostname: String,
}

impl DeviceLabels {
    /// Label names and values in exposition order.
    pub fn pairs(&self) -> [(&'static str, &str); 6] {
        [
            ("gpu", &self.gpu),
            ("uuid", &self.uuid),
            ("device", &self.device),
            ("serial", &self.serial),
            ("modelName", &self.model_name),
            ("hostname", &self.hostname),
        ]
    }
}

/// One mapped value of one metric kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricReading {
    pub kind: MetricKind,
    /// Set for temperature readings only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor: Option<TemperatureSensor>,
    /// Numeric values use one decimal digit; categorical values are verbatim
    pub value: String,
}

/// A device and its mapped readings from one poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub device: Device,
    pub labels: DeviceLabels,
    pub readings: Vec<MetricReading>,
}

impl DeviceSnapshot {
    /// First value recorded for `kind`, if that kind was requested and present.
    pub fn value(&self, kind: MetricKind) -> Option<&str> {
        self.readings
            .iter()
            .find(|reading| reading.kind == kind)
            .map(|reading| reading.value.as_str())
    }

    /// Temperature value for one sensor.
    pub fn temperature(&self, sensor: TemperatureSensor) -> Option<&str> {
        self.readings
            .iter()
            .find(|reading| {
                reading.kind == MetricKind::Temperature && reading.sensor == Some(sensor)
            })
            .map(|reading| reading.value.as_str())
    }
}

/// One full set of per-device readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
    /// Name of the backend that produced the data
    pub backend: String,
    pub devices: Vec<DeviceSnapshot>,
}

impl TelemetrySnapshot {
    /// Create an empty snapshot stamped with the current time.
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis().max(0) as u64,
            backend: backend.into(),
            devices: Vec::new(),
        }
    }
}
