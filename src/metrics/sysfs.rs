//! Attribute-file backend reading the amdgpu-style sysfs tree of Hygon DCUs.
//!
//! Every read failure degrades to an empty string or zero plus a warning:
//! a missing attribute usually means the board lacks that sensor.

use crate::error::Result;
use crate::metrics::data::{
    Device, DeviceLocation, DeviceReading, PerformanceMode, TemperatureSensor, DEFAULT_MODEL_NAME,
};
use crate::metrics::traits::TelemetryBackend;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Kernel device-class directory holding `cardN` entries.
pub const DRM_CLASS_PATH: &str = "/sys/class/drm";

/// PCI vendor code of Hygon accelerators.
pub const HYGON_VENDOR_ID: &str = "0x1e83";

/// Read a sysfs attribute, trimmed. Empty on failure.
pub fn read_scalar(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(content) => content.trim().to_string(),
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            String::new()
        }
    }
}

/// Read a sysfs attribute as a float. Zero on read or parse failure.
pub fn read_float(path: &Path) -> f64 {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            return 0.0;
        }
    };

    let value = content.trim();
    match value.parse::<f64>() {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(
                "Failed to parse float from {} (value: {:?}): {}",
                path.display(),
                value,
                e
            );
            0.0
        }
    }
}

pub fn millidegrees_to_celsius(raw: f64) -> f64 {
    raw / 1000.0
}

pub fn milliwatts_to_watts(raw: f64) -> f64 {
    raw / 1000.0
}

pub fn microwatts_to_watts(raw: f64) -> f64 {
    raw / 1_000_000.0
}

/// Read `temp1_input..temp3_input` as edge, junction and memory sensors.
///
/// A raw value of zero counts as an absent sensor, so a genuine 0 °C
/// reading is dropped as well.
pub fn read_temperatures(hwmon_path: &Path) -> Vec<(TemperatureSensor, f64)> {
    TemperatureSensor::ALL
        .iter()
        .enumerate()
        .filter_map(|(i, sensor)| {
            let raw = read_float(&hwmon_path.join(format!("temp{}_input", i + 1)));
            (raw > 0.0).then(|| (*sensor, millidegrees_to_celsius(raw)))
        })
        .collect()
}

/// Index of a `cardN` entry; `None` for connectors (`card0-DP-1`) and other nodes.
fn card_index(name: &str) -> Option<u32> {
    let suffix = name.strip_prefix("card")?;
    if suffix.contains('-') {
        return None;
    }
    suffix.parse().ok()
}

/// First hardware-monitor directory in lexical order.
fn find_hwmon_path(device_path: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(device_path.join("hwmon")).ok()?;
    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    dirs.into_iter().next()
}

/// Backend over `/sys/class/drm` (or a test root with the same layout).
#[derive(Debug, Clone)]
pub struct SysfsBackend {
    root: PathBuf,
}

impl SysfsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn inspect_card(&self, index: u32, card_path: &Path) -> Option<Device> {
        let device_path = card_path.join("device");
        if !device_path.is_dir() {
            return None;
        }

        let vendor = read_scalar(&device_path.join("vendor"));
        if vendor != HYGON_VENDOR_ID {
            debug!("Skipping card{}: vendor {:?}", index, vendor);
            return None;
        }

        let mut product_name = read_scalar(&device_path.join("product_name"));
        if product_name.is_empty() {
            product_name = DEFAULT_MODEL_NAME.to_string();
        }

        let hwmon_path = find_hwmon_path(&device_path);
        if hwmon_path.is_none() {
            warn!(
                "No hwmon directory for card{}; temperature, power cap and fan will be unavailable",
                index
            );
        }

        Some(Device {
            index,
            uuid: read_scalar(&device_path.join("unique_id")),
            serial: read_scalar(&device_path.join("serial_number")),
            product_name,
            firmware_version: read_scalar(&device_path.join("vbios_version")),
            location: DeviceLocation::Sysfs {
                device_path,
                hwmon_path,
            },
        })
    }

    fn read_device(&self, device: &Device) -> DeviceReading {
        let (device_path, hwmon_path) = match &device.location {
            DeviceLocation::Sysfs {
                device_path,
                hwmon_path,
            } => (device_path, hwmon_path.as_deref()),
            other => {
                warn!("Device {} has no sysfs location ({:?})", device.index, other);
                return DeviceReading::default();
            }
        };

        let vram_total_bytes = read_float(&device_path.join("mem_info_vram_total"));
        let vram_used_bytes = read_float(&device_path.join("mem_info_vram_used"));
        let vram_usage_percent = if vram_total_bytes > 0.0 {
            vram_used_bytes / vram_total_bytes * 100.0
        } else {
            0.0
        };

        let mut reading = DeviceReading {
            utilization_percent: read_float(&device_path.join("gpu_busy_percent")),
            memory_utilization_percent: read_float(&device_path.join("mem_busy_percent")),
            vram_total_bytes,
            vram_used_bytes,
            vram_usage_percent,
            average_power_watts: milliwatts_to_watts(read_float(
                &device_path.join("chip_power_average"),
            )),
            ..Default::default()
        };

        // Optional on older firmware; absence is not worth a warning per scrape.
        let level_path = device_path.join("power_dpm_force_performance_level");
        if level_path.exists() {
            let level = read_scalar(&level_path);
            if !level.is_empty() {
                reading.performance = Some(PerformanceMode::from_token(&level));
            }
        }

        if let Some(hwmon) = hwmon_path {
            reading.temperatures = read_temperatures(hwmon);
            reading.power_cap_watts = microwatts_to_watts(read_float(&hwmon.join("power1_cap")));
            reading.fan_speed_rpm = read_float(&hwmon.join("fan1_input"));
        }

        reading
    }
}

impl Default for SysfsBackend {
    fn default() -> Self {
        Self::new(DRM_CLASS_PATH)
    }
}

impl TelemetryBackend for SysfsBackend {
    fn name(&self) -> &'static str {
        "sysfs"
    }

    fn discover(&self) -> Result<Vec<Device>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to read DRM directory {}: {}", self.root.display(), e);
                return Ok(Vec::new());
            }
        };

        let mut cards: Vec<(u32, PathBuf)> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                card_index(&name).map(|index| (index, entry.path()))
            })
            .collect();
        cards.sort_by_key(|(index, _)| *index);

        let mut devices = Vec::new();
        for (index, card_path) in cards {
            if let Some(device) = self.inspect_card(index, &card_path) {
                info!(
                    "Discovered Hygon DCU: card{}, serial={}, product={}",
                    device.index, device.serial, device.product_name
                );
                devices.push(device);
            }
        }

        Ok(devices)
    }

    fn acquire(&self, roster: &[Device]) -> Result<Vec<DeviceReading>> {
        Ok(roster.iter().map(|device| self.read_device(device)).collect())
    }
}
