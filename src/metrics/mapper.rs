//! Translation of normalized device readings into labeled metric values.

use crate::error::Result;
use crate::metrics::data::{
    Device, DeviceLabels, DeviceReading, MetricKind, MetricReading, OperatingMode, PerformanceMode,
};

/// Format a numeric value the way every consumer expects it: one decimal digit.
pub fn format_numeric(value: f64) -> String {
    format!("{:.1}", value)
}

/// `1` for the `auto` performance level, `0` otherwise (including unknown).
pub fn project_performance(mode: Option<&PerformanceMode>) -> &'static str {
    match mode {
        Some(PerformanceMode::Auto) => "1",
        Some(PerformanceMode::Other(_)) | None => "0",
    }
}

/// `1` for the `Normal` operating mode, `0` otherwise (including unknown).
pub fn project_operating_mode(mode: Option<&OperatingMode>) -> &'static str {
    match mode {
        Some(OperatingMode::Normal) => "1",
        Some(OperatingMode::Other(_)) | None => "0",
    }
}

/// Replace blanks inside a model name with hyphens.
pub fn replace_blanks(name: &str) -> String {
    name.trim().replace(' ', "-")
}

/// Maps a device's normalized fields onto metric values and labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueMapper {
    hostname: String,
    replace_blanks_in_model_name: bool,
}

impl ValueMapper {
    pub fn new(hostname: impl Into<String>, replace_blanks_in_model_name: bool) -> Self {
        Self {
            hostname: hostname.into(),
            replace_blanks_in_model_name,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Model name as it appears in the `modelName` label.
    pub fn model_name(&self, device: &Device) -> String {
        if self.replace_blanks_in_model_name {
            replace_blanks(&device.product_name)
        } else {
            device.product_name.clone()
        }
    }

    /// The label set shared by every series of `device`.
    pub fn labels(&self, device: &Device) -> DeviceLabels {
        DeviceLabels {
            gpu: device.index.to_string(),
            uuid: device.uuid.clone(),
            device: device.display_name(),
            serial: device.serial.clone(),
            model_name: self.model_name(device),
            hostname: self.hostname.clone(),
        }
    }

    /// Value of one metric kind.
    ///
    /// Temperature yields the first present sensor, or an empty string when
    /// the device reports none; use [`ValueMapper::readings`] for all sensors.
    pub fn value_for(&self, device: &Device, reading: &DeviceReading, kind: MetricKind) -> String {
        match kind {
            MetricKind::Temperature => reading
                .temperatures
                .first()
                .map(|(_, celsius)| format_numeric(*celsius))
                .unwrap_or_default(),
            MetricKind::AveragePower => format_numeric(reading.average_power_watts),
            MetricKind::PowerCap => format_numeric(reading.power_cap_watts),
            MetricKind::VramUsed => format_numeric(reading.vram_used_bytes),
            MetricKind::VramTotal => format_numeric(reading.vram_total_bytes),
            MetricKind::VramUsagePercent => format_numeric(reading.vram_usage_percent),
            MetricKind::Utilization => format_numeric(reading.utilization_percent),
            MetricKind::MemoryUtilization => format_numeric(reading.memory_utilization_percent),
            MetricKind::FanSpeed => format_numeric(reading.fan_speed_rpm),
            MetricKind::PerformanceMode => {
                project_performance(reading.performance.as_ref()).to_string()
            }
            MetricKind::OperatingMode => {
                project_operating_mode(reading.operating_mode.as_ref()).to_string()
            }
            MetricKind::FirmwareVersion => device.firmware_version.clone(),
        }
    }

    /// Value of a metric kind given by name; unknown names are an error.
    pub fn value_for_name(
        &self,
        device: &Device,
        reading: &DeviceReading,
        kind_name: &str,
    ) -> Result<String> {
        let kind: MetricKind = kind_name.parse()?;
        Ok(self.value_for(device, reading, kind))
    }

    /// All readings for the requested kinds, one per temperature sensor.
    pub fn readings(
        &self,
        device: &Device,
        reading: &DeviceReading,
        kinds: &[MetricKind],
    ) -> Vec<MetricReading> {
        let mut readings = Vec::with_capacity(kinds.len() + reading.temperatures.len());
        for &kind in kinds {
            if kind == MetricKind::Temperature {
                readings.extend(reading.temperatures.iter().map(|(sensor, celsius)| {
                    MetricReading {
                        kind,
                        sensor: Some(*sensor),
                        value: format_numeric(*celsius),
                    }
                }));
            } else {
                readings.push(MetricReading {
                    kind,
                    sensor: None,
                    value: self.value_for(device, reading, kind),
                });
            }
        }
        readings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExporterError;
    use crate::metrics::data::{DeviceLocation, TemperatureSensor};

    fn device() -> Device {
        Device {
            index: 0,
            uuid: "DCU-0".into(),
            serial: "SN0001".into(),
            product_name: "Hygon DCU K100 AI".into(),
            firmware_version: "113-D1630200-100".into(),
            location: DeviceLocation::SmiRow { row: 0 },
        }
    }

    fn reading() -> DeviceReading {
        DeviceReading {
            temperatures: vec![
                (TemperatureSensor::Edge, 58.0),
                (TemperatureSensor::Junction, 63.24),
            ],
            average_power_watts: 259.0,
            power_cap_watts: 400.0,
            vram_used_bytes: 1024.0,
            vram_total_bytes: 4096.0,
            vram_usage_percent: 97.0,
            utilization_percent: 34.2,
            memory_utilization_percent: 0.0,
            fan_speed_rpm: 1800.0,
            performance: Some(PerformanceMode::Auto),
            operating_mode: Some(OperatingMode::Normal),
        }
    }

    #[test]
    fn test_numeric_values_have_one_decimal() {
        let mapper = ValueMapper::new("node-1", false);
        let (device, reading) = (device(), reading());
        assert_eq!(mapper.value_for(&device, &reading, MetricKind::AveragePower), "259.0");
        assert_eq!(mapper.value_for(&device, &reading, MetricKind::Utilization), "34.2");
        assert_eq!(mapper.value_for(&device, &reading, MetricKind::VramUsed), "1024.0");
        assert_eq!(mapper.value_for(&device, &reading, MetricKind::MemoryUtilization), "0.0");
        assert_eq!(mapper.value_for(&device, &reading, MetricKind::Temperature), "58.0");
        assert_eq!(format_numeric(63.24), "63.2");
    }

    #[test]
    fn test_categorical_projection() {
        assert_eq!(project_performance(Some(&PerformanceMode::Auto)), "1");
        assert_eq!(project_performance(Some(&PerformanceMode::from_token("manual"))), "0");
        assert_eq!(project_performance(None), "0");
        assert_eq!(project_operating_mode(Some(&OperatingMode::Normal)), "1");
        assert_eq!(project_operating_mode(Some(&OperatingMode::from_token("Degraded"))), "0");
        assert_eq!(project_operating_mode(None), "0");
    }

    #[test]
    fn test_firmware_version_is_categorical() {
        let mapper = ValueMapper::new("node-1", false);
        assert_eq!(
            mapper.value_for(&device(), &reading(), MetricKind::FirmwareVersion),
            "113-D1630200-100"
        );
    }

    #[test]
    fn test_unknown_metric_name_is_an_error() {
        let mapper = ValueMapper::new("node-1", false);
        let err = mapper
            .value_for_name(&device(), &reading(), "sm_clock")
            .unwrap_err();
        assert!(matches!(err, ExporterError::UnknownMetric(_)));
        assert_eq!(
            mapper.value_for_name(&device(), &reading(), "power_cap").unwrap(),
            "400.0"
        );
    }

    #[test]
    fn test_labels_and_blank_replacement() {
        let plain = ValueMapper::new("node-1", false).labels(&device());
        assert_eq!(plain.gpu, "0");
        assert_eq!(plain.device, "hygon0");
        assert_eq!(plain.model_name, "Hygon DCU K100 AI");
        assert_eq!(plain.hostname, "node-1");

        let hyphenated = ValueMapper::new("node-1", true).labels(&device());
        assert_eq!(hyphenated.model_name, "Hygon-DCU-K100-AI");
        assert_eq!(hyphenated.serial, "SN0001");
    }

    #[test]
    fn test_readings_expand_temperature_sensors() {
        let mapper = ValueMapper::new("node-1", false);
        let readings = mapper.readings(
            &device(),
            &reading(),
            &[MetricKind::Temperature, MetricKind::FanSpeed],
        );
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[0].sensor, Some(TemperatureSensor::Edge));
        assert_eq!(readings[1].sensor, Some(TemperatureSensor::Junction));
        assert_eq!(readings[1].value, "63.2");
        assert_eq!(readings[2].kind, MetricKind::FanSpeed);
        assert_eq!(readings[2].value, "1800.0");
    }

    #[test]
    fn test_missing_values_default_to_zero() {
        let mapper = ValueMapper::new("node-1", false);
        let empty = DeviceReading::default();
        let readings = mapper.readings(&device(), &empty, &MetricKind::ALL);

        // Every kind but temperature is present even without data.
        assert_eq!(readings.len(), MetricKind::ALL.len() - 1);
        assert_eq!(mapper.value_for(&device(), &empty, MetricKind::Temperature), "");
        assert_eq!(mapper.value_for(&device(), &empty, MetricKind::PowerCap), "0.0");
        assert_eq!(mapper.value_for(&device(), &empty, MetricKind::OperatingMode), "0");
    }
}
