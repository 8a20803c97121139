//! Telemetry facade: owns the device roster and produces snapshots.

use crate::config::{BackendKind, ExporterConfig};
use crate::error::{ExporterError, Result};
use crate::metrics::data::{Device, DeviceSnapshot, MetricKind, TelemetrySnapshot};
use crate::metrics::mapper::ValueMapper;
use crate::metrics::smi::{HySmi, SmiBackend};
use crate::metrics::sysfs::SysfsBackend;
use crate::metrics::traits::TelemetryBackend;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Single polling entry point over the active backend.
///
/// The roster is discovered once in the constructor and never changes.
/// Every snapshot re-reads the backend; nothing is cached between calls.
pub struct DeviceTelemetry {
    backend: Box<dyn TelemetryBackend>,
    roster: Vec<Device>,
    mapper: ValueMapper,
    metrics: Vec<MetricKind>,
}

impl DeviceTelemetry {
    /// Discover devices through `backend` and build the facade.
    pub fn new(
        backend: Box<dyn TelemetryBackend>,
        mapper: ValueMapper,
        metrics: Vec<MetricKind>,
    ) -> Result<Self> {
        let roster = backend.discover()?;
        info!(
            "Discovered {} Hygon DCU devices via {}",
            roster.len(),
            backend.name()
        );

        Ok(Self {
            backend,
            roster,
            mapper,
            metrics,
        })
    }

    /// Build the backend selected by `config` and discover devices.
    ///
    /// With the hy-smi backend an unusable tool is an error, since no device
    /// could ever be found without it.
    pub fn from_config(config: &ExporterConfig) -> Result<Self> {
        config.validate()?;

        let backend: Box<dyn TelemetryBackend> = match config.backend {
            BackendKind::Sysfs => Box::new(SysfsBackend::new(&config.sysfs_root)),
            BackendKind::HySmi => {
                let smi = match &config.hy_smi_path {
                    Some(path) => HySmi::new(path),
                    None => HySmi::locate(),
                }
                .with_timeout(config.scrape_timeout);
                let path = smi.path().display().to_string();
                let backend = SmiBackend::new(Box::new(smi));
                if !backend.is_available() {
                    error!("Hygon hy-smi tool is not available at {}", path);
                    return Err(ExporterError::tool_unavailable(path));
                }
                Box::new(backend)
            }
        };

        let mapper = ValueMapper::new(
            config.resolve_hostname(),
            config.replace_blanks_in_model_name,
        );
        Self::new(backend, mapper, config.metrics.clone())
    }

    /// The immutable device roster.
    pub fn devices(&self) -> &[Device] {
        &self.roster
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn metrics(&self) -> &[MetricKind] {
        &self.metrics
    }

    pub fn mapper(&self) -> &ValueMapper {
        &self.mapper
    }

    /// Acquire fresh values for every device.
    ///
    /// Fails only when the backend produced no data at all; single missing
    /// values have already been degraded to zero or empty by the backend.
    pub fn snapshot(&self) -> Result<TelemetrySnapshot> {
        let readings = self.backend.acquire(&self.roster).map_err(|e| {
            error!("{} acquisition failed: {}", self.backend.name(), e);
            ExporterError::acquisition_error(e.to_string())
        })?;

        if readings.len() != self.roster.len() {
            warn!(
                "{} returned {} readings for {} devices",
                self.backend.name(),
                readings.len(),
                self.roster.len()
            );
        }

        let mut snapshot = TelemetrySnapshot::new(self.backend.name());
        for (position, device) in self.roster.iter().enumerate() {
            let reading = readings.get(position).cloned().unwrap_or_default();
            snapshot.devices.push(DeviceSnapshot {
                device: device.clone(),
                labels: self.mapper.labels(device),
                readings: self.mapper.readings(device, &reading, &self.metrics),
            });
        }

        debug!(
            "Collected snapshot of {} devices from {}",
            snapshot.devices.len(),
            snapshot.backend
        );
        Ok(snapshot)
    }

    /// Run [`DeviceTelemetry::snapshot`] on the blocking pool, bounded by `timeout`.
    ///
    /// On timeout the scrape fails right away. The hy-smi backend carries
    /// the same deadline and kills the tool process, so the blocking read
    /// ends shortly after; its result is discarded.
    pub async fn collect_snapshot(self: Arc<Self>, timeout: Duration) -> Result<TelemetrySnapshot> {
        let task = tokio::task::spawn_blocking(move || self.snapshot());

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ExporterError::acquisition_error(format!(
                "acquisition task failed: {}",
                join_error
            ))),
            Err(_) => {
                error!("Acquisition timed out after {:?}", timeout);
                Err(ExporterError::acquisition_error(format!(
                    "timed out after {:?}",
                    timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::{
        DeviceLocation, DeviceReading, OperatingMode, PerformanceMode, TemperatureSensor,
        DEFAULT_MODEL_NAME,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend with a fixed roster; fails acquisition when `fail` is set.
    struct FixedBackend {
        fail: bool,
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    impl FixedBackend {
        fn new() -> Self {
            Self {
                fail: false,
                delay: Duration::ZERO,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl TelemetryBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn discover(&self) -> Result<Vec<Device>> {
            Ok((0..2)
                .map(|index| Device {
                    index,
                    uuid: format!("DCU-{}", index),
                    serial: String::new(),
                    product_name: DEFAULT_MODEL_NAME.into(),
                    firmware_version: "1.0".into(),
                    location: DeviceLocation::SmiRow { row: index as usize },
                })
                .collect())
        }

        fn acquire(&self, roster: &[Device]) -> Result<Vec<DeviceReading>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if self.fail {
                return Err(ExporterError::execution_error("hy-smi exited with 1"));
            }
            Ok(roster
                .iter()
                .map(|device| DeviceReading {
                    temperatures: vec![(TemperatureSensor::Edge, 50.0 + device.index as f64)],
                    average_power_watts: 259.0,
                    power_cap_watts: 400.0,
                    utilization_percent: 34.2,
                    performance: Some(PerformanceMode::Auto),
                    operating_mode: Some(OperatingMode::Normal),
                    ..Default::default()
                })
                .collect())
        }
    }

    fn telemetry(backend: FixedBackend) -> DeviceTelemetry {
        DeviceTelemetry::new(
            Box::new(backend),
            ValueMapper::new("node-1", false),
            MetricKind::ALL.to_vec(),
        )
        .unwrap()
    }

    #[test]
    fn test_snapshot_covers_every_device() {
        let telemetry = telemetry(FixedBackend::new());
        let snapshot = telemetry.snapshot().unwrap();

        assert_eq!(snapshot.backend, "fixed");
        assert_eq!(snapshot.devices.len(), 2);
        let second = &snapshot.devices[1];
        assert_eq!(second.labels.gpu, "1");
        assert_eq!(second.labels.hostname, "node-1");
        assert_eq!(second.temperature(TemperatureSensor::Edge), Some("51.0"));
        assert_eq!(second.value(MetricKind::PerformanceMode), Some("1"));
        assert_eq!(second.value(MetricKind::OperatingMode), Some("1"));
        assert_eq!(second.value(MetricKind::VramUsed), Some("0.0"));
        assert_eq!(second.value(MetricKind::FirmwareVersion), Some("1.0"));
    }

    #[test]
    fn test_repeated_snapshots_are_identical() {
        let telemetry = telemetry(FixedBackend::new());
        let first = telemetry.snapshot().unwrap();
        let second = telemetry.snapshot().unwrap();
        assert_eq!(first.devices, second.devices);
        assert_eq!(
            serde_json::to_string(&first.devices).unwrap(),
            serde_json::to_string(&second.devices).unwrap()
        );
    }

    #[test]
    fn test_every_snapshot_reacquires() {
        let backend = FixedBackend::new();
        let calls = backend.calls.clone();
        let telemetry = telemetry(backend);
        telemetry.snapshot().unwrap();
        telemetry.snapshot().unwrap();
        telemetry.snapshot().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backend_failure_is_acquisition_error() {
        let mut backend = FixedBackend::new();
        backend.fail = true;
        let telemetry = telemetry(backend);
        let err = telemetry.snapshot().unwrap_err();
        assert!(matches!(err, ExporterError::Acquisition(_)));
        assert_eq!(telemetry.devices().len(), 2);
    }

    #[test]
    fn test_metric_selection_limits_readings() {
        let telemetry = DeviceTelemetry::new(
            Box::new(FixedBackend::new()),
            ValueMapper::new("node-1", false),
            vec![MetricKind::PowerCap],
        )
        .unwrap();
        let snapshot = telemetry.snapshot().unwrap();
        for device in &snapshot.devices {
            assert_eq!(device.readings.len(), 1);
            assert_eq!(device.value(MetricKind::PowerCap), Some("400.0"));
            assert_eq!(device.value(MetricKind::Temperature), None);
        }
    }

    #[test]
    fn test_unavailable_tool_fails_startup() {
        let config = ExporterConfig::default()
            .with_backend(BackendKind::HySmi)
            .with_hy_smi_path(Some("/nonexistent/hy-smi".into()));
        let err = DeviceTelemetry::from_config(&config).err().unwrap();
        assert!(matches!(err, ExporterError::ToolUnavailable(_)));
    }

    #[tokio::test]
    async fn test_collect_snapshot_off_thread() {
        let telemetry = Arc::new(telemetry(FixedBackend::new()));
        let snapshot = telemetry
            .clone()
            .collect_snapshot(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(snapshot.devices.len(), 2);
    }

    #[tokio::test]
    async fn test_collect_snapshot_times_out() {
        let mut backend = FixedBackend::new();
        backend.delay = Duration::from_millis(500);
        let telemetry = Arc::new(telemetry(backend));
        let err = telemetry
            .collect_snapshot(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ExporterError::Acquisition(ref msg) if msg.contains("timed out")));
    }
}
