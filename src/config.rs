//! Exporter configuration: backend selection, label options and metric set.

use crate::error::{ExporterError, Result};
use crate::metrics::data::MetricKind;
use crate::metrics::sysfs::DRM_CLASS_PATH;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Hostname label value used when the runtime cannot resolve one.
pub const FALLBACK_HOSTNAME: &str = "localhost";

/// Which raw-data source feeds the exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Kernel attribute files under `/sys/class/drm`
    #[default]
    Sysfs,
    /// Tabular output of the `hy-smi` tool
    HySmi,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sysfs => f.write_str("sysfs"),
            Self::HySmi => f.write_str("hy-smi"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = ExporterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sysfs" => Ok(Self::Sysfs),
            "hy-smi" | "hysmi" | "smi" => Ok(Self::HySmi),
            other => Err(ExporterError::config_error(format!(
                "unknown backend '{}', expected 'sysfs' or 'hy-smi'",
                other
            ))),
        }
    }
}

/// Configuration of the telemetry layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Active backend
    pub backend: BackendKind,
    /// Root of the DRM device class tree
    pub sysfs_root: PathBuf,
    /// Explicit hy-smi executable; searched on PATH when unset
    pub hy_smi_path: Option<PathBuf>,
    /// Replace blanks in model names with hyphens
    pub replace_blanks_in_model_name: bool,
    /// Hostname label override
    pub hostname: Option<String>,
    /// Leave the hostname label empty
    pub no_hostname: bool,
    /// Metric name prefix
    pub namespace: String,
    /// Metric kinds to export
    pub metrics: Vec<MetricKind>,
    /// Upper bound on one acquisition driven by a scrape
    pub scrape_timeout: Duration,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            sysfs_root: PathBuf::from(DRM_CLASS_PATH),
            hy_smi_path: None,
            replace_blanks_in_model_name: false,
            hostname: None,
            no_hostname: false,
            namespace: crate::DEFAULT_NAMESPACE.to_string(),
            metrics: MetricKind::ALL.to_vec(),
            scrape_timeout: Duration::from_millis(crate::DEFAULT_SCRAPE_TIMEOUT_MS),
        }
    }
}

impl ExporterConfig {
    /// Set the backend.
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set the sysfs root directory.
    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    /// Set an explicit hy-smi path.
    pub fn with_hy_smi_path(mut self, path: Option<PathBuf>) -> Self {
        self.hy_smi_path = path;
        self
    }

    /// Enable or disable blank replacement in model names.
    pub fn with_replace_blanks_in_model_name(mut self, enabled: bool) -> Self {
        self.replace_blanks_in_model_name = enabled;
        self
    }

    /// Override the hostname label.
    pub fn with_hostname(mut self, hostname: Option<String>) -> Self {
        self.hostname = hostname;
        self
    }

    /// Leave the hostname label empty.
    pub fn with_no_hostname(mut self, no_hostname: bool) -> Self {
        self.no_hostname = no_hostname;
        self
    }

    /// Set the metric name prefix.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the exported metric kinds.
    pub fn with_metrics(mut self, metrics: Vec<MetricKind>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the exported metric kinds from a comma-separated list of names.
    pub fn with_metric_names(self, names: &str) -> Result<Self> {
        let metrics = MetricKind::parse_list(names)?;
        Ok(self.with_metrics(metrics))
    }

    /// Set the scrape timeout.
    pub fn with_scrape_timeout(mut self, timeout: Duration) -> Self {
        self.scrape_timeout = timeout;
        self
    }

    /// Check settings that would otherwise fail at scrape time.
    pub fn validate(&self) -> Result<()> {
        if self.metrics.is_empty() {
            return Err(ExporterError::config_error("no metric kinds selected"));
        }
        if let Some((position, kind)) = self
            .metrics
            .iter()
            .enumerate()
            .find(|(position, kind)| self.metrics[..*position].contains(*kind))
        {
            return Err(ExporterError::config_error(format!(
                "metric kind '{}' selected more than once (position {})",
                kind, position
            )));
        }
        if self.namespace.is_empty()
            || !self
                .namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            || self.namespace.starts_with(|c: char| c.is_ascii_digit())
        {
            return Err(ExporterError::config_error(format!(
                "invalid metric namespace '{}'",
                self.namespace
            )));
        }
        if self.scrape_timeout.is_zero() {
            return Err(ExporterError::config_error("scrape timeout must be positive"));
        }
        Ok(())
    }

    /// Hostname label value: override, runtime hostname, or the fallback literal.
    pub fn resolve_hostname(&self) -> String {
        if self.no_hostname {
            return String::new();
        }
        if let Some(hostname) = self.hostname.as_ref().filter(|h| !h.is_empty()) {
            return hostname.clone();
        }
        sysinfo::System::host_name()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| FALLBACK_HOSTNAME.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExporterConfig::default();
        assert_eq!(config.backend, BackendKind::Sysfs);
        assert_eq!(config.sysfs_root, PathBuf::from("/sys/class/drm"));
        assert_eq!(config.namespace, "hygon");
        assert_eq!(config.metrics.len(), MetricKind::ALL.len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("sysfs".parse::<BackendKind>().unwrap(), BackendKind::Sysfs);
        assert_eq!("hy-smi".parse::<BackendKind>().unwrap(), BackendKind::HySmi);
        assert!("nvml".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::HySmi.to_string(), "hy-smi");
    }

    #[test]
    fn test_metric_names_builder() {
        let config = ExporterConfig::default()
            .with_metric_names("temperature,fan_speed")
            .unwrap();
        assert_eq!(config.metrics, vec![MetricKind::Temperature, MetricKind::FanSpeed]);

        let config = ExporterConfig::default()
            .with_metric_names("avg_power, avg_power,power_cap,avg_power")
            .unwrap();
        assert_eq!(config.metrics, vec![MetricKind::AveragePower, MetricKind::PowerCap]);
        assert!(config.validate().is_ok());

        let err = ExporterConfig::default()
            .with_metric_names("temperature,hbm_bandwidth")
            .unwrap_err();
        assert!(matches!(err, ExporterError::UnknownMetric(_)));
    }

    #[test]
    fn test_validation() {
        assert!(ExporterConfig::default().with_metrics(Vec::new()).validate().is_err());
        assert!(ExporterConfig::default()
            .with_metrics(vec![MetricKind::AveragePower, MetricKind::AveragePower])
            .validate()
            .is_err());
        assert!(ExporterConfig::default().with_namespace("dcu-x").validate().is_err());
        assert!(ExporterConfig::default().with_namespace("9dcu").validate().is_err());
        assert!(ExporterConfig::default().with_namespace("DCGM").validate().is_ok());
        assert!(ExporterConfig::default()
            .with_scrape_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_hostname_resolution() {
        let config = ExporterConfig::default().with_hostname(Some("dcu-node-7".into()));
        assert_eq!(config.resolve_hostname(), "dcu-node-7");

        let config = config.with_no_hostname(true);
        assert_eq!(config.resolve_hostname(), "");

        let resolved = ExporterConfig::default().resolve_hostname();
        assert!(!resolved.is_empty());
    }
}
