//! Prometheus text exposition (format 0.0.4) of a telemetry snapshot.
//!
//! ```text
//! # HELP hygon_power_watts Average power consumption in Watts.
//! # TYPE hygon_power_watts gauge
//! hygon_power_watts{gpu="0",uuid="DCU-0",device="hygon0",serial="",modelName="Hygon DCU",hostname="node-1"} 259
//! ```

use crate::metrics::data::{MetricKind, TelemetrySnapshot};
use tracing::debug;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// One labeled sample of a family.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

/// All samples of one series name, with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub samples: Vec<MetricSample>,
}

impl MetricFamily {
    pub fn gauge(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            samples: Vec::new(),
        }
    }

    pub fn add_sample(&mut self, value: f64, labels: Vec<(String, String)>) {
        self.samples.push(MetricSample { labels, value });
    }

    /// Format this family in exposition format.
    pub fn format(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# HELP {} {}\n", self.name, self.help));
        out.push_str(&format!("# TYPE {} gauge\n", self.name));

        for sample in &self.samples {
            if sample.labels.is_empty() {
                out.push_str(&format!("{} {}\n", self.name, format_value(sample.value)));
            } else {
                let label_str: Vec<String> = sample
                    .labels
                    .iter()
                    .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
                    .collect();
                out.push_str(&format!(
                    "{}{{{}}} {}\n",
                    self.name,
                    label_str.join(","),
                    format_value(sample.value)
                ));
            }
        }

        out
    }
}

/// Group a snapshot into one family per metric kind, in kind order.
///
/// Kinds with no sample on any device are left out.
pub fn families(snapshot: &TelemetrySnapshot, namespace: &str) -> Vec<MetricFamily> {
    let prefix = sanitize_metric_name(namespace);
    let mut families = Vec::new();

    for kind in MetricKind::ALL {
        let mut family = MetricFamily::gauge(
            format!("{}_{}", prefix, kind.series_suffix()),
            kind.help(),
        );

        for device in &snapshot.devices {
            let base: Vec<(String, String)> = device
                .labels
                .pairs()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();

            for reading in device.readings.iter().filter(|r| r.kind == kind) {
                let mut labels = base.clone();
                let value = if kind == MetricKind::FirmwareVersion {
                    labels.push(("vbios_version".to_string(), reading.value.clone()));
                    1.0
                } else {
                    if let Some(sensor) = reading.sensor {
                        labels.push(("sensor".to_string(), sensor.to_string()));
                    }
                    parse_value(&reading.value)
                };
                family.add_sample(value, labels);
            }
        }

        if !family.samples.is_empty() {
            families.push(family);
        }
    }

    families
}

/// Render a whole snapshot.
pub fn render(snapshot: &TelemetrySnapshot, namespace: &str) -> String {
    families(snapshot, namespace)
        .iter()
        .map(MetricFamily::format)
        .collect()
}

fn parse_value(value: &str) -> f64 {
    if value.is_empty() {
        return 0.0;
    }
    value.parse().unwrap_or_else(|_| {
        debug!("Non-numeric metric value '{}', exporting 0", value);
        0.0
    })
}

fn sanitize_metric_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value == value.floor() && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}
