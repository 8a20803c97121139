//! CLI-table backend driven by the `hy-smi` diagnostic tool.
//!
//! The tool prints a banner, a header line, one row per device and an
//! end-of-log banner:
//!
//! ```text
//! ============================ System Management Interface =============================
//! DCU     Temp     AvgPwr     Perf     PwrCap     VRAM%      DCU%      Mode
//! 0       58.0C    259.0W     auto     400.0W     97%        34.2%     Normal
//! =================================== End of SMI Log ===================================
//! ```

use crate::error::{ExporterError, Result};
use crate::metrics::data::{
    Device, DeviceLocation, DeviceReading, OperatingMode, PerformanceMode, RawTableRow, SmiRow,
    TemperatureSensor, DEFAULT_MODEL_NAME,
};
use crate::metrics::traits::{RowSource, TelemetryBackend};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::env;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Executable name searched on `PATH`.
pub const HY_SMI_BINARY: &str = "hy-smi";

/// Argument used for the availability check.
pub const PROBE_ARG: &str = "--help";

const DEVICE_HEADER_TOKEN: &str = "DCU";
const TEMPERATURE_HEADER_TOKEN: &str = "Temp";
const END_OF_LOG_SENTINEL: &str = "End of SMI Log";

/// Number of captured fields in a device row.
pub const ROW_FIELD_COUNT: usize = 8;

lazy_static! {
    // index, temp C, avg power W, perf word, power cap W, VRAM %, utilization %, mode word.
    // Unanchored at the end: columns added by newer tool versions are ignored.
    static ref ROW_PATTERN: Regex = Regex::new(
        r"^(\d+)\s+(\d+\.?\d*)C\s+(\d+\.?\d*)W\s+(\w+)\s+(\d+\.?\d*)W\s+(\d+)%\s+(\d+\.?\d*)%\s+(\w+)"
    )
    .expect("row pattern is valid");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    SeekingHeader,
    InData,
    Done,
}

fn is_separator(line: &str) -> bool {
    line.starts_with('=')
}

fn is_header(line: &str) -> bool {
    line.contains(DEVICE_HEADER_TOKEN) && line.contains(TEMPERATURE_HEADER_TOKEN)
}

/// Split tool output into raw device rows.
///
/// Lines that fail the row grammar are logged and skipped; they never stop
/// the remaining rows from being read.
pub fn extract_rows(output: &str) -> Vec<RawTableRow> {
    let mut state = ParseState::SeekingHeader;
    let mut rows = Vec::new();

    for (i, raw_line) in output.lines().enumerate() {
        let line = raw_line.trim();
        let line_number = i + 1;

        match state {
            ParseState::Done => break,
            _ if line.contains(END_OF_LOG_SENTINEL) => state = ParseState::Done,
            _ if line.is_empty() || is_separator(line) => {}
            ParseState::SeekingHeader => {
                if is_header(line) {
                    state = ParseState::InData;
                }
            }
            ParseState::InData => {
                if line.contains(DEVICE_HEADER_TOKEN) {
                    debug!("Ignoring repeated hy-smi header at line {}", line_number);
                    continue;
                }

                match ROW_PATTERN.captures(line) {
                    Some(captures) => rows.push(RawTableRow {
                        line_number,
                        fields: captures
                            .iter()
                            .skip(1)
                            .flatten()
                            .map(|m| m.as_str().to_string())
                            .collect(),
                    }),
                    None => warn!(
                        "Skipping malformed hy-smi line {}: {:?}",
                        line_number, line
                    ),
                }
            }
        }
    }

    rows
}

fn parse_field<T: std::str::FromStr>(row: &RawTableRow, position: usize, what: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let field = &row.fields[position];
    field.parse().map_err(|e| {
        ExporterError::parse_error(format!(
            "line {}: invalid {} {:?}: {}",
            row.line_number, what, field, e
        ))
    })
}

impl TryFrom<RawTableRow> for SmiRow {
    type Error = ExporterError;

    fn try_from(row: RawTableRow) -> Result<Self> {
        if row.fields.len() != ROW_FIELD_COUNT {
            return Err(ExporterError::parse_error(format!(
                "line {}: expected {} fields, got {}",
                row.line_number,
                ROW_FIELD_COUNT,
                row.fields.len()
            )));
        }

        Ok(SmiRow {
            index: parse_field(&row, 0, "device index")?,
            temperature_celsius: parse_field(&row, 1, "temperature")?,
            average_power_watts: parse_field(&row, 2, "average power")?,
            performance: PerformanceMode::from_token(&row.fields[3]),
            power_cap_watts: parse_field(&row, 4, "power cap")?,
            vram_usage_percent: parse_field(&row, 5, "VRAM percent")?,
            utilization_percent: parse_field(&row, 6, "utilization")?,
            mode: OperatingMode::from_token(&row.fields[7]),
        })
    }
}

/// Parse tool output into typed rows, skipping rows that fail conversion.
pub fn parse_table(output: &str) -> Vec<SmiRow> {
    extract_rows(output)
        .into_iter()
        .filter_map(|raw| match SmiRow::try_from(raw) {
            Ok(row) => Some(row),
            Err(e) => {
                warn!("Discarding hy-smi row: {}", e);
                None
            }
        })
        .collect()
}

impl From<&SmiRow> for DeviceReading {
    fn from(row: &SmiRow) -> Self {
        DeviceReading {
            temperatures: vec![(TemperatureSensor::Edge, row.temperature_celsius)],
            average_power_watts: row.average_power_watts,
            power_cap_watts: row.power_cap_watts,
            vram_usage_percent: row.vram_usage_percent,
            utilization_percent: row.utilization_percent,
            performance: Some(row.performance.clone()),
            operating_mode: Some(row.mode.clone()),
            ..Default::default()
        }
    }
}

fn locate_on_path(name: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Interval between exit checks while a tool run is pending.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Wait for `child`, killing it once `timeout` has elapsed.
///
/// Returns `None` when the child was killed.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Option<Duration>,
) -> io::Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}

/// Drain a child pipe on its own thread so a full pipe cannot stall the tool.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buffer)?;
        }
        Ok(buffer)
    })
}

fn join_drain(handle: thread::JoinHandle<io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
    let bytes = handle
        .join()
        .map_err(|_| ExporterError::execution_error("hy-smi output reader panicked"))??;
    Ok(bytes)
}

/// Row source that runs the `hy-smi` executable.
#[derive(Debug, Clone)]
pub struct HySmi {
    path: PathBuf,
    timeout: Option<Duration>,
}

impl HySmi {
    /// Use an explicit executable path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: None,
        }
    }

    /// Kill a run of the tool that takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Search `PATH` for `hy-smi`, falling back to the bare name.
    pub fn locate() -> Self {
        match locate_on_path(HY_SMI_BINARY) {
            Some(path) => {
                info!("Found hy-smi command at {}", path.display());
                Self::new(path)
            }
            None => {
                warn!("hy-smi command not found in PATH, trying the bare name");
                Self::new(HY_SMI_BINARY)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run the tool without arguments and return its stdout.
    ///
    /// With a timeout set, a run past the deadline is killed and reported
    /// as an execution error.
    pub fn run(&self) -> Result<String> {
        let mut child = Command::new(&self.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ExporterError::tool_unavailable(format!("{}: {}", self.path.display(), e))
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match wait_with_deadline(&mut child, self.timeout)? {
            Some(status) => status,
            None => {
                warn!(
                    "Killed {} after {:?} without output",
                    self.path.display(),
                    self.timeout.unwrap_or_default()
                );
                return Err(ExporterError::execution_error(format!(
                    "{} timed out after {:?}",
                    self.path.display(),
                    self.timeout.unwrap_or_default()
                )));
            }
        };

        let stdout = join_drain(stdout)?;
        let stderr = join_drain(stderr)?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(ExporterError::execution_error(format!(
                "{} exited with {}: {}",
                self.path.display(),
                status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

impl RowSource for HySmi {
    fn acquire(&self) -> Result<Vec<SmiRow>> {
        let output = self.run()?;
        Ok(parse_table(&output))
    }

    fn is_available(&self) -> bool {
        let child = Command::new(&self.path)
            .arg(PROBE_ARG)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match child {
            Ok(mut child) => matches!(
                wait_with_deadline(&mut child, self.timeout),
                Ok(Some(status)) if status.success()
            ),
            Err(_) => false,
        }
    }
}

/// Backend whose roster and readings both come from the tool's table.
pub struct SmiBackend {
    source: Box<dyn RowSource>,
}

impl SmiBackend {
    pub fn new(source: Box<dyn RowSource>) -> Self {
        Self { source }
    }

    /// Backend over the `hy-smi` executable found on `PATH`.
    pub fn locate() -> Self {
        Self::new(Box::new(HySmi::locate()))
    }

    /// Advisory startup check; not repeated per scrape.
    pub fn is_available(&self) -> bool {
        self.source.is_available()
    }
}

impl TelemetryBackend for SmiBackend {
    fn name(&self) -> &'static str {
        "hy-smi"
    }

    fn discover(&self) -> Result<Vec<Device>> {
        let rows = self.source.acquire()?;
        let mut devices: Vec<Device> = Vec::with_capacity(rows.len());

        for (position, row) in rows.iter().enumerate() {
            if devices.iter().any(|device| device.index == row.index) {
                warn!("Duplicate hy-smi device index {}, keeping the first row", row.index);
                continue;
            }

            let device = Device {
                index: row.index,
                uuid: format!("DCU-{}", row.index),
                serial: String::new(),
                product_name: DEFAULT_MODEL_NAME.to_string(),
                firmware_version: String::new(),
                location: DeviceLocation::SmiRow { row: position },
            };
            info!("Discovered Hygon DCU via hy-smi: index {}", device.index);
            devices.push(device);
        }

        Ok(devices)
    }

    fn acquire(&self, roster: &[Device]) -> Result<Vec<DeviceReading>> {
        let rows = self.source.acquire()?;
        let by_index: HashMap<u32, &SmiRow> =
            rows.iter().rev().map(|row| (row.index, row)).collect();

        for row in &rows {
            if !roster.iter().any(|device| device.index == row.index) {
                debug!("Ignoring hy-smi row for unknown device index {}", row.index);
            }
        }

        Ok(roster
            .iter()
            .map(|device| match by_index.get(&device.index) {
                Some(row) => DeviceReading::from(*row),
                None => {
                    warn!("No hy-smi row for device {} in this scrape", device.index);
                    DeviceReading::default()
                }
            })
            .collect())
    }
}
