//! Error handling for the DCU exporter crate.

/// A specialized `Result` type for exporter operations.
pub type Result<T> = std::result::Result<T, ExporterError>;

/// The main error type for telemetry acquisition and serving.
#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The external diagnostic tool could not be located or launched
    #[error("Tool unavailable: {0}")]
    ToolUnavailable(String),

    /// The external diagnostic tool ran but exited unsuccessfully
    #[error("Tool execution failed: {0}")]
    Execution(String),

    /// Raw telemetry text could not be parsed
    #[error("Failed to parse telemetry: {0}")]
    ParseError(String),

    /// A metric kind name outside the closed enumeration was requested
    #[error("Unknown metric kind: {0}")]
    UnknownMetric(String),

    /// The active backend could not produce any data for a snapshot
    #[error("Acquisition failed: {0}")]
    Acquisition(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),
}

impl ExporterError {
    /// Create a new tool-unavailable error
    pub fn tool_unavailable(msg: impl Into<String>) -> Self {
        Self::ToolUnavailable(msg.into())
    }

    /// Create a new tool execution error
    pub fn execution_error(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create a new parse error
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a new unknown-metric error
    pub fn unknown_metric(name: impl Into<String>) -> Self {
        Self::UnknownMetric(name.into())
    }

    /// Create a new acquisition error
    pub fn acquisition_error(msg: impl Into<String>) -> Self {
        Self::Acquisition(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_missing(path: &std::path::Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    #[test]
    fn test_io_errors_convert() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = read_missing(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(
            err,
            ExporterError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound
        ));
        assert!(err.to_string().starts_with("I/O error"));
    }
}
