use serde::Serialize;

/// Severity assigned to one line of build output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Success,
}

impl Severity {
    /// Short label used by the CLI printer.
    pub fn label(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Success => "success",
        }
    }
}

/// One immutable entry of the build log.
///
/// Produced by the orchestrator (from classified process output and from
/// preparation-step reporting), appended to the bounded log buffer and
/// broadcast to live subscribers. Serialized with the `level` key the
/// web front end expects.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// Wall-clock time of production, formatted `HH:MM:SS`.
    pub timestamp: String,

    #[serde(rename = "level")]
    pub severity: Severity,

    pub message: String,
}

impl LogEntry {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
            severity,
            message: message.into(),
        }
    }
}
