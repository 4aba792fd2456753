//! Human-readable status lines
//!
//! Status lines are emitted through `tracing` under the `status` target so
//! operators can filter them apart from diagnostic logging.

use tracing::{error, info, warn};

/// Severity of a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl std::fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusLevel::Info => write!(f, "INFO"),
            StatusLevel::Success => write!(f, "SUCCESS"),
            StatusLevel::Warning => write!(f, "WARNING"),
            StatusLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Format a status line, e.g. `[SUCCESS] Connection: connected to server`
pub fn format_status(source: &str, message: &str, level: StatusLevel) -> String {
    format!("[{}] {}: {}", level, source, message)
}

/// Format and log a status line at the matching level
pub fn report_status(source: &str, message: &str, level: StatusLevel) {
    let line = format_status(source, message, level);
    match level {
        StatusLevel::Info | StatusLevel::Success => info!(target: "status", "{}", line),
        StatusLevel::Warning => warn!(target: "status", "{}", line),
        StatusLevel::Error => error!(target: "status", "{}", line),
    }
}
