//! Monitoring records
//!
//! Heartbeats and log records travel on their own channels, decoupled from
//! the data path. Neither is persisted by Stagehand itself.

use serde::{Deserialize, Serialize};

/// Current time as fractional epoch seconds
pub fn epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Liveness signal emitted by an idle stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub ts: f64,
    pub component: String,
}

impl Heartbeat {
    pub fn now(component: impl Into<String>) -> Self {
        Self {
            ts: epoch_seconds(),
            component: component.into(),
        }
    }
}

/// A log line forwarded to the log channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub ts: f64,
    pub component: String,
    pub level: LogLevel,
    pub msg: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}
