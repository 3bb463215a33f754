use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stored alert rule as the poller sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertDefinition {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub keywords: Vec<String>,
    /// Raw minutes column, parsed by the poller on every cycle.
    pub schedule_minutes: String,
    pub enabled: bool,
}

/// Insert/update payload for an alert, as entered in the admin screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAlert {
    pub name: String,
    pub url: String,
    pub keywords: Vec<String>,
    pub schedule_minutes: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusKind {
    KeywordMatch,
    FetchError,
}

/// Notification raised by the poller for a match or a failed fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub kind: StatusKind,
    pub message: String,
    pub alert_id: Option<i64>,
    pub url: String,
    pub timestamp: DateTime<Local>,
}

impl StatusEvent {
    pub fn keyword_match(alert_id: i64, url: &str, timestamp: DateTime<Local>) -> Self {
        Self {
            kind: StatusKind::KeywordMatch,
            message: format!("Keyword match found for URL: {}", url),
            alert_id: Some(alert_id),
            url: url.to_string(),
            timestamp,
        }
    }

    pub fn fetch_error(
        alert_id: i64,
        url: &str,
        error: &dyn fmt::Display,
        timestamp: DateTime<Local>,
    ) -> Self {
        Self {
            kind: StatusKind::FetchError,
            message: format!("Error fetching URL {}: {}", url, error),
            alert_id: Some(alert_id),
            url: url.to_string(),
            timestamp,
        }
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.message
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "WARN" => LogLevel::Warn,
            "ERROR" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl From<StatusKind> for LogLevel {
    fn from(kind: StatusKind) -> Self {
        match kind {
            StatusKind::KeywordMatch => LogLevel::Info,
            StatusKind::FetchError => LogLevel::Warn,
        }
    }
}

/// One row of the persisted application log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub level: LogLevel,
    pub message: String,
    pub created_at: i64,
}
