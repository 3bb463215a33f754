use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Operation timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Failure while retrieving an alert's target content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request timed out after {millis} ms")]
    Timeout { millis: u64 },

    #[error("Network failure: {reason}")]
    Network { reason: String },

    #[error("Unexpected HTTP status {status_code}")]
    HttpStatus { status_code: u16 },

    #[error("Malformed response body: {reason}")]
    Body { reason: String },
}

impl FetchError {
    pub fn timed_out(after: Duration) -> Self {
        Self::Timeout {
            millis: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Migration failed: {migration}")]
    MigrationFailed { migration: String },

    #[error("Query execution failed: {query}")]
    QueryFailed { query: String },

    #[error("Constraint violation: {constraint}")]
    ConstraintViolation { constraint: String },

    #[error("Database locked")]
    DatabaseLocked,

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A schedule-minutes field that does not describe minutes of the hour.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("'{token}' is not a number")]
    NotANumber { token: String },

    #[error("minute {minute} is outside 0-59")]
    OutOfRange { minute: i64 },
}
