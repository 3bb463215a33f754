use crate::error::*;
use std::time::Duration;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::Fetch(e) => {
                error!("Fetch error details: {:?}", e);
            }
            CoreError::Database(e) => {
                error!("Database error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::Fetch(e) => e.is_retryable(),
            CoreError::Database(e) => e.is_retryable(),
            CoreError::Network(_) => true,
            CoreError::Timeout { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::Fetch(e) => e.retry_after(),
            CoreError::Database(e) => e.retry_after(),
            CoreError::Timeout { seconds } => Some(Duration::from_secs(*seconds)),
            _ if self.is_retryable() => Some(Duration::from_secs(5)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Fetch(e) => e.user_friendly_message(),
            CoreError::Database(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Schedule(e) => format!("Invalid alert schedule: {}", e),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::InvalidInput { message } => format!("Invalid input: {}", message),
            CoreError::Timeout { .. } => {
                "The operation took too long to complete. Please try again.".to_string()
            }
            CoreError::NotFound { resource } => format!("Could not find: {}", resource),
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::Fetch(_) => "FETCH".to_string(),
            CoreError::Database(_) => "DATABASE".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Schedule(_) => "SCHEDULE".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            CoreError::Timeout { .. } => "TIMEOUT".to_string(),
            CoreError::NotFound { .. } => "NOT_FOUND".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }
}

impl ErrorExt for FetchError {
    fn log_error(&self) -> &Self {
        error!("FetchError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("FetchError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Network { .. } => true,
            FetchError::HttpStatus { status_code } => *status_code == 429 || *status_code >= 500,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        if self.is_retryable() {
            Some(Duration::from_secs(30))
        } else {
            None
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            FetchError::InvalidUrl { url, .. } => {
                format!("'{}' is not a valid web address.", url)
            }
            FetchError::Timeout { .. } => "The page took too long to respond.".to_string(),
            FetchError::Network { .. } => {
                "Could not reach the page. Please check your connection.".to_string()
            }
            FetchError::HttpStatus { status_code } => {
                format!("The page answered with status {}.", status_code)
            }
            FetchError::Body { .. } => "The page returned unreadable content.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            FetchError::InvalidUrl { .. } => "FETCH_INVALID_URL".to_string(),
            FetchError::Timeout { .. } => "FETCH_TIMEOUT".to_string(),
            FetchError::Network { .. } => "FETCH_NETWORK".to_string(),
            FetchError::HttpStatus { .. } => "FETCH_HTTP_STATUS".to_string(),
            FetchError::Body { .. } => "FETCH_BODY".to_string(),
        }
    }
}

impl ErrorExt for DatabaseError {
    fn log_error(&self) -> &Self {
        error!("DatabaseError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("DatabaseError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            DatabaseError::DatabaseLocked | DatabaseError::ConnectionFailed { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            DatabaseError::DatabaseLocked => Some(Duration::from_millis(100)),
            _ if self.is_retryable() => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            DatabaseError::NotConnected => "Database is not open yet.".to_string(),
            DatabaseError::ConnectionFailed { .. } => {
                "Database connection failed. Please try again.".to_string()
            }
            DatabaseError::DatabaseLocked => {
                "Database is temporarily busy. Please try again.".to_string()
            }
            _ => "Database error occurred. Please try again.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            DatabaseError::NotConnected => "DB_NOT_CONNECTED".to_string(),
            DatabaseError::ConnectionFailed { .. } => "DB_CONNECTION_FAILED".to_string(),
            DatabaseError::MigrationFailed { .. } => "DB_MIGRATION_FAILED".to_string(),
            DatabaseError::QueryFailed { .. } => "DB_QUERY_FAILED".to_string(),
            DatabaseError::ConstraintViolation { .. } => "DB_CONSTRAINT_VIOLATION".to_string(),
            DatabaseError::DatabaseLocked => "DB_LOCKED".to_string(),
            DatabaseError::Sql(_) => "DB_SQL_ERROR".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false // Config errors need the user to fix the file
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' was not found.", path)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::ValidationFailed { reason } => {
                format!("Configuration is not valid: {}", reason)
            }
            ConfigError::Parse(_) => {
                "Configuration file format is invalid. Please check the settings.".to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

pub struct ErrorReporter {
    report_errors: bool,
    report_warnings: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            report_errors: true,
            report_warnings: true,
        }
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.report_errors = enabled;
        self
    }

    pub fn with_warning_reporting(mut self, enabled: bool) -> Self {
        self.report_warnings = enabled;
        self
    }

    pub fn report_error(&self, error: &CoreError) {
        if self.report_errors {
            error.log_error();
            info!("Error code: {}", error.error_code());
            info!("User message: {}", error.user_friendly_message());
            if error.is_retryable() {
                if let Some(retry_after) = error.retry_after() {
                    info!("Error is retryable. Retry after: {:?}", retry_after);
                }
            }
        }
    }

    pub fn report_warning(&self, error: &CoreError) {
        if self.report_warnings {
            error.log_warn();
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
