//! SQLite persistence for alerts, configuration values and the application log.

mod alerts;
mod logs;
mod settings;

use deskalert_core::{CoreError, DatabaseError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub use alerts::validate_alert;

pub struct Database {
    connection_string: String,
    pool: Option<SqlitePool>,
}

impl Database {
    pub fn new(connection_string: String) -> Self {
        Self {
            connection_string,
            pool: None,
        }
    }

    pub async fn connect(&mut self) -> Result<(), CoreError> {
        let options = SqliteConnectOptions::from_str(&self.connection_string)
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        info!("Connected to database {}", self.connection_string);
        self.pool = Some(pool);
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::migrate!("./migrations")
            .run(self.pool()?)
            .await
            .map_err(|e| DatabaseError::MigrationFailed {
                migration: e.to_string(),
            })?;
        debug!("Database migrations applied");
        Ok(())
    }

    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    fn pool(&self) -> Result<&SqlitePool, CoreError> {
        self.pool
            .as_ref()
            .ok_or(CoreError::Database(DatabaseError::NotConnected))
    }
}

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// SQLITE_BUSY and SQLITE_LOCKED, extended variants included, surface as
/// `DatabaseLocked` so callers can retry them.
fn map_sqlx_error(error: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.code().is_some_and(|code| is_lock_code(&code)) {
            return CoreError::Database(DatabaseError::DatabaseLocked);
        }
        if db_error.is_unique_violation() {
            return CoreError::Database(DatabaseError::ConstraintViolation {
                constraint: db_error.message().to_string(),
            });
        }
    }
    CoreError::Database(DatabaseError::Sql(error))
}

/// Extended result codes keep the primary code in their low byte.
fn is_lock_code(code: &str) -> bool {
    code.parse::<i32>()
        .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false)
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
