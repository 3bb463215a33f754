use crate::{map_sqlx_error, unix_now, Database};
use deskalert_core::{CoreError, LogEntry, LogLevel};

impl Database {
    pub async fn append_log(&self, level: LogLevel, message: &str) -> Result<i64, CoreError> {
        let result = sqlx::query("INSERT INTO logs (level, message, created_at) VALUES (?, ?, ?)")
            .bind(level.as_str())
            .bind(message)
            .bind(unix_now())
            .execute(self.pool()?)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.last_insert_rowid())
    }

    /// Newest first.
    pub async fn recent_logs(&self, limit: u32) -> Result<Vec<LogEntry>, CoreError> {
        let rows: Vec<(i64, String, String, i64)> = sqlx::query_as(
            "SELECT id, level, message, created_at FROM logs ORDER BY id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool()?)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|(id, level, message, created_at)| LogEntry {
                id,
                level: LogLevel::parse(&level),
                message,
                created_at,
            })
            .collect())
    }

    pub async fn clear_logs(&self) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM logs")
            .execute(self.pool()?)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
