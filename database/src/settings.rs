use crate::{map_sqlx_error, unix_now, Database};
use deskalert_core::CoreError;

impl Database {
    pub async fn save_setting(&self, key: &str, value: &str) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO configurations (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(unix_now())
        .execute(self.pool()?)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, CoreError> {
        let value: Option<(String,)> =
            sqlx::query_as("SELECT value FROM configurations WHERE key = ?")
                .bind(key)
                .fetch_optional(self.pool()?)
                .await
                .map_err(map_sqlx_error)?;

        Ok(value.map(|(v,)| v))
    }

    pub async fn delete_setting(&self, key: &str) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM configurations WHERE key = ?")
            .bind(key)
            .execute(self.pool()?)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}
