use crate::{map_sqlx_error, unix_now, Database};
use async_trait::async_trait;
use deskalert_core::{
    parse_keywords, AlertDefinition, AlertStore, CoreError, ErrorRecovery, MinuteSchedule,
    NewAlert,
};
use tracing::debug;

#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    id: i64,
    name: String,
    url: String,
    keywords: String,
    minutes: String,
    enabled: bool,
}

impl From<AlertRow> for AlertDefinition {
    fn from(row: AlertRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            url: row.url,
            keywords: parse_keywords(&row.keywords),
            schedule_minutes: row.minutes,
            enabled: row.enabled,
        }
    }
}

const SELECT_ALERTS: &str = "SELECT id, name, url, keywords, minutes, enabled FROM alerts";

/// Checks an alert before it is written. The poller tolerates bad rows, but
/// the admin side should not be able to create them.
pub fn validate_alert(alert: &NewAlert) -> Result<(), CoreError> {
    if alert.url.trim().is_empty() {
        return Err(CoreError::InvalidInput {
            message: "alert URL is required".to_string(),
        });
    }
    if let Some(keyword) = alert.keywords.iter().find(|k| k.contains(',')) {
        return Err(CoreError::InvalidInput {
            message: format!("keyword '{}' must not contain a comma", keyword),
        });
    }
    alert.schedule_minutes.parse::<MinuteSchedule>()?;
    Ok(())
}

impl Database {
    pub async fn create_alert(&self, alert: &NewAlert) -> Result<i64, CoreError> {
        validate_alert(alert)?;
        let now = unix_now();

        let result = sqlx::query(
            r#"
            INSERT INTO alerts (name, url, keywords, minutes, enabled, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&alert.name)
        .bind(alert.url.trim())
        .bind(alert.keywords.join(","))
        .bind(&alert.schedule_minutes)
        .bind(alert.enabled)
        .bind(now)
        .bind(now)
        .execute(self.pool()?)
        .await
        .map_err(map_sqlx_error)?;

        let id = result.last_insert_rowid();
        debug!("Created alert {} for {}", id, alert.url);
        Ok(id)
    }

    pub async fn get_alert(&self, id: i64) -> Result<Option<AlertDefinition>, CoreError> {
        let row: Option<AlertRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_ALERTS))
            .bind(id)
            .fetch_optional(self.pool()?)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(AlertDefinition::from))
    }

    pub async fn list_alerts(&self) -> Result<Vec<AlertDefinition>, CoreError> {
        let rows: Vec<AlertRow> = sqlx::query_as(&format!("{} ORDER BY id", SELECT_ALERTS))
            .fetch_all(self.pool()?)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(AlertDefinition::from).collect())
    }

    pub async fn update_alert(&self, id: i64, alert: &NewAlert) -> Result<(), CoreError> {
        validate_alert(alert)?;

        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET name = ?, url = ?, keywords = ?, minutes = ?, enabled = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&alert.name)
        .bind(alert.url.trim())
        .bind(alert.keywords.join(","))
        .bind(&alert.schedule_minutes)
        .bind(alert.enabled)
        .bind(unix_now())
        .bind(id)
        .execute(self.pool()?)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound {
                resource: format!("alert {}", id),
            });
        }
        Ok(())
    }

    pub async fn set_alert_enabled(&self, id: i64, enabled: bool) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE alerts SET enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(unix_now())
            .bind(id)
            .execute(self.pool()?)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound {
                resource: format!("alert {}", id),
            });
        }
        Ok(())
    }

    /// Returns false when no alert had that id.
    pub async fn delete_alert(&self, id: i64) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM alerts WHERE id = ?")
            .bind(id)
            .execute(self.pool()?)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AlertStore for Database {
    async fn list_all(&self) -> Result<Vec<AlertDefinition>, CoreError> {
        // Admin edits may hold the write lock briefly
        let database = self;
        ErrorRecovery::run(move || database.list_alerts()).await
    }
}
