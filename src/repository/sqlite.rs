//! SQLite implementation of [`MonitorRepository`].

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, instrument, warn};

use super::{HealthStatus, MonitorRepository, RepositoryError, RepositoryResult, ResolvedBinding};
use crate::model::{Monitor, MonitorKind, MonitorStatusRow, NotificationChannel, Status};

pub struct SqliteRepository {
    pool: SqlitePool,
}

fn timestamp_to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or(Utc::now())
}

fn push_token_of(kind: &MonitorKind) -> Option<&str> {
    match kind {
        MonitorKind::Push(c) => Some(c.token.as_str()),
        _ => None,
    }
}

impl SqliteRepository {
    #[instrument]
    pub async fn new(db_path: &str) -> RepositoryResult<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))
            .map_err(|e| RepositoryError::ConnectionFailed(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        debug!("sqlite repository ready at {}", db_path);
        Ok(Self { pool })
    }

    fn row_to_monitor(row: &sqlx::sqlite::SqliteRow) -> RepositoryResult<Monitor> {
        let kind_json: String = row.try_get("kind_json")?;
        let kind: MonitorKind = serde_json::from_str(&kind_json)?;
        let last_check_at: Option<i64> = row.try_get("last_check_at")?;
        let last_status: Option<i64> = row.try_get("last_status")?;

        Ok(Monitor {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            active: row.try_get::<i64, _>("active")? != 0,
            interval: row.try_get::<i64, _>("interval_secs")? as u64,
            retries: row.try_get::<i64, _>("retries")? as u32,
            retry_interval: row.try_get::<i64, _>("retry_interval_secs")? as u64,
            resend_interval: row.try_get::<i64, _>("resend_interval")? as u32,
            upside_down: row.try_get::<i64, _>("upside_down")? != 0,
            kind,
            group_id: row.try_get("group_id")?,
            description: row.try_get("description")?,
            last_check_at: last_check_at.map(millis_to_timestamp),
            last_status: last_status.and_then(|s| Status::from_i32(s as i32)),
            last_message: row.try_get("last_message")?,
            last_ping: row.try_get("last_ping")?,
        })
    }

    fn row_to_history(row: &sqlx::sqlite::SqliteRow) -> RepositoryResult<MonitorStatusRow> {
        let status: i64 = row.try_get("status")?;
        let details_json: Option<String> = row.try_get("details_json")?;
        Ok(MonitorStatusRow {
            id: row.try_get("id")?,
            monitor_id: row.try_get("monitor_id")?,
            status: Status::from_i32(status as i32).ok_or_else(|| {
                RepositoryError::SerializationError(format!("invalid status {status}"))
            })?,
            message: row.try_get("message")?,
            ping: row.try_get("ping")?,
            details: details_json
                .map(|s| serde_json::from_str(&s))
                .transpose()?,
            timestamp: millis_to_timestamp(row.try_get("timestamp")?),
        })
    }
}

#[async_trait]
impl MonitorRepository for SqliteRepository {
    #[instrument(skip(self))]
    async fn list_active_monitors(&self) -> RepositoryResult<Vec<Monitor>> {
        let rows = sqlx::query("SELECT * FROM monitors WHERE active = 1")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_monitor).collect()
    }

    async fn load_monitor(&self, monitor_id: &str) -> RepositoryResult<Option<Monitor>> {
        let row = sqlx::query("SELECT * FROM monitors WHERE id = ?1")
            .bind(monitor_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_monitor).transpose()
    }

    async fn find_monitor_by_push_token(&self, token: &str) -> RepositoryResult<Option<Monitor>> {
        let row = sqlx::query("SELECT * FROM monitors WHERE push_token = ?1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_monitor).transpose()
    }

    async fn enabled_bindings(&self, monitor_id: &str) -> RepositoryResult<Vec<ResolvedBinding>> {
        let rows = sqlx::query(
            "SELECT c.* FROM notification_bindings b \
             JOIN notification_channels c ON c.id = b.channel_id \
             WHERE b.monitor_id = ?1 AND b.enabled = 1 AND c.enabled = 1",
        )
        .bind(monitor_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> RepositoryResult<ResolvedBinding> {
                let config_json: String = row.try_get("config_json")?;
                let channel = NotificationChannel {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    enabled: row.try_get::<i64, _>("enabled")? != 0,
                    config: serde_json::from_str(&config_json)?,
                    default_for_new_monitors: row
                        .try_get::<i64, _>("default_for_new_monitors")?
                        != 0,
                };
                Ok(ResolvedBinding { channel })
            })
            .collect()
    }

    async fn recent_history(
        &self,
        monitor_id: &str,
        n: usize,
    ) -> RepositoryResult<Vec<MonitorStatusRow>> {
        let rows = sqlx::query(
            "SELECT * FROM monitor_status WHERE monitor_id = ?1 \
             ORDER BY timestamp DESC LIMIT ?2",
        )
        .bind(monitor_id)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_history).collect()
    }

    async fn count_with_status_after(
        &self,
        monitor_id: &str,
        status: Status,
        after: DateTime<Utc>,
    ) -> RepositoryResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) as cnt FROM monitor_status \
             WHERE monitor_id = ?1 AND status = ?2 AND timestamp > ?3",
        )
        .bind(monitor_id)
        .bind(status as i32)
        .bind(timestamp_to_millis(after))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("cnt")?)
    }

    async fn find_earliest_with_status_after(
        &self,
        monitor_id: &str,
        status: Status,
        after: DateTime<Utc>,
    ) -> RepositoryResult<Option<MonitorStatusRow>> {
        let row = sqlx::query(
            "SELECT * FROM monitor_status \
             WHERE monitor_id = ?1 AND status = ?2 AND timestamp > ?3 \
             ORDER BY timestamp ASC LIMIT 1",
        )
        .bind(monitor_id)
        .bind(status as i32)
        .bind(timestamp_to_millis(after))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_history).transpose()
    }

    async fn find_most_recent_with_status(
        &self,
        monitor_id: &str,
        status: Status,
    ) -> RepositoryResult<Option<MonitorStatusRow>> {
        let row = sqlx::query(
            "SELECT * FROM monitor_status WHERE monitor_id = ?1 AND status = ?2 \
             ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(monitor_id)
        .bind(status as i32)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_history).transpose()
    }

    #[instrument(skip(self, row, last_message))]
    async fn insert_history_and_update_last_known(
        &self,
        row: MonitorStatusRow,
        last_message: String,
    ) -> RepositoryResult<MonitorStatusRow> {
        let mut tx = self.pool.begin().await?;

        let details_json = row
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO monitor_status (id, monitor_id, status, message, ping, details_json, timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&row.id)
        .bind(&row.monitor_id)
        .bind(row.status as i32)
        .bind(&row.message)
        .bind(row.ping)
        .bind(&details_json)
        .bind(timestamp_to_millis(row.timestamp))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE monitors SET last_check_at = ?1, last_status = ?2, last_message = ?3, last_ping = ?4 \
             WHERE id = ?5",
        )
        .bind(timestamp_to_millis(row.timestamp))
        .bind(row.status as i32)
        .bind(&last_message)
        .bind(row.ping)
        .bind(&row.monitor_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(row)
    }

    #[instrument(skip(self))]
    async fn delete_history_older_than(&self, before: DateTime<Utc>) -> RepositoryResult<usize> {
        let result = sqlx::query("DELETE FROM monitor_status WHERE timestamp < ?1")
            .bind(timestamp_to_millis(before))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn calculate_uptime(
        &self,
        monitor_id: &str,
        since: DateTime<Utc>,
    ) -> RepositoryResult<Option<f64>> {
        let row = sqlx::query(
            "SELECT COUNT(*) as total, \
             SUM(CASE WHEN status = 1 THEN 1 ELSE 0 END) as up \
             FROM monitor_status WHERE monitor_id = ?1 AND timestamp >= ?2",
        )
        .bind(monitor_id)
        .bind(timestamp_to_millis(since))
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = row.try_get("total")?;
        if total == 0 {
            return Ok(None);
        }
        let up: i64 = row.try_get::<Option<i64>, _>("up")?.unwrap_or(0);
        Ok(Some(up as f64 / total as f64))
    }

    #[instrument(skip(self, monitor))]
    async fn upsert_monitor(&self, monitor: &Monitor) -> RepositoryResult<()> {
        let kind_json = serde_json::to_string(&monitor.kind)?;
        let push_token = push_token_of(&monitor.kind);

        sqlx::query(
            "INSERT INTO monitors (id, name, active, interval_secs, retries, retry_interval_secs, \
             resend_interval, upside_down, kind_json, push_token, group_id, description, \
             last_check_at, last_status, last_message, last_ping) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16) \
             ON CONFLICT(id) DO UPDATE SET \
             name = excluded.name, active = excluded.active, interval_secs = excluded.interval_secs, \
             retries = excluded.retries, retry_interval_secs = excluded.retry_interval_secs, \
             resend_interval = excluded.resend_interval, upside_down = excluded.upside_down, \
             kind_json = excluded.kind_json, push_token = excluded.push_token, \
             group_id = excluded.group_id, description = excluded.description",
        )
        .bind(&monitor.id)
        .bind(&monitor.name)
        .bind(monitor.active as i64)
        .bind(monitor.interval as i64)
        .bind(monitor.retries as i64)
        .bind(monitor.retry_interval as i64)
        .bind(monitor.resend_interval as i64)
        .bind(monitor.upside_down as i64)
        .bind(&kind_json)
        .bind(push_token)
        .bind(&monitor.group_id)
        .bind(&monitor.description)
        .bind(monitor.last_check_at.map(timestamp_to_millis))
        .bind(monitor.last_status.map(|s| s as i32))
        .bind(&monitor.last_message)
        .bind(monitor.last_ping)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_monitor(&self, monitor_id: &str) -> RepositoryResult<()> {
        sqlx::query("DELETE FROM monitors WHERE id = ?1")
            .bind(monitor_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_active(&self, monitor_id: &str, active: bool) -> RepositoryResult<()> {
        sqlx::query("UPDATE monitors SET active = ?1 WHERE id = ?2")
            .bind(active as i64)
            .bind(monitor_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> RepositoryResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: "ok".to_string(),
            }),
            Err(e) => {
                warn!("repository health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MonitorKind, PortConfig};
    use chrono::Utc;

    async fn test_repo() -> SqliteRepository {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        // keep tempdir alive for the duration of the test process by leaking it;
        // acceptable in a short-lived test binary.
        std::mem::forget(dir);
        SqliteRepository::new(path.to_str().unwrap()).await.unwrap()
    }

    fn sample_monitor(id: &str) -> Monitor {
        Monitor {
            id: id.to_string(),
            name: "test".into(),
            active: true,
            interval: 60,
            retries: 0,
            retry_interval: 1,
            resend_interval: 0,
            upside_down: false,
            kind: MonitorKind::Port(PortConfig {
                hostname: "example.com".into(),
                port: 80,
            }),
            group_id: None,
            description: None,
            last_check_at: None,
            last_status: None,
            last_message: None,
            last_ping: None,
        }
    }

    #[tokio::test]
    async fn upsert_then_load_round_trips() {
        let repo = test_repo().await;
        let monitor = sample_monitor("m1");
        repo.upsert_monitor(&monitor).await.unwrap();

        let loaded = repo.load_monitor("m1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "test");
        assert!(loaded.active);
    }

    #[tokio::test]
    async fn insert_history_updates_last_known_atomically() {
        let repo = test_repo().await;
        repo.upsert_monitor(&sample_monitor("m1")).await.unwrap();

        let row = MonitorStatusRow {
            id: "r1".into(),
            monitor_id: "m1".into(),
            status: Status::Up,
            message: None,
            ping: Some(12),
            details: None,
            timestamp: Utc::now(),
        };
        repo.insert_history_and_update_last_known(row, "all good".into())
            .await
            .unwrap();

        let loaded = repo.load_monitor("m1").await.unwrap().unwrap();
        assert_eq!(loaded.last_status, Some(Status::Up));
        assert_eq!(loaded.last_message.as_deref(), Some("all good"));
        assert_eq!(loaded.last_ping, Some(12));
    }

    #[tokio::test]
    async fn active_monitors_excludes_paused() {
        let repo = test_repo().await;
        let mut paused = sample_monitor("paused");
        paused.active = false;
        repo.upsert_monitor(&sample_monitor("active")).await.unwrap();
        repo.upsert_monitor(&paused).await.unwrap();

        let active = repo.list_active_monitors().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "active");
    }

    #[tokio::test]
    async fn cleanup_deletes_rows_older_than_cutoff() {
        let repo = test_repo().await;
        repo.upsert_monitor(&sample_monitor("m1")).await.unwrap();

        let old_row = MonitorStatusRow {
            id: "old".into(),
            monitor_id: "m1".into(),
            status: Status::Up,
            message: None,
            ping: None,
            details: None,
            timestamp: Utc::now() - chrono::Duration::days(60),
        };
        repo.insert_history_and_update_last_known(old_row, "ok".into())
            .await
            .unwrap();

        let deleted = repo
            .delete_history_older_than(Utc::now() - chrono::Duration::days(30))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
    }
}
