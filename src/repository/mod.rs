//! The repository abstraction the core consumes.
//!
//! Mirrors the existing storage-backend split: a trait describing every
//! operation the engine needs, plus one concrete backend (SQLite). Swapping
//! backends means implementing the trait again; nothing above this layer
//! knows which database is underneath.

pub mod error;
pub mod sqlite;

pub use error::{RepositoryError, RepositoryResult};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{Monitor, MonitorStatusRow, NotificationChannel, Status};

/// Health of the repository backend, surfaced through `/health`.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub message: String,
}

/// A notification binding resolved to its channel, as the notification
/// engine needs it (disabled bindings are filtered out before this point).
#[derive(Debug, Clone)]
pub struct ResolvedBinding {
    pub channel: NotificationChannel,
}

/// Everything the scheduler, recorder, and notification engine need from
/// persistent storage.
///
/// All methods are async and must be safe to call concurrently from many
/// per-monitor tasks at once; implementations are expected to pool
/// connections internally (the SQLite backend uses a `sqlx::SqlitePool`).
#[async_trait]
pub trait MonitorRepository: Send + Sync {
    /// Monitors with `active = true`, for scheduler startup / `resetAll`.
    async fn list_active_monitors(&self) -> RepositoryResult<Vec<Monitor>>;

    async fn load_monitor(&self, monitor_id: &str) -> RepositoryResult<Option<Monitor>>;

    /// Look up the monitor owning a push token, for the push endpoint.
    async fn find_monitor_by_push_token(&self, token: &str) -> RepositoryResult<Option<Monitor>>;

    /// Enabled bindings for a monitor, each resolved to its channel, with
    /// disabled channels also filtered out.
    async fn enabled_bindings(&self, monitor_id: &str) -> RepositoryResult<Vec<ResolvedBinding>>;

    /// The `n` most recent history rows, newest first.
    async fn recent_history(
        &self,
        monitor_id: &str,
        n: usize,
    ) -> RepositoryResult<Vec<MonitorStatusRow>>;

    /// Count of rows `(monitorId, status, timestamp > after)`.
    async fn count_with_status_after(
        &self,
        monitor_id: &str,
        status: Status,
        after: DateTime<Utc>,
    ) -> RepositoryResult<i64>;

    /// Earliest row with `status` strictly after `after`, if any.
    async fn find_earliest_with_status_after(
        &self,
        monitor_id: &str,
        status: Status,
        after: DateTime<Utc>,
    ) -> RepositoryResult<Option<MonitorStatusRow>>;

    /// Most recent row with `status`, if any.
    async fn find_most_recent_with_status(
        &self,
        monitor_id: &str,
        status: Status,
    ) -> RepositoryResult<Option<MonitorStatusRow>>;

    /// Insert one history row and update the monitor's last-known fields
    /// atomically. `last_message` is the un-compacted original message.
    async fn insert_history_and_update_last_known(
        &self,
        row: MonitorStatusRow,
        last_message: String,
    ) -> RepositoryResult<MonitorStatusRow>;

    /// Delete history rows older than `before`. Returns the count deleted.
    async fn delete_history_older_than(&self, before: DateTime<Utc>) -> RepositoryResult<usize>;

    /// Fraction of UP rows since `since`, in `[0.0, 1.0]`. `None` if there
    /// is no history in the window.
    async fn calculate_uptime(
        &self,
        monitor_id: &str,
        since: DateTime<Utc>,
    ) -> RepositoryResult<Option<f64>>;

    async fn upsert_monitor(&self, monitor: &Monitor) -> RepositoryResult<()>;

    /// Deletion cascades to history and notification bindings.
    async fn delete_monitor(&self, monitor_id: &str) -> RepositoryResult<()>;

    async fn set_active(&self, monitor_id: &str, active: bool) -> RepositoryResult<()>;

    async fn health_check(&self) -> RepositoryResult<HealthStatus>;
}
