//! Data cleaner (§4.8): a long-running task that periodically prunes
//! history older than a retention window.
//!
//! Grounded in the existing storage actor's cleanup-interval tick branch,
//! generalized from metrics/service-checks to monitor status history.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, instrument};

use crate::repository::MonitorRepository;

pub struct Cleaner {
    repository: Arc<dyn MonitorRepository>,
    tick_interval: Duration,
    retention_days: i64,
}

impl Cleaner {
    pub fn new(repository: Arc<dyn MonitorRepository>, tick_interval: Duration, retention_days: i64) -> Self {
        Self {
            repository,
            tick_interval,
            retention_days,
        }
    }

    pub fn spawn(self) -> CleanerHandle {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(self.run(rx));
        CleanerHandle { sender: tx }
    }

    #[instrument(skip(self, stop_rx))]
    async fn run(self, mut stop_rx: mpsc::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        // The first tick fires immediately; skip it so cleanup runs on the
        // configured cadence rather than at process start.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = stop_rx.recv() => {
                    info!("cleaner stopped");
                    break;
                }
            }
        }
    }

    async fn run_once(&self) {
        let cutoff = Utc::now() - chrono::Duration::days(self.retention_days);
        match self.repository.delete_history_older_than(cutoff).await {
            Ok(deleted) => info!(deleted, "pruned old history"),
            Err(e) => error!(error = %e, "history cleanup failed, will retry next tick"),
        }
    }
}

pub struct CleanerHandle {
    sender: mpsc::Sender<()>,
}

impl CleanerHandle {
    pub async fn stop(&self) {
        let _ = self.sender.send(()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::sqlite::SqliteRepository;
    use crate::model::{Monitor, MonitorKind, MonitorStatusRow, PortConfig, Status};

    async fn test_repo() -> Arc<dyn MonitorRepository> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleaner.db");
        std::mem::forget(dir);
        Arc::new(SqliteRepository::new(path.to_str().unwrap()).await.unwrap())
    }

    #[tokio::test]
    async fn run_once_prunes_rows_older_than_retention() {
        let repo = test_repo().await;
        repo.upsert_monitor(&Monitor {
            id: "m1".into(),
            name: "test".into(),
            active: true,
            interval: 60,
            retries: 0,
            retry_interval: 1,
            resend_interval: 0,
            upside_down: false,
            kind: MonitorKind::Port(PortConfig {
                hostname: "x".into(),
                port: 1,
            }),
            group_id: None,
            description: None,
            last_check_at: None,
            last_status: None,
            last_message: None,
            last_ping: None,
        })
        .await
        .unwrap();

        repo.insert_history_and_update_last_known(
            MonitorStatusRow {
                id: "old".into(),
                monitor_id: "m1".into(),
                status: Status::Up,
                message: None,
                ping: None,
                details: None,
                timestamp: Utc::now() - chrono::Duration::days(40),
            },
            "ok".into(),
        )
        .await
        .unwrap();

        let cleaner = Cleaner::new(Arc::clone(&repo), Duration::from_secs(3600), 30);
        cleaner.run_once().await;

        let remaining = repo.recent_history("m1", 10).await.unwrap();
        assert!(remaining.is_empty());
    }
}
