//! Status recorder (§4.4): compact-message computation plus the
//! insert-and-update-last-known write, atomically, through the repository.

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use crate::id::CompactIdGenerator;
use crate::model::{CheckResult, Monitor, MonitorStatusRow, Status};
use crate::repository::{MonitorRepository, RepositoryResult};

pub struct Recorder {
    repository: Arc<dyn MonitorRepository>,
    ids: Arc<CompactIdGenerator>,
}

impl Recorder {
    pub fn new(repository: Arc<dyn MonitorRepository>, ids: Arc<CompactIdGenerator>) -> Self {
        Self { repository, ids }
    }

    /// Writes one history row for `result` and updates `monitor`'s
    /// last-known fields in the same transaction.
    #[instrument(skip(self, monitor, result), fields(monitor = %monitor.id))]
    pub async fn record(
        &self,
        monitor: &Monitor,
        result: &CheckResult,
    ) -> RepositoryResult<MonitorStatusRow> {
        let row = MonitorStatusRow {
            id: self.ids.generate(),
            monitor_id: monitor.id.clone(),
            status: result.status,
            message: compact_message(result.status, &result.message, monitor.kind.type_name()),
            ping: result.ping,
            details: result.details.clone(),
            timestamp: Utc::now(),
        };

        self.repository
            .insert_history_and_update_last_known(row, result.message.clone())
            .await
    }
}

/// `null` iff `status == Up` and `monitor_type != "push"`; otherwise the
/// original message, trimmed of trailing whitespace. `Pending` always maps
/// to the fixed `"等待中"` marker.
fn compact_message(status: Status, message: &str, monitor_type: &str) -> Option<String> {
    match status {
        Status::Pending => Some("等待中".to_string()),
        Status::Up if monitor_type != "push" => None,
        _ => Some(message.trim_end().to_string()),
    }
}
