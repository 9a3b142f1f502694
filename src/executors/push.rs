//! `push` executor (§4.2.7).
//!
//! Does no outbound I/O: it only checks whether the monitor's last-known
//! heartbeat is recent enough. The push ingestion endpoint (§6) is what
//! actually advances `lastCheckAt`, directly through the recorder, never
//! through the scheduler.

use chrono::Utc;

use crate::model::{CheckResult, PushConfig};
use crate::repository::MonitorRepository;

/// How much slack beyond `pushInterval` before a missed heartbeat counts
/// as DOWN.
const TOLERANCE: f64 = 1.5;

pub async fn check(
    cfg: &PushConfig,
    monitor_id: &str,
    repository: &dyn MonitorRepository,
) -> CheckResult {
    let monitor = match repository.load_monitor(monitor_id).await {
        Ok(Some(m)) => m,
        Ok(None) => return CheckResult::down("配置无效: 监控不存在"),
        Err(e) => return CheckResult::down(format!("NETWORK_ERROR: {e}")),
    };

    match monitor.last_check_at {
        Some(last) => {
            let elapsed = (Utc::now() - last).num_milliseconds() as f64 / 1000.0;
            let allowed = cfg.push_interval as f64 * TOLERANCE;
            if elapsed <= allowed {
                CheckResult::up("心跳正常", None)
            } else {
                CheckResult::down("missed heartbeat")
            }
        }
        None => CheckResult::down("missed heartbeat"),
    }
}
