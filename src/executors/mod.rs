//! Probe executors: one stateless implementation per monitor type.
//!
//! Each executor performs I/O bounded by its own timeout and returns a
//! [`CheckResult`]; it never retries internally (see [`crate::retry`]) and
//! never touches the repository except the push executor, which reads
//! `lastCheckAt` only.

pub mod database;
pub mod http;
pub mod https_cert;
pub mod icmp;
pub mod keyword;
pub mod port;
pub mod push;

use std::time::Duration;

use crate::model::{CheckResult, Monitor, MonitorKind, Status};
use crate::repository::MonitorRepository;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs one probe attempt for `monitor` and applies the upside-down
/// inversion rule. This is the function the scheduler wraps in
/// [`crate::retry::with_retry`] for each attempt.
pub async fn probe_once(monitor: &Monitor, repository: &dyn MonitorRepository) -> CheckResult {
    let result = match &monitor.kind {
        MonitorKind::Http(cfg) => http::check(cfg).await,
        MonitorKind::HttpsCert(cfg) => https_cert::check(cfg).await,
        MonitorKind::Keyword(cfg) => keyword::check(cfg).await,
        MonitorKind::Port(cfg) => port::check(cfg).await,
        MonitorKind::Mysql(cfg) => database::check_mysql(cfg).await,
        MonitorKind::Redis(cfg) => database::check_redis(cfg).await,
        MonitorKind::Icmp(cfg) => icmp::check(cfg).await,
        MonitorKind::Push(cfg) => push::check(cfg, monitor.id.as_str(), repository).await,
    };

    apply_upside_down(result, monitor.upside_down)
}

fn apply_upside_down(mut result: CheckResult, upside_down: bool) -> CheckResult {
    if !upside_down {
        return result;
    }
    result.status = match result.status {
        Status::Up => Status::Down,
        Status::Down => Status::Up,
        Status::Pending => Status::Pending,
    };
    result.message = format!("[inverted] {}", result.message);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upside_down_flips_status_and_prefixes_message() {
        let flipped = apply_upside_down(CheckResult::up("fine", None), true);
        assert_eq!(flipped.status, Status::Down);
        assert_eq!(flipped.message, "[inverted] fine");

        let unflipped = apply_upside_down(CheckResult::down("nope"), false);
        assert_eq!(unflipped.status, Status::Down);
        assert_eq!(unflipped.message, "nope");
    }
}
