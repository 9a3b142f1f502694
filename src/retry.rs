//! Retry wrapper applied once, at the scheduler layer, around a probe.
//!
//! Executors that embed their own single-attempt logic (port, database,
//! icmp) must not also loop internally — this is the only retry layer per
//! the retry-placement design note.

use std::future::Future;
use std::time::Duration;

use crate::model::{CheckResult, Status};

/// Retries `probe` up to `retries` additional times on DOWN, sleeping
/// `retry_interval` between attempts.
///
/// `probe` is invoked with `retries=0` conceptually on each inner call —
/// callers pass a closure over an executor that itself never retries, so
/// there is no risk of the exponential expansion the spec warns about.
pub async fn with_retry<F, Fut>(
    retries: u32,
    retry_interval: Duration,
    mut probe: F,
) -> CheckResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CheckResult>,
{
    let first = probe().await;
    if first.status == Status::Up || retries == 0 {
        return first;
    }

    for attempt in 1..=retries {
        tokio::time::sleep(retry_interval).await;
        let result = probe().await;
        if result.status == Status::Up {
            return CheckResult {
                status: Status::Up,
                message: format!("重试成功 ({attempt}/{retries}): {}", result.message),
                ping: result.ping,
                details: result.details,
            };
        }
    }

    CheckResult {
        status: Status::Down,
        message: format!("重试{retries}次后仍然失败: {}", first.message),
        ping: first.ping,
        details: first.details,
    }
}
