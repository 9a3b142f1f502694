//! Scheduler (§4.1): one long-lived task per active monitor, driving
//! sleep → retry-wrapped probe → record → notify → reschedule.
//!
//! Grounded in the existing `ServiceMonitorActor`/`ServiceHandle` shape: an
//! actor owns its command channel and runs an infinite `tokio::select!`
//! loop, a cloneable handle lets callers control it, and a top-level
//! `SchedulerHandle` owns the map of running actors the way the hub
//! binary owns its collector/service handles.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, error, instrument, warn};

use crate::executors::probe_once;
use crate::id::CompactIdGenerator;
use crate::model::{CheckResult, Monitor};
use crate::notification::NotificationEngine;
use crate::recorder::Recorder;
use crate::repository::{MonitorRepository, RepositoryResult};
use crate::retry::with_retry;

enum Command {
    Shutdown,
}

struct MonitorActor {
    monitor_id: String,
    repository: Arc<dyn MonitorRepository>,
    recorder: Arc<Recorder>,
    notifier: Arc<NotificationEngine>,
    command_rx: mpsc::Receiver<Command>,
}

impl MonitorActor {
    #[instrument(skip(self), fields(monitor = %self.monitor_id))]
    async fn run(mut self) {
        debug!("monitor task starting");

        loop {
            let monitor = match self.repository.load_monitor(&self.monitor_id).await {
                Ok(Some(monitor)) => monitor,
                Ok(None) => {
                    debug!("monitor no longer exists, stopping task");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "failed to reload monitor, retrying shortly");
                    if self.wait_or_shutdown(Duration::from_secs(5)).await {
                        break;
                    }
                    continue;
                }
            };

            if !monitor.active {
                debug!("monitor paused, stopping task");
                break;
            }

            self.run_probe_cycle(&monitor).await;

            if self
                .wait_or_shutdown(Duration::from_secs(monitor.interval.max(1)))
                .await
            {
                break;
            }
        }

        debug!("monitor task stopped");
    }

    /// Sleeps for `duration`, honoring the interval from the end of the
    /// just-finished probe. Returns `true` if a shutdown was requested
    /// before the sleep elapsed.
    async fn wait_or_shutdown(&mut self, duration: Duration) -> bool {
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(Command::Shutdown) | None => return true,
                    }
                }
            }
        }
    }

    #[instrument(skip(self, monitor), fields(monitor = %monitor.id))]
    async fn run_probe_cycle(&self, monitor: &Monitor) {
        let prev_status = monitor.last_status;
        let retry_interval = Duration::from_secs(monitor.retry_interval.max(1));

        let result = with_retry(monitor.retries, retry_interval, || {
            run_probe_catching_panics(monitor, self.repository.as_ref())
        })
        .await;

        match self.recorder.record(monitor, &result).await {
            Ok(_) => {
                self.notifier
                    .evaluate(monitor, result.status, &result.message, prev_status)
                    .await;
            }
            Err(e) => {
                // Recorder failure: logged and non-fatal. The notification
                // engine requires the just-written row, so it is skipped.
                error!(error = %e, "failed to record probe result, skipping notification");
            }
        }
    }
}

/// Runs one probe attempt, converting a panic inside the executor into a
/// DOWN result per the scheduler's failure-isolation rule, instead of
/// letting it unwind into (and kill) this monitor's task.
async fn run_probe_catching_panics(
    monitor: &Monitor,
    repository: &dyn MonitorRepository,
) -> CheckResult {
    match AssertUnwindSafe(probe_once(monitor, repository))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(payload) => {
            let detail = panic_detail(&payload);
            CheckResult::down(format!("检查执行出错: {detail}"))
        }
    }
}

fn panic_detail(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to one running monitor task.
struct MonitorHandle {
    sender: mpsc::Sender<Command>,
}

impl MonitorHandle {
    fn spawn(
        monitor_id: String,
        repository: Arc<dyn MonitorRepository>,
        recorder: Arc<Recorder>,
        notifier: Arc<NotificationEngine>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(4);
        let actor = MonitorActor {
            monitor_id,
            repository,
            recorder,
            notifier,
            command_rx: rx,
        };
        tokio::spawn(actor.run());
        Self { sender: tx }
    }

    /// Signals the task to stop between probes. Does not wait for an
    /// in-flight probe — it is allowed to finish and record normally.
    fn discard(&self) {
        let _ = self.sender.try_send(Command::Shutdown);
    }
}

/// Owns every running monitor task and exposes the scheduler's control
/// surface (§4.1, §6).
pub struct SchedulerHandle {
    repository: Arc<dyn MonitorRepository>,
    recorder: Arc<Recorder>,
    notifier: Arc<NotificationEngine>,
    tasks: Mutex<HashMap<String, MonitorHandle>>,
}

impl SchedulerHandle {
    pub fn new(repository: Arc<dyn MonitorRepository>, notifier: Arc<NotificationEngine>) -> Self {
        let recorder = Arc::new(Recorder::new(
            Arc::clone(&repository),
            Arc::new(CompactIdGenerator::new()),
        ));
        Self {
            repository,
            recorder,
            notifier,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Enumerates active monitors and spawns a task per §4.1 startup.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        self.reset_all().await;
    }

    /// Discards every running task without waiting for in-flight probes.
    pub fn stop(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
        for handle in tasks.values() {
            handle.discard();
        }
    }

    /// Stops and re-creates every task from the repository's current
    /// `active = true` set.
    #[instrument(skip(self))]
    pub async fn reset_all(&self) {
        self.stop();
        match self.repository.list_active_monitors().await {
            Ok(monitors) => {
                for monitor in monitors {
                    self.spawn(monitor.id);
                }
            }
            Err(e) => error!(error = %e, "failed to list active monitors on startup"),
        }
    }

    /// Persists `monitor` and ensures a task is running iff it is active.
    /// An already-running task picks up the change on its next scheduling
    /// decision — no mid-probe cancellation.
    pub async fn add_or_replace(&self, monitor: Monitor) -> RepositoryResult<()> {
        let id = monitor.id.clone();
        let active = monitor.active;
        self.repository.upsert_monitor(&monitor).await?;

        let running = self.tasks.lock().unwrap().contains_key(&id);
        if active && !running {
            self.spawn(id);
        } else if !active && running {
            self.discard_task(&id);
        }
        Ok(())
    }

    /// Discards the task if running; the in-flight probe, if any, is
    /// allowed to complete and record normally.
    pub async fn remove(&self, monitor_id: &str) -> RepositoryResult<()> {
        self.discard_task(monitor_id);
        self.repository.delete_monitor(monitor_id).await
    }

    pub async fn pause(&self, monitor_id: &str) -> RepositoryResult<()> {
        self.repository.set_active(monitor_id, false).await?;
        self.discard_task(monitor_id);
        Ok(())
    }

    pub async fn resume(&self, monitor_id: &str) -> RepositoryResult<()> {
        self.repository.set_active(monitor_id, true).await?;
        if !self.tasks.lock().unwrap().contains_key(monitor_id) {
            self.spawn(monitor_id.to_string());
        }
        Ok(())
    }

    fn discard_task(&self, monitor_id: &str) {
        if let Some(handle) = self.tasks.lock().unwrap().remove(monitor_id) {
            handle.discard();
        }
    }

    fn spawn(&self, monitor_id: String) {
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.contains_key(&monitor_id) {
            warn!(monitor = %monitor_id, "spawn requested for already-running monitor, ignoring");
            return;
        }
        let handle = MonitorHandle::spawn(
            monitor_id.clone(),
            Arc::clone(&self.repository),
            Arc::clone(&self.recorder),
            Arc::clone(&self.notifier),
        );
        tasks.insert(monitor_id, handle);
    }
}
