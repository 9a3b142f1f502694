//! Notification decision engine (§4.5) and channel dispatchers (§4.6).
//!
//! [`NotificationEngine::evaluate`] is the only entry point the scheduler
//! calls after a probe has been recorded. It owns the single piece of
//! in-memory state the whole engine keeps — `lastNotified` — everything
//! else (failure counts, "is this monitor new") is recomputed from the
//! repository on every call, per the per-monitor-vs-global-state design
//! note: that makes the engine correct across restarts at the cost of one
//! "extra" notification right after a restart, which the spec accepts.

pub mod dingtalk;
pub mod email;
pub mod wechat;
pub mod webhook;
pub mod wecom;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{error, instrument};

use crate::model::{ChannelConfig, Monitor, Status};
use crate::repository::MonitorRepository;

/// One attempt at delivering a notification through a single channel.
pub type DispatchResult = anyhow::Result<()>;

/// A fully-rendered notification, handed to each dispatcher.
#[derive(Debug, Clone)]
pub struct NotificationData {
    pub monitor_name: String,
    pub monitor_type: String,
    pub status: Status,
    pub status_text: String,
    pub status_code: i32,
    pub time: DateTime<Utc>,
    /// The message body, already including the `"监控地址: ..."` line and
    /// any aggregated-failure / recovery prefix.
    pub message: String,
    pub address: Option<String>,
    pub failure_info: Option<FailureInfo>,
}

#[derive(Debug, Clone)]
pub struct FailureInfo {
    pub count: i64,
    pub first_failure_time: DateTime<Utc>,
    pub last_failure_time: DateTime<Utc>,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Copy)]
struct LastNotified {
    time: DateTime<Utc>,
    status: Status,
}

pub struct NotificationEngine {
    repository: std::sync::Arc<dyn MonitorRepository>,
    client: Client,
    last_notified: Mutex<HashMap<String, LastNotified>>,
}

impl NotificationEngine {
    pub fn new(repository: std::sync::Arc<dyn MonitorRepository>) -> Self {
        Self {
            repository,
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build notification HTTP client"),
            last_notified: Mutex::new(HashMap::new()),
        }
    }

    /// Decides whether to emit a notification for the just-recorded probe
    /// and, if so, fans it out over every enabled binding. `prev_status` is
    /// the monitor's `lastStatus` as read *before* this probe was recorded.
    #[instrument(skip(self, monitor, message), fields(monitor = %monitor.id))]
    pub async fn evaluate(
        &self,
        monitor: &Monitor,
        new_status: Status,
        message: &str,
        prev_status: Option<Status>,
    ) {
        if new_status == Status::Pending {
            return;
        }

        let bindings = match self.repository.enabled_bindings(&monitor.id).await {
            Ok(b) => b,
            Err(e) => {
                error!(error = %e, "failed to load notification bindings");
                return;
            }
        };
        if bindings.is_empty() {
            return;
        }

        let recent = match self.repository.recent_history(&monitor.id, 2).await {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "failed to load recent history");
                return;
            }
        };
        let is_new = recent.len() <= 1;

        let real_prev = if prev_status.is_some() {
            prev_status
        } else if !is_new {
            recent.get(1).map(|r| r.status)
        } else {
            None
        };

        // A stable UP has nothing to gate. A stable DOWN still has to reach
        // `plan_down` below — its own resend-interval check is the gate for
        // repeat failures, so it must not be short-circuited here.
        if new_status == Status::Up && prev_status == Some(Status::Up) {
            return;
        }
        if is_new && new_status == Status::Up {
            return;
        }

        let now = Utc::now();

        let (prefix, failure_info, should_emit) = match new_status {
            Status::Down => match self.plan_down(monitor, now).await {
                Some((prefix, info)) => (Some(prefix), Some(info), true),
                None => (None, None, false),
            },
            Status::Up => {
                let prefix = if real_prev == Some(Status::Down) && !is_new {
                    let last = self.last_notified_entry(&monitor.id);
                    let minutes = match last {
                        Some(ln) if ln.status == Status::Down => {
                            (now - ln.time).num_seconds() / 60
                        }
                        _ => 0,
                    };
                    Some(format!("监控已恢复正常。故障持续了约 {minutes} 分钟。"))
                } else {
                    None
                };
                (prefix, None, true)
            }
            Status::Pending => unreachable!("filtered above"),
        };

        if !should_emit {
            return;
        }

        self.last_notified.lock().unwrap().insert(
            monitor.id.clone(),
            LastNotified {
                time: now,
                status: new_status,
            },
        );

        self.dispatch(monitor, new_status, message, prefix, failure_info, bindings, now)
            .await;
    }

    fn last_notified_entry(&self, monitor_id: &str) -> Option<LastNotified> {
        self.last_notified.lock().unwrap().get(monitor_id).copied()
    }

    /// Implements the DOWN branch of the decision rules, returning the
    /// aggregated-failure prefix line and data when a notification should
    /// be emitted, or `None` when the repeat-interval rule says "not yet".
    async fn plan_down(
        &self,
        monitor: &Monitor,
        now: DateTime<Utc>,
    ) -> Option<(String, FailureInfo)> {
        let last = self.last_notified_entry(&monitor.id);

        if let Some(ln) = last.filter(|ln| ln.status == Status::Down) {
            if monitor.resend_interval > 0 {
                let count = self
                    .repository
                    .count_with_status_after(&monitor.id, Status::Down, ln.time)
                    .await
                    .unwrap_or(0);
                if count < monitor.resend_interval as i64 {
                    return None;
                }
            } else {
                return None;
            }
        }

        let most_recent_up = self
            .repository
            .find_most_recent_with_status(&monitor.id, Status::Up)
            .await
            .unwrap_or(None);
        let failure_start = most_recent_up
            .map(|r| r.timestamp)
            .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap());

        let failure_count = self
            .repository
            .count_with_status_after(&monitor.id, Status::Down, failure_start)
            .await
            .unwrap_or(0);
        let first_failure_time = self
            .repository
            .find_earliest_with_status_after(&monitor.id, Status::Down, failure_start)
            .await
            .unwrap_or(None)
            .map(|r| r.timestamp)
            .unwrap_or(now);
        let duration_minutes = (now - first_failure_time).num_seconds() / 60;

        let prefix = format!(
            "连续失败 {failure_count} 次，首次失败于 {}，持续 {duration_minutes} 分钟",
            first_failure_time.to_rfc3339()
        );
        let info = FailureInfo {
            count: failure_count,
            first_failure_time,
            last_failure_time: now,
            duration_minutes,
        };
        Some((prefix, info))
    }

    async fn dispatch(
        &self,
        monitor: &Monitor,
        new_status: Status,
        message: &str,
        prefix: Option<String>,
        failure_info: Option<FailureInfo>,
        bindings: Vec<crate::repository::ResolvedBinding>,
        now: DateTime<Utc>,
    ) {
        let address = monitor.address();
        let mut full_message = String::new();
        if let Some(addr) = &address {
            full_message.push_str(&format!("监控地址: {addr}\n"));
        }
        if let Some(p) = &prefix {
            full_message.push_str(p);
            full_message.push('\n');
        }
        full_message.push_str(message);

        let data = NotificationData {
            monitor_name: monitor.name.clone(),
            monitor_type: monitor.kind.type_name().to_string(),
            status: new_status,
            status_text: new_status.as_zh().to_string(),
            status_code: new_status as i32,
            time: now,
            message: full_message,
            address,
            failure_info,
        };

        let futures = bindings.into_iter().map(|binding| {
            let data = data.clone();
            let client = self.client.clone();
            async move {
                let channel = binding.channel;
                if let Err(e) = dispatch_to_channel(&client, &channel.config, &data).await {
                    error!(channel = %channel.name, error = %e, "notification dispatch failed");
                }
            }
        });
        futures::future::join_all(futures).await;
    }
}

/// Sends a canned test payload through one channel, for the control
/// surface's synchronous `testChannel`.
pub async fn test_channel(config: &ChannelConfig) -> DispatchResult {
    let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
    let now = Utc::now();
    let data = NotificationData {
        monitor_name: "测试监控".to_string(),
        monitor_type: "http".to_string(),
        status: Status::Up,
        status_text: Status::Up.as_zh().to_string(),
        status_code: Status::Up as i32,
        time: now,
        message: "这是一条测试通知".to_string(),
        address: Some("https://example.com".to_string()),
        failure_info: None,
    };
    dispatch_to_channel(&client, config, &data).await
}

async fn dispatch_to_channel(
    client: &Client,
    config: &ChannelConfig,
    data: &NotificationData,
) -> DispatchResult {
    match config {
        ChannelConfig::Email(cfg) => email::send(cfg, data).await,
        ChannelConfig::Webhook(cfg) => webhook::send(client, cfg, data).await,
        ChannelConfig::WechatPush(cfg) => wechat::send(client, cfg, data).await,
        ChannelConfig::Dingtalk(cfg) => dingtalk::send(client, cfg, data).await,
        ChannelConfig::Wecom(cfg) => wecom::send(client, cfg, data).await,
    }
}

/// Template variables available to dispatcher `{field}` templates (§6).
pub(crate) fn template_vars(data: &NotificationData) -> HashMap<&'static str, String> {
    let mut vars = HashMap::new();
    vars.insert("monitorName", data.monitor_name.clone());
    vars.insert("monitorType", data.monitor_type.clone());
    vars.insert("status", (data.status as i32).to_string());
    vars.insert("statusText", data.status_text.clone());
    vars.insert("statusCode", data.status_code.to_string());
    vars.insert("time", data.time.to_rfc3339());
    vars.insert("message", data.message.clone());
    if let Some(f) = &data.failure_info {
        vars.insert("failureCount", f.count.to_string());
        vars.insert("firstFailureTime", f.first_failure_time.to_rfc3339());
        vars.insert("lastFailureTime", f.last_failure_time.to_rfc3339());
        vars.insert("failureDuration", f.duration_minutes.to_string());
    }
    vars
}

/// Substitutes `{field}` placeholders. When `escape_json` is set, each
/// substituted value is escaped (`\ " \n \r \t`) so the result parses as
/// JSON when the surrounding template is a JSON document.
pub(crate) fn render_template(
    template: &str,
    vars: &HashMap<&'static str, String>,
    escape_json: bool,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        rest = &rest[open + 1..];
        let Some(close) = rest.find('}') else {
            out.push('{');
            break;
        };
        let field = &rest[..close];
        match vars.get(field) {
            Some(value) => {
                if escape_json {
                    out.push_str(&escape_json_string(value));
                } else {
                    out.push_str(value);
                }
            }
            None => {
                out.push('{');
                out.push_str(field);
                out.push('}');
            }
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}

fn escape_json_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

pub(crate) fn markdown_body(data: &NotificationData) -> String {
    format!(
        "### {} 状态{}\n\n{}\n\n时间: {}",
        data.monitor_name,
        data.status_text,
        data.message,
        data.time.to_rfc3339()
    )
}
