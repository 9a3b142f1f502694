//! Core data model: monitors, status history, notification channels.
//!
//! These types mirror the shape of the underlying tables one-to-one; the
//! repository layer is responsible for mapping them to and from SQL rows.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a single probe attempt, or of a monitor's last-known state.
///
/// The engine only ever produces `Up`/`Down`; `Pending` is reserved for a
/// push monitor that has not yet received its first heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum Status {
    Down = 0,
    Up = 1,
    Pending = 2,
}

impl Status {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Status::Down),
            1 => Some(Status::Up),
            2 => Some(Status::Pending),
            _ => None,
        }
    }

    /// Chinese status text as used in dispatcher templates and subjects.
    pub fn as_zh(&self) -> &'static str {
        match self {
            Status::Up => "正常",
            Status::Down => "异常",
            Status::Pending => "等待中",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", *self as i32)
    }
}

/// Which executor a monitor uses, and its type-specific configuration.
///
/// A tagged sum over the executor-configuration shapes, per the
/// polymorphic-executor design note, rather than a string type tag plus a
/// loosely-typed config map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MonitorKind {
    Http(HttpConfig),
    HttpsCert(HttpsCertConfig),
    Keyword(KeywordConfig),
    Port(PortConfig),
    Mysql(DatabaseConfig),
    Redis(DatabaseConfig),
    Icmp(IcmpConfig),
    Push(PushConfig),
}

impl MonitorKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            MonitorKind::Http(_) => "http",
            MonitorKind::HttpsCert(_) => "https-cert",
            MonitorKind::Keyword(_) => "keyword",
            MonitorKind::Port(_) => "port",
            MonitorKind::Mysql(_) => "mysql",
            MonitorKind::Redis(_) => "redis",
            MonitorKind::Icmp(_) => "icmp",
            MonitorKind::Push(_) => "push",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
}

impl Default for HttpMethod {
    fn default() -> Self {
        HttpMethod::Get
    }
}

fn default_connect_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub url: String,
    #[serde(default)]
    pub http_method: HttpMethod,
    /// `"200"` or `"200-299"`; empty/absent accepts any 2xx.
    pub status_codes: Option<String>,
    pub request_body: Option<String>,
    #[serde(default)]
    pub request_headers: HashMap<String, String>,
    #[serde(default)]
    pub ignore_tls: bool,
    pub max_redirects: Option<u32>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default)]
    pub notify_cert_expiry: bool,
    /// Days before expiry that `notifyCertExpiry` treats as DOWN.
    ///
    /// The source specification leaves this threshold unspecified; it is
    /// surfaced here as a knob instead of a hidden constant.
    #[serde(default = "default_cert_expiry_warning_days")]
    pub cert_expiry_warning_days: i64,
}

fn default_cert_expiry_warning_days() -> i64 {
    14
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpsCertConfig {
    pub url: String,
    #[serde(default)]
    pub ignore_tls: bool,
    pub max_redirects: Option<u32>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordConfig {
    #[serde(flatten)]
    pub http: HttpConfig,
    /// Comma-separated (ASCII comma), case-sensitive literal substrings.
    pub keyword: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    pub hostname: String,
    pub port: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub hostname: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub query: Option<String>,
}

fn default_packet_count() -> u32 {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcmpConfig {
    pub hostname: String,
    #[serde(default = "default_packet_count")]
    pub packet_count: u32,
    #[serde(default)]
    pub max_packet_loss: f64,
    pub max_response_time: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    pub token: String,
    pub push_interval: u64,
}

/// A configured probe target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: String,
    pub name: String,
    pub active: bool,
    /// Seconds between checks, >= 1.
    pub interval: u64,
    pub retries: u32,
    /// Seconds between retry attempts, >= 1.
    pub retry_interval: u64,
    /// Consecutive DOWN probes between repeat alerts; 0 disables repeats.
    pub resend_interval: u32,
    pub upside_down: bool,
    pub kind: MonitorKind,
    pub group_id: Option<String>,
    pub description: Option<String>,

    // Derived / last-known fields, updated atomically with each history
    // row by the recorder.
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_status: Option<Status>,
    pub last_message: Option<String>,
    pub last_ping: Option<i64>,
}

impl Monitor {
    /// `"监控地址: <addr>"` source: a URL if present, else `host:port`.
    pub fn address(&self) -> Option<String> {
        match &self.kind {
            MonitorKind::Http(c) => Some(c.url.clone()),
            MonitorKind::HttpsCert(c) => Some(c.url.clone()),
            MonitorKind::Keyword(c) => Some(c.http.url.clone()),
            MonitorKind::Port(c) => Some(format!("{}:{}", c.hostname, c.port)),
            MonitorKind::Mysql(c) | MonitorKind::Redis(c) => {
                Some(format!("{}:{}", c.hostname, c.port))
            }
            MonitorKind::Icmp(c) => Some(c.hostname.clone()),
            MonitorKind::Push(_) => None,
        }
    }
}

/// One immutable row of probe history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatusRow {
    pub id: String,
    pub monitor_id: String,
    pub status: Status,
    /// `null` iff `status == Up` and the monitor type is not `push`.
    pub message: Option<String>,
    pub ping: Option<i64>,
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Result of a single probe attempt, before retry/upside-down handling.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub status: Status,
    pub message: String,
    pub ping: Option<i64>,
    pub details: Option<serde_json::Value>,
}

impl CheckResult {
    pub fn up(message: impl Into<String>, ping: Option<i64>) -> Self {
        Self {
            status: Status::Up,
            message: message.into(),
            ping,
            details: None,
        }
    }

    pub fn down(message: impl Into<String>) -> Self {
        Self {
            status: Status::Down,
            message: message.into(),
            ping: None,
            details: None,
        }
    }

    pub fn with_ping(mut self, ping: Option<i64>) -> Self {
        self.ping = ping;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelType {
    Email,
    Webhook,
    WechatPush,
    Dingtalk,
    Wecom,
}

impl ChannelType {
    /// Chinese channel-type name, as stored/displayed per the data model.
    pub fn as_zh(&self) -> &'static str {
        match self {
            ChannelType::Email => "邮件",
            ChannelType::Webhook => "Webhook",
            ChannelType::WechatPush => "微信推送",
            ChannelType::Dingtalk => "钉钉推送",
            ChannelType::Wecom => "企业微信推送",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailChannelConfig {
    pub email: String,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookChannelConfig {
    pub url: String,
    #[serde(default)]
    pub method: Option<HttpMethod>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub content_type: Option<String>,
    pub body_template: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WechatPushChannelConfig {
    pub push_url: String,
    pub title_template: Option<String>,
    pub content_template: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DingtalkChannelConfig {
    pub webhook_url: String,
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WecomChannelConfig {
    pub webhook_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelConfig {
    Email(EmailChannelConfig),
    Webhook(WebhookChannelConfig),
    WechatPush(WechatPushChannelConfig),
    Dingtalk(DingtalkChannelConfig),
    Wecom(WecomChannelConfig),
}

impl ChannelConfig {
    pub fn channel_type(&self) -> ChannelType {
        match self {
            ChannelConfig::Email(_) => ChannelType::Email,
            ChannelConfig::Webhook(_) => ChannelType::Webhook,
            ChannelConfig::WechatPush(_) => ChannelType::WechatPush,
            ChannelConfig::Dingtalk(_) => ChannelType::Dingtalk,
            ChannelConfig::Wecom(_) => ChannelType::Wecom,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub config: ChannelConfig,
    pub default_for_new_monitors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationBinding {
    pub monitor_id: String,
    pub channel_id: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorGroup {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub display_order: i32,
}
