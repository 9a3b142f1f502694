//! End-to-end scenario tests, one per numbered scenario.
//!
//! These wire the real pieces together (SQLite repository, recorder, retry
//! wrapper, HTTP executor, notification engine, dispatchers) against
//! `wiremock` stand-ins for the monitored target and the notification
//! channel, instead of exercising any single module in isolation.

use std::sync::Arc;
use std::time::Duration;

use guardia_monitor::executors::http;
use guardia_monitor::id::CompactIdGenerator;
use guardia_monitor::model::{
    ChannelConfig, DingtalkChannelConfig, HttpConfig, HttpMethod, Monitor, MonitorKind,
    WebhookChannelConfig,
};
use guardia_monitor::notification::NotificationEngine;
use guardia_monitor::recorder::Recorder;
use guardia_monitor::repository::sqlite::SqliteRepository;
use guardia_monitor::repository::MonitorRepository;
use guardia_monitor::retry::with_retry;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Opens a fresh SQLite repository backed by a temp file, returning both the
/// repository and the path, since test setup needs raw SQL access the
/// repository trait deliberately doesn't expose (channel/binding CRUD is the
/// external collaborator's job, not the core's).
async fn new_repo() -> (Arc<dyn MonitorRepository>, String) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.db");
    std::mem::forget(dir);
    let path = path.to_str().unwrap().to_string();
    let repo = SqliteRepository::new(&path).await.unwrap();
    (Arc::new(repo), path)
}

async fn bind_channel(db_path: &str, monitor_id: &str, channel_id: &str, config: &ChannelConfig) {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect(&format!("sqlite://{db_path}"))
        .await
        .unwrap();
    let config_json = serde_json::to_string(config).unwrap();
    sqlx::query(
        "INSERT INTO notification_channels (id, name, enabled, config_json, default_for_new_monitors) \
         VALUES (?1, 'test channel', 1, ?2, 0)",
    )
    .bind(channel_id)
    .bind(&config_json)
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO notification_bindings (monitor_id, channel_id, enabled) VALUES (?1, ?2, 1)",
    )
    .bind(monitor_id)
    .bind(channel_id)
    .execute(&pool)
    .await
    .unwrap();
}

fn http_monitor(id: &str, url: String, resend_interval: u32) -> Monitor {
    Monitor {
        id: id.to_string(),
        name: "api".to_string(),
        active: true,
        interval: 60,
        retries: 1,
        retry_interval: 1,
        resend_interval,
        upside_down: false,
        kind: MonitorKind::Http(HttpConfig {
            url,
            http_method: HttpMethod::Get,
            status_codes: None,
            request_body: None,
            request_headers: Default::default(),
            ignore_tls: false,
            max_redirects: None,
            connect_timeout: 5,
            notify_cert_expiry: false,
            cert_expiry_warning_days: 14,
        }),
        group_id: None,
        description: None,
        last_check_at: None,
        last_status: None,
        last_message: None,
        last_ping: None,
    }
}

fn webhook_config(url: String) -> ChannelConfig {
    ChannelConfig::Webhook(WebhookChannelConfig {
        url,
        method: None,
        headers: Default::default(),
        content_type: None,
        body_template: None,
    })
}

/// Scenario 1: a brand-new HTTP monitor's first probe succeeds. No
/// notification fires (nothing is bound, and a brand-new UP is a no-op
/// anyway), and the compact history message is `null` on a non-push UP.
#[tokio::test]
async fn scenario_1_brand_new_http_monitor_succeeds() {
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;

    let (repo, _path) = new_repo().await;
    let monitor = http_monitor("m1", format!("{}/ok", target.uri()), 0);
    repo.upsert_monitor(&monitor).await.unwrap();

    let recorder = Recorder::new(repo.clone(), Arc::new(CompactIdGenerator::new()));
    let notifier = NotificationEngine::new(repo.clone());

    let cfg = match &monitor.kind {
        MonitorKind::Http(c) => c.clone(),
        _ => unreachable!(),
    };
    let result = with_retry(monitor.retries, Duration::from_millis(1), || http::check(&cfg)).await;
    assert_eq!(result.status, guardia_monitor::model::Status::Up);

    recorder.record(&monitor, &result).await.unwrap();
    notifier
        .evaluate(&monitor, result.status, &result.message, None)
        .await;

    let history = repo.recent_history("m1", 1).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].message.is_none(), "UP history message must be null for a non-push monitor");
}

/// Scenario 2: a transient failure recovers inside the retry budget. The
/// probe still records as UP (compact message stays null) even though the
/// underlying message names the retry that rescued it.
#[tokio::test]
async fn scenario_2_transient_failure_recovers_via_retry() {
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&target)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(2)
        .mount(&target)
        .await;

    let (repo, _path) = new_repo().await;
    let monitor = http_monitor("m2", format!("{}/flaky", target.uri()), 0);
    repo.upsert_monitor(&monitor).await.unwrap();
    let recorder = Recorder::new(repo.clone(), Arc::new(CompactIdGenerator::new()));

    let cfg = match &monitor.kind {
        MonitorKind::Http(c) => c.clone(),
        _ => unreachable!(),
    };
    let result = with_retry(1, Duration::from_millis(1), || http::check(&cfg)).await;
    assert_eq!(result.status, guardia_monitor::model::Status::Up);
    assert_eq!(result.message, "重试成功 (1/1): HTTP 200");

    recorder.record(&monitor, &result).await.unwrap();
    let history = repo.recent_history("m2", 1).await.unwrap();
    assert!(history[0].message.is_none());
}

/// Scenarios 3 + 4: a persistent failure with `resendInterval = 2` notifies
/// on probes 1, 3 and 5 (the repeat-interval gate), then the recovery probe
/// fires exactly one more, carrying the "故障持续了约 N 分钟" recovery line.
#[tokio::test]
async fn scenario_3_and_4_aggregated_failures_then_recovery() {
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&target)
        .await;

    let channel_target = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&channel_target)
        .await;

    let (repo, db_path) = new_repo().await;
    let monitor = http_monitor("m3", format!("{}/down", target.uri()), 2);
    repo.upsert_monitor(&monitor).await.unwrap();
    bind_channel(
        &db_path,
        "m3",
        "c1",
        &webhook_config(format!("{}/hook", channel_target.uri())),
    )
    .await;

    let recorder = Recorder::new(repo.clone(), Arc::new(CompactIdGenerator::new()));
    let notifier = NotificationEngine::new(repo.clone());
    let cfg = match &monitor.kind {
        MonitorKind::Http(c) => c.clone(),
        _ => unreachable!(),
    };

    let mut prev_status = None;
    for _ in 0..5 {
        let result = with_retry(0, Duration::from_millis(1), || http::check(&cfg)).await;
        assert_eq!(result.status, guardia_monitor::model::Status::Down);
        recorder.record(&monitor, &result).await.unwrap();
        notifier
            .evaluate(&monitor, result.status, &result.message, prev_status)
            .await;
        prev_status = Some(result.status);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let after_failures = channel_target.received_requests().await.unwrap();
    assert_eq!(
        after_failures.len(),
        3,
        "expected notifications on probes 1, 3 and 5 under resendInterval=2"
    );

    Mock::given(method("GET"))
        .and(path("/recovered"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;
    let mut recovered_cfg = cfg.clone();
    recovered_cfg.url = format!("{}/recovered", target.uri());
    let result = with_retry(0, Duration::from_millis(1), || http::check(&recovered_cfg)).await;
    assert_eq!(result.status, guardia_monitor::model::Status::Up);
    recorder.record(&monitor, &result).await.unwrap();
    notifier
        .evaluate(&monitor, result.status, &result.message, prev_status)
        .await;

    let after_recovery = channel_target.received_requests().await.unwrap();
    assert_eq!(after_recovery.len(), 4, "recovery fires exactly one more notification");

    let last_body: serde_json::Value =
        serde_json::from_slice(&after_recovery.last().unwrap().body).unwrap();
    let message = last_body["monitor"]["message"].as_str().unwrap();
    assert!(message.contains("监控已恢复正常"), "recovery message missing: {message}");
}

/// Scenario 5: a DingTalk channel's request carries the HMAC-signed query
/// string derived from its configured secret.
#[tokio::test]
async fn scenario_5_dingtalk_dispatch_is_signed() {
    let channel_target = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"errcode": 0})))
        .mount(&channel_target)
        .await;

    let (repo, db_path) = new_repo().await;
    let monitor = http_monitor("m5", "http://unused.invalid/".to_string(), 0);
    repo.upsert_monitor(&monitor).await.unwrap();
    bind_channel(
        &db_path,
        "m5",
        "c-dingtalk",
        &ChannelConfig::Dingtalk(DingtalkChannelConfig {
            webhook_url: format!("{}/robot/send?access_token=x", channel_target.uri()),
            secret: Some("mysecret".to_string()),
        }),
    )
    .await;

    let notifier = NotificationEngine::new(repo.clone());
    notifier
        .evaluate(
            &monitor,
            guardia_monitor::model::Status::Down,
            "CONNECTION_REFUSED",
            None,
        )
        .await;

    let requests = channel_target.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let url = requests[0].url.to_string();
    assert!(url.contains("timestamp="));
    assert!(url.contains("sign="));
}

/// Scenario 6: rapid-fire probes on the same monitor never collide on their
/// compact history id, because the recorder's primary key would reject a
/// collision outright.
#[tokio::test]
async fn scenario_6_compact_ids_do_not_collide_under_load() {
    let (repo, _path) = new_repo().await;
    let monitor = http_monitor("m6", "http://unused.invalid/".to_string(), 0);
    repo.upsert_monitor(&monitor).await.unwrap();

    let recorder = Recorder::new(repo.clone(), Arc::new(CompactIdGenerator::new()));
    for i in 0..50 {
        let result = guardia_monitor::model::CheckResult::up(format!("probe {i}"), Some(1));
        recorder.record(&monitor, &result).await.unwrap();
    }

    let history = repo.recent_history("m6", 100).await.unwrap();
    assert_eq!(history.len(), 50);
    let unique: std::collections::HashSet<_> = history.iter().map(|r| r.id.clone()).collect();
    assert_eq!(unique.len(), 50, "every recorded row must have a distinct id");
}
