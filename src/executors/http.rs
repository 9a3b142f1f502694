//! `http` executor (§4.2.1).

use std::time::{Duration, Instant};

use reqwest::redirect::Policy;

use crate::model::{CheckResult, HttpConfig, HttpMethod};
use crate::tls_cert;

use super::DEFAULT_TIMEOUT;

/// Parses `"200"` or `"200-299"` into an inclusive range. Empty/absent
/// accepts any 2xx.
fn accepted_status_range(spec: &Option<String>) -> (u16, u16) {
    match spec.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => (200, 299),
        Some(single) if !single.contains('-') => single
            .parse()
            .map(|code| (code, code))
            .unwrap_or((200, 299)),
        Some(range) => {
            let mut parts = range.splitn(2, '-');
            match (parts.next(), parts.next()) {
                (Some(lo), Some(hi)) => match (lo.parse(), hi.parse()) {
                    (Ok(lo), Ok(hi)) => (lo, hi),
                    _ => (200, 299),
                },
                _ => (200, 299),
            }
        }
    }
}

fn method_of(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Options => reqwest::Method::OPTIONS,
        HttpMethod::Patch => reqwest::Method::PATCH,
    }
}

fn build_client(cfg: &HttpConfig) -> Result<reqwest::Client, CheckResult> {
    let redirects = match cfg.max_redirects {
        Some(0) => Policy::none(),
        Some(n) => Policy::limited(n as usize),
        None => Policy::default(),
    };

    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .connect_timeout(Duration::from_secs(cfg.connect_timeout))
        .redirect(redirects)
        .danger_accept_invalid_certs(cfg.ignore_tls)
        .build()
        .map_err(|e| CheckResult::down(format!("配置无效: {e}")))
}

/// Performs the HTTP request portion shared with the `keyword` executor.
/// Returns the response body and measured ping on success, or a DOWN
/// [`CheckResult`] describing the network/status failure.
pub(super) async fn execute_request(
    cfg: &HttpConfig,
) -> Result<(String, i64, reqwest::StatusCode), CheckResult> {
    let client = build_client(cfg)?;
    let (lo, hi) = accepted_status_range(&cfg.status_codes);

    let mut builder = client.request(method_of(cfg.http_method), &cfg.url);
    for (key, value) in &cfg.request_headers {
        builder = builder.header(key, value);
    }
    if let Some(body) = &cfg.request_body {
        builder = builder.body(body.clone());
    }

    let start = Instant::now();
    let response = builder.send().await.map_err(|e| {
        let message = if e.is_timeout() {
            "TIMEOUT".to_string()
        } else if e.is_connect() {
            "CONNECTION_REFUSED".to_string()
        } else {
            format!("NETWORK_ERROR: {e}")
        };
        CheckResult::down(message)
    })?;
    let ping = start.elapsed().as_millis() as i64;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if !(lo..=hi).contains(&status.as_u16()) {
        return Err(CheckResult::down(format!(
            "状态码超出范围: {} (期望 {}-{})",
            status.as_u16(),
            lo,
            hi
        ))
        .with_ping(Some(ping)));
    }

    Ok((body, ping, status))
}

pub async fn check(cfg: &HttpConfig) -> CheckResult {
    if cfg.url.trim().is_empty() {
        return CheckResult::down("配置无效: url 不能为空");
    }

    let (_, ping, status) = match execute_request(cfg).await {
        Ok(ok) => ok,
        Err(down) => return down,
    };

    if cfg.notify_cert_expiry && cfg.url.starts_with("https://") {
        if let Some(down) = check_cert_expiry(cfg).await {
            return down;
        }
    }

    CheckResult::up(format!("HTTP {}", status.as_u16()), Some(ping))
}

async fn check_cert_expiry(cfg: &HttpConfig) -> Option<CheckResult> {
    let url = url::Url::parse(&cfg.url).ok()?;
    let host = url.host_str()?.to_string();
    let port = url.port_or_known_default().unwrap_or(443);

    match tls_cert::fetch_leaf_cert(
        &host,
        port,
        cfg.ignore_tls,
        Duration::from_secs(cfg.connect_timeout),
    )
    .await
    {
        Ok(cert) => {
            let days = tls_cert::days_until(cert.not_after);
            if days < 0 {
                Some(CheckResult::down(format!("证书已于 {} 天前过期", -days)))
            } else if days <= cfg.cert_expiry_warning_days {
                Some(CheckResult::down(format!("证书将在 {days} 天后过期")))
            } else {
                None
            }
        }
        Err(e) => Some(CheckResult::down(format!("TLS_ERROR: {e}"))),
    }
}
