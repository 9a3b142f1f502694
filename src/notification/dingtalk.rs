//! DingTalk robot dispatcher (§4.6).

use std::time::Duration;

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::json;
use sha2::Sha256;

use crate::model::DingtalkChannelConfig;

use super::{markdown_body, DispatchResult, NotificationData};

type HmacSha256 = Hmac<Sha256>;

/// Builds the signed URL per §8 scenario 5:
/// `<webhookUrl>&timestamp=<ts>&sign=<urlencode(base64(HMAC-SHA256(secret, "<ts>\n<secret>")))>`.
fn signed_url(webhook_url: &str, secret: &str, timestamp_millis: i64) -> anyhow::Result<String> {
    let string_to_sign = format!("{timestamp_millis}\n{secret}");
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).context("invalid dingtalk secret")?;
    mac.update(string_to_sign.as_bytes());
    let sign = STANDARD.encode(mac.finalize().into_bytes());
    let separator = if webhook_url.contains('?') { '&' } else { '?' };
    Ok(format!(
        "{webhook_url}{separator}timestamp={timestamp_millis}&sign={}",
        urlencoding::encode(&sign)
    ))
}

pub async fn send(
    client: &Client,
    cfg: &DingtalkChannelConfig,
    data: &NotificationData,
) -> DispatchResult {
    let url = match &cfg.secret {
        Some(secret) => signed_url(&cfg.webhook_url, secret, chrono::Utc::now().timestamp_millis())?,
        None => cfg.webhook_url.clone(),
    };

    let payload = json!({
        "msgtype": "markdown",
        "markdown": {
            "title": format!("{} 状态{}", data.monitor_name, data.status_text),
            "text": markdown_body(data),
        },
    });

    let response = client
        .post(&url)
        .timeout(Duration::from_secs(10))
        .json(&payload)
        .send()
        .await
        .context("dingtalk request failed")?;

    if !response.status().is_success() {
        bail!("dingtalk responded with status {}", response.status());
    }

    let body: serde_json::Value = response.json().await.unwrap_or(json!({}));
    if let Some(errcode) = body.get("errcode").and_then(|v| v.as_i64()) {
        if errcode != 0 {
            bail!("dingtalk errcode {errcode}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_url_matches_scenario_5() {
        let url = signed_url("https://oapi.dingtalk.com/robot/send?access_token=x", "s", 1700000000000)
            .unwrap();
        assert!(url.starts_with("https://oapi.dingtalk.com/robot/send?access_token=x&timestamp=1700000000000&sign="));

        let mut mac = HmacSha256::new_from_slice(b"s").unwrap();
        mac.update(b"1700000000000\ns");
        let expected_sign = STANDARD.encode(mac.finalize().into_bytes());
        let expected = format!(
            "https://oapi.dingtalk.com/robot/send?access_token=x&timestamp=1700000000000&sign={}",
            urlencoding::encode(&expected_sign)
        );
        assert_eq!(url, expected);
    }

    #[test]
    fn separator_depends_on_existing_query_string() {
        let with_query = signed_url("https://example.com/hook?token=a", "s", 1).unwrap();
        assert!(with_query.contains("?token=a&timestamp=1"));

        let without_query = signed_url("https://example.com/hook", "s", 1).unwrap();
        assert!(without_query.contains("/hook?timestamp=1"));
    }
}
