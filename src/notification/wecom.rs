//! Enterprise WeChat (WeCom) robot dispatcher (§4.6).
//!
//! Same markdown body and success criteria as [`super::dingtalk`], minus
//! the request-signing step WeCom's robot API doesn't require.

use std::time::Duration;

use anyhow::{bail, Context};
use reqwest::Client;
use serde_json::json;

use crate::model::WecomChannelConfig;

use super::{markdown_body, DispatchResult, NotificationData};

pub async fn send(
    client: &Client,
    cfg: &WecomChannelConfig,
    data: &NotificationData,
) -> DispatchResult {
    let payload = json!({
        "msgtype": "markdown",
        "markdown": { "content": markdown_body(data) },
    });

    let response = client
        .post(&cfg.webhook_url)
        .timeout(Duration::from_secs(10))
        .json(&payload)
        .send()
        .await
        .context("wecom request failed")?;

    if !response.status().is_success() {
        bail!("wecom responded with status {}", response.status());
    }

    let body: serde_json::Value = response.json().await.unwrap_or(json!({}));
    if let Some(errcode) = body.get("errcode").and_then(|v| v.as_i64()) {
        if errcode != 0 {
            bail!("wecom errcode {errcode}");
        }
    }
    Ok(())
}
