//! WeChat push dispatcher (§4.6).

use std::time::Duration;

use anyhow::{bail, Context};
use reqwest::Client;
use serde_json::json;

use crate::model::WechatPushChannelConfig;

use super::{render_template, template_vars, DispatchResult, NotificationData};

pub async fn send(
    client: &Client,
    cfg: &WechatPushChannelConfig,
    data: &NotificationData,
) -> DispatchResult {
    let vars = template_vars(data);
    let title = cfg
        .title_template
        .as_deref()
        .map(|t| render_template(t, &vars, true))
        .unwrap_or_else(|| format!("{} 状态{}", data.monitor_name, data.status_text));
    let content = cfg
        .content_template
        .as_deref()
        .map(|t| render_template(t, &vars, true))
        .unwrap_or_else(|| data.message.clone());

    let response = client
        .post(&cfg.push_url)
        .timeout(Duration::from_secs(10))
        .json(&json!({ "title": title, "content": content }))
        .send()
        .await
        .context("wechat push request failed")?;

    if !response.status().is_success() {
        bail!("wechat push responded with status {}", response.status());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;
    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn sends_title_and_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = Client::new();
        let cfg = WechatPushChannelConfig {
            push_url: format!("{}/push", server.uri()),
            title_template: None,
            content_template: None,
        };
        let data = NotificationData {
            monitor_name: "api".into(),
            monitor_type: "http".into(),
            status: Status::Up,
            status_text: "正常".into(),
            status_code: 1,
            time: Utc::now(),
            message: "恢复正常".into(),
            address: None,
            failure_info: None,
        };
        send(&client, &cfg, &data).await.unwrap();
    }
}
