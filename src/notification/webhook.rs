//! Generic webhook dispatcher (§4.6).

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde_json::json;

use crate::model::{HttpMethod, WebhookChannelConfig};

use super::{render_template, template_vars, DispatchResult, NotificationData};

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

fn default_payload(data: &NotificationData) -> serde_json::Value {
    json!({
        "event": "status_change",
        "timestamp": data.time.to_rfc3339(),
        "monitor": {
            "name": data.monitor_name,
            "type": data.monitor_type,
            "status": data.status_text,
            "status_code": data.status_code,
            "time": data.time.to_rfc3339(),
            "message": data.message,
            "address": data.address,
        },
        "failure_info": data.failure_info.as_ref().map(|f| json!({
            "count": f.count,
            "first_failure_time": f.first_failure_time.to_rfc3339(),
            "last_failure_time": f.last_failure_time.to_rfc3339(),
            "duration_minutes": f.duration_minutes,
        })),
    })
}

pub async fn send(
    client: &Client,
    cfg: &WebhookChannelConfig,
    data: &NotificationData,
) -> DispatchResult {
    let method = cfg.method.unwrap_or(HttpMethod::Post);
    let content_type = cfg
        .content_type
        .clone()
        .unwrap_or_else(|| "application/json".to_string());

    let body = match &cfg.body_template {
        Some(template) => {
            let vars = template_vars(data);
            render_template(template, &vars, content_type.contains("json"))
        }
        None => default_payload(data).to_string(),
    };

    let mut builder = client
        .request(method_of(method), &cfg.url)
        .timeout(Duration::from_secs(10))
        .header("Content-Type", &content_type);
    for (key, value) in &cfg.headers {
        builder = builder.header(key, value);
    }

    let response = builder
        .body(body)
        .send()
        .await
        .context("webhook request failed")?;
    if !response.status().is_success() {
        bail!("webhook responded with status {}", response.status());
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

    fn sample_data() -> NotificationData {
        NotificationData {
            monitor_name: "api".into(),
            monitor_type: "http".into(),
            status: Status::Down,
            status_text: "异常".into(),
            status_code: 0,
            time: Utc::now(),
            message: "监控地址: http://x\n连接失败".into(),
            address: Some("http://x".into()),
            failure_info: None,
        }
    }

    #[tokio::test]
    async fn default_payload_parses_as_json_and_posts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = Client::new();
        let cfg = WebhookChannelConfig {
            url: format!("{}/hook", server.uri()),
            method: None,
            headers: Default::default(),
            content_type: None,
            body_template: None,
        };
        send(&client, &cfg, &sample_data()).await.unwrap();
    }

    #[tokio::test]
    async fn non_2xx_response_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = Client::new();
        let cfg = WebhookChannelConfig {
            url: format!("{}/hook", server.uri()),
            method: None,
            headers: Default::default(),
            content_type: None,
            body_template: None,
        };
        assert!(send(&client, &cfg, &sample_data()).await.is_err());
    }

    #[test]
    fn body_template_with_json_content_type_parses() {
        let data = sample_data();
        let vars = template_vars(&data);
        let template = r#"{"name": "{monitorName}", "msg": "{message}"}"#;
        let rendered = render_template(template, &vars, true);
        let _: serde_json::Value = serde_json::from_str(&rendered).unwrap();
    }
}
