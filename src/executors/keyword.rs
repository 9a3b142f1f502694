//! `keyword` executor (§4.2.3).

use crate::model::{CheckResult, KeywordConfig};

use super::http;

pub async fn check(cfg: &KeywordConfig) -> CheckResult {
    if cfg.keyword.trim().is_empty() {
        return CheckResult::down("配置无效: keyword 不能为空");
    }

    let (body, ping, status) = match http::execute_request(&cfg.http).await {
        Ok(ok) => ok,
        Err(down) => return down,
    };

    let keywords: Vec<&str> = cfg.keyword.split(',').map(str::trim).collect();
    match keywords.iter().find(|k| !k.is_empty() && body.contains(*k)) {
        Some(matched) => CheckResult::up(
            format!("HTTP {} 且包含关键字 \"{matched}\"", status.as_u16()),
            Some(ping),
        ),
        None => CheckResult::down(format!("未找到任何关键字: {}", cfg.keyword)).with_ping(Some(ping)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HttpConfig, HttpMethod};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: String, keyword: &str) -> KeywordConfig {
        KeywordConfig {
            http: HttpConfig {
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
            },
            keyword: keyword.to_string(),
        }
    }

    #[tokio::test]
    async fn up_when_any_keyword_present() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_string("all systems green"))
            .mount(&server)
            .await;

        let result = check(&config(format!("{}/status", server.uri()), "red,green")).await;
        assert_eq!(result.status, crate::model::Status::Up);
        assert!(result.message.contains("green"));
    }

    #[tokio::test]
    async fn down_when_no_keyword_matches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_string("all systems blue"))
            .mount(&server)
            .await;

        let result = check(&config(format!("{}/status", server.uri()), "red,green")).await;
        assert_eq!(result.status, crate::model::Status::Down);
    }
}
