//! `port` executor (§4.2.4).

use std::time::Instant;

use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use crate::model::{CheckResult, PortConfig};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn check(cfg: &PortConfig) -> CheckResult {
    if cfg.port == 0 || cfg.port > 65535 {
        return CheckResult::down(format!(
            "配置无效: 端口号 {} 不是有效的端口值",
            cfg.port
        ));
    }

    let start = Instant::now();
    let addr = format!("{}:{}", cfg.hostname, cfg.port);

    match timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
        Ok(Ok(_stream)) => {
            let ping = start.elapsed().as_millis() as i64;
            CheckResult::up(format!("端口 {} 可连接", cfg.port), Some(ping))
        }
        Ok(Err(e)) => {
            let ping = start.elapsed().as_millis() as i64;
            let message = match e.kind() {
                std::io::ErrorKind::ConnectionRefused => "CONNECTION_REFUSED".to_string(),
                std::io::ErrorKind::NotFound => "HOST_NOT_FOUND".to_string(),
                _ => format!("NETWORK_ERROR: {e}"),
            };
            CheckResult::down(message).with_ping(Some(ping))
        }
        Err(_) => {
            let ping = start.elapsed().as_millis() as i64;
            CheckResult::down("TIMEOUT").with_ping(Some(ping))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_port_zero() {
        let result = check(&PortConfig {
            hostname: "example.com".into(),
            port: 0,
        })
        .await;
        assert_eq!(result.status, crate::model::Status::Down);
        assert_eq!(result.message, "配置无效: 端口号 0 不是有效的端口值");
    }

    #[tokio::test]
    async fn rejects_port_above_65535() {
        let result = check(&PortConfig {
            hostname: "example.com".into(),
            port: 70000,
        })
        .await;
        assert_eq!(result.status, crate::model::Status::Down);
        assert!(result.message.contains("70000"));
    }

    #[tokio::test]
    async fn connects_to_an_open_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let result = check(&PortConfig {
            hostname: "127.0.0.1".into(),
            port: port as u32,
        })
        .await;
        assert_eq!(result.status, crate::model::Status::Up);
    }
}
