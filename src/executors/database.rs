//! `mysql` and `redis` executors (§4.2.5).
//!
//! Both open a connection with a 10s connect timeout, run `query` if set
//! (else a default liveness check), and close on every path via RAII
//! (dropping the connection/client releases it whether the check
//! succeeded or failed).

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::model::{CheckResult, DatabaseConfig};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn check_mysql(cfg: &DatabaseConfig) -> CheckResult {
    if cfg.port == 0 {
        return CheckResult::down("配置无效: 端口号不是有效的端口值");
    }

    let start = Instant::now();
    let options = sqlx::mysql::MySqlConnectOptions::new()
        .host(&cfg.hostname)
        .port(cfg.port)
        .username(cfg.username.as_deref().unwrap_or("root"))
        .password(cfg.password.as_deref().unwrap_or(""));
    let options = match &cfg.database {
        Some(db) => options.database(db),
        None => options,
    };

    let connect = async {
        use sqlx::Connection;
        let mut conn = sqlx::mysql::MySqlConnection::connect_with(&options).await?;
        let query = cfg
            .query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or("SELECT 1");
        sqlx::query(query).execute(&mut conn).await?;
        conn.close().await?;
        Ok::<_, sqlx::Error>(())
    };

    match timeout(CONNECT_TIMEOUT, connect).await {
        Ok(Ok(())) => {
            let ping = start.elapsed().as_millis() as i64;
            CheckResult::up("MySQL 连接正常", Some(ping))
        }
        Ok(Err(e)) => CheckResult::down(format!("NETWORK_ERROR: {e}")),
        Err(_) => CheckResult::down("TIMEOUT"),
    }
}

pub async fn check_redis(cfg: &DatabaseConfig) -> CheckResult {
    if cfg.port == 0 {
        return CheckResult::down("配置无效: 端口号不是有效的端口值");
    }

    let start = Instant::now();
    let mut url = String::from("redis://");
    if let Some(user) = &cfg.username {
        url.push_str(user);
        if let Some(pass) = &cfg.password {
            url.push(':');
            url.push_str(pass);
        }
        url.push('@');
    } else if let Some(pass) = &cfg.password {
        url.push(':');
        url.push_str(pass);
        url.push('@');
    }
    url.push_str(&format!("{}:{}", cfg.hostname, cfg.port));
    if let Some(db) = &cfg.database {
        url.push('/');
        url.push_str(db);
    }

    let run = async {
        let client = redis::Client::open(url.as_str())
            .map_err(|e| format!("NETWORK_ERROR: {e}"))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| format!("CONNECTION_REFUSED: {e}"))?;

        let query = cfg
            .query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or("PING");
        let mut parts = query.split_whitespace();
        let mut command = redis::cmd(parts.next().unwrap_or("PING"));
        for arg in parts {
            command.arg(arg);
        }
        command
            .query_async::<redis::Value>(&mut conn)
            .await
            .map_err(|e| format!("NETWORK_ERROR: {e}"))?;
        Ok::<_, String>(())
    };

    match timeout(CONNECT_TIMEOUT, run).await {
        Ok(Ok(())) => {
            let ping = start.elapsed().as_millis() as i64;
            CheckResult::up("Redis 连接正常", Some(ping))
        }
        Ok(Err(message)) => CheckResult::down(message),
        Err(_) => CheckResult::down("TIMEOUT"),
    }
}
