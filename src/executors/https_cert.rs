//! `https-cert` executor (§4.2.2).

use std::time::Duration;

use crate::model::{CheckResult, HttpsCertConfig};
use crate::tls_cert;

pub async fn check(cfg: &HttpsCertConfig) -> CheckResult {
    if !cfg.url.starts_with("https://") {
        return CheckResult::down("配置无效: url 必须以 https:// 开头");
    }

    let Ok(parsed) = url::Url::parse(&cfg.url) else {
        return CheckResult::down("配置无效: 无法解析 url");
    };
    let Some(host) = parsed.host_str() else {
        return CheckResult::down("配置无效: url 缺少主机名");
    };
    let port = parsed.port_or_known_default().unwrap_or(443);

    match tls_cert::fetch_leaf_cert(
        host,
        port,
        cfg.ignore_tls,
        Duration::from_secs(cfg.connect_timeout),
    )
    .await
    {
        Ok(cert) => {
            let now = chrono::Utc::now();
            if now < cert.not_before || now > cert.not_after {
                CheckResult::down("证书无效: 不在有效期内")
            } else {
                let days = tls_cert::days_until(cert.not_after);
                CheckResult::up(format!("证书有效，{days} 天后过期"), None)
            }
        }
        Err(e) => CheckResult::down(e.to_string()),
    }
}
