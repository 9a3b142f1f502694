//! `icmp` executor (§4.2.6).

use std::net::ToSocketAddrs;
use std::time::Duration;

use surge_ping::{Client, Config as PingConfig, PingIdentifier, PingSequence};

use crate::model::{CheckResult, IcmpConfig};

const PING_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn check(cfg: &IcmpConfig) -> CheckResult {
    let Some(addr) = resolve(&cfg.hostname) else {
        return CheckResult::down("HOST_NOT_FOUND");
    };

    let client = match Client::new(&PingConfig::default()) {
        Ok(c) => c,
        Err(e) => return CheckResult::down(format!("NETWORK_ERROR: {e}")),
    };

    let mut pinger = client
        .pinger(addr, PingIdentifier(rand::random::<u16>()))
        .await;
    pinger.timeout(PING_TIMEOUT);

    let mut sent = 0u32;
    let mut received = 0u32;
    let mut total_rtt = Duration::ZERO;

    for seq in 0..cfg.packet_count {
        sent += 1;
        let payload = [0u8; 8];
        match pinger.ping(PingSequence(seq as u16), &payload).await {
            Ok((_, rtt)) => {
                received += 1;
                total_rtt += rtt;
            }
            Err(_) => continue,
        }
    }

    if sent == 0 {
        return CheckResult::down("配置无效: packetCount 必须大于 0");
    }

    let loss_percent = 100.0 * (sent - received) as f64 / sent as f64;
    if received == 0 {
        return CheckResult::down("NETWORK_ERROR: 主机无响应");
    }

    if loss_percent > cfg.max_packet_loss {
        return CheckResult::down(format!(
            "丢包率 {loss_percent:.1}% 超过上限 {}%",
            cfg.max_packet_loss
        ));
    }

    let mean_rtt_ms = (total_rtt.as_millis() as f64 / received as f64) as i64;
    if let Some(max) = cfg.max_response_time {
        if mean_rtt_ms as u64 > max {
            return CheckResult::down(format!("平均响应时间 {mean_rtt_ms}ms 超过上限 {max}ms"))
                .with_ping(Some(mean_rtt_ms));
        }
    }

    CheckResult::up(
        format!("平均延迟 {mean_rtt_ms}ms，丢包率 {loss_percent:.1}%"),
        Some(mean_rtt_ms),
    )
}

fn resolve(hostname: &str) -> Option<std::net::IpAddr> {
    if let Ok(ip) = hostname.parse() {
        return Some(ip);
    }
    format!("{hostname}:0")
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(|addr| addr.ip())
}
