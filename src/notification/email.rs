//! SMTP email dispatcher (§4.6).
//!
//! Implicit TLS when `smtpPort == 465`, opportunistic STARTTLS otherwise —
//! the same split `lettre`'s `relay`/`starttls_relay` builders already
//! encode.

use std::time::Duration;

use anyhow::Context;
use lettre::message::header::ContentType;
use lettre::message::Message;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use crate::model::EmailChannelConfig;

use super::{DispatchResult, NotificationData};

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn render_html(data: &NotificationData) -> String {
    format!(
        "<h2>{}</h2><p>状态: {}</p><p>{}</p><p>时间: {}</p>",
        html_escape(&data.monitor_name),
        html_escape(&data.status_text),
        html_escape(&data.message).replace('\n', "<br>"),
        data.time.to_rfc3339()
    )
}

pub async fn send(cfg: &EmailChannelConfig, data: &NotificationData) -> DispatchResult {
    let subject = format!("Monitor - {} 状态{}", data.monitor_name, data.status_text);

    let email = Message::builder()
        .to(cfg.email.parse().context("invalid recipient address")?)
        .from(
            "monitor@localhost"
                .parse()
                .expect("static sender address is valid"),
        )
        .subject(subject)
        .header(ContentType::TEXT_HTML)
        .body(render_html(data))
        .context("failed to build email message")?;

    let mut builder = if cfg.smtp_port == 465 {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_server)
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_server)
    }
    .context("failed to configure smtp relay")?
    .port(cfg.smtp_port)
    .timeout(Some(Duration::from_secs(10)));

    if let (Some(username), Some(password)) = (&cfg.username, &cfg.password) {
        builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
    }

    builder
        .build()
        .send(email)
        .await
        .context("failed to send email")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_follows_the_fixed_template() {
        assert_eq!(
            format!("Monitor - {} 状态{}", "api", "异常"),
            "Monitor - api 状态异常"
        );
    }

    #[test]
    fn html_body_escapes_and_linebreaks_message() {
        let data = NotificationData {
            monitor_name: "api".into(),
            monitor_type: "http".into(),
            status: crate::model::Status::Down,
            status_text: "异常".into(),
            status_code: 0,
            time: chrono::Utc::now(),
            message: "line1\n<script>".into(),
            address: None,
            failure_info: None,
        };
        let html = render_html(&data);
        assert!(html.contains("line1<br>&lt;script&gt;"));
    }
}
