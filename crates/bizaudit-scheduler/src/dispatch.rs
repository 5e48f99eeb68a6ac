//! Outbound dispatch: HTTP webhooks and email transports.
//! Email goes over SMTP (async lettre) when configured, otherwise it is only logged.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use bizaudit_core::config::EmailConfig;
use bizaudit_core::error::{BizAuditError, Result};
use bizaudit_core::traits::EmailSender;
use bizaudit_core::types::OutgoingEmail;

/// Webhook requests give up after this long.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// What came back from a webhook call.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookResponse {
    pub status: u16,
    /// JSON body, or the raw text as a string when it is not JSON.
    pub body: Value,
}

impl WebhookResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Send an HTTP request with a JSON body. Non-2xx statuses are returned, not errors.
pub async fn send_webhook(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    headers: &BTreeMap<String, String>,
    body: &Value,
) -> Result<WebhookResponse> {
    let mut req = match method.to_uppercase().as_str() {
        "GET" => client.get(url),
        "PUT" => client.put(url),
        "PATCH" => client.patch(url),
        "DELETE" => client.delete(url),
        _ => client.post(url),
    };
    if !body.is_null() {
        req = req.json(body);
    }
    for (key, value) in headers {
        req = req.header(key.as_str(), value.as_str());
    }

    let resp = req
        .timeout(WEBHOOK_TIMEOUT)
        .send()
        .await
        .map_err(|e| BizAuditError::Http(format!("Webhook {method} {url} failed: {e}")))?;

    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
    tracing::info!("🌐 Webhook {method} {url} → {status}");
    Ok(WebhookResponse { status, body })
}

/// SMTP transport (STARTTLS relay).
pub struct SmtpSender {
    from: lettre::message::Mailbox,
    mailer: lettre::AsyncSmtpTransport<lettre::Tokio1Executor>,
}

impl SmtpSender {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        use lettre::transport::smtp::authentication::Credentials;

        let from_name = config.display_name.as_deref().unwrap_or("BizAudit");
        let from = format!("{from_name} <{}>", config.from)
            .parse()
            .map_err(|e| BizAuditError::Email(format!("Invalid from: {e}")))?;

        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let mailer =
            lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| BizAuditError::Email(format!("SMTP relay: {e}")))?
                .port(config.smtp_port)
                .credentials(creds)
                .build();

        Ok(Self { from, mailer })
    }
}

#[async_trait]
impl EmailSender for SmtpSender {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        use lettre::{AsyncTransport, Message, message::Mailbox, message::header::ContentType};

        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| BizAuditError::Email(format!("Invalid to '{}': {e}", email.to)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| BizAuditError::Email(format!("Build email: {e}")))?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| BizAuditError::Email(format!("SMTP send: {e}")))?;

        tracing::info!("📤 Email sent to: {}", email.to);
        Ok(())
    }
}

/// Development transport: logs each email and keeps a copy.
#[derive(Default)]
pub struct LogSender {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl LogSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emails "sent" so far.
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl EmailSender for LogSender {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        if email.to.trim().is_empty() {
            return Err(BizAuditError::Email("Recipient is empty".into()));
        }
        tracing::info!("📧 [log] to={} subject={}", email.to, email.subject);
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(email.clone());
        Ok(())
    }
}

/// SMTP when `[email].enabled`, otherwise the log transport.
pub fn email_sender_from_config(config: &EmailConfig) -> Result<Arc<dyn EmailSender>> {
    if config.enabled {
        if config.smtp_host.is_empty() {
            return Err(BizAuditError::Config("email.smtp_host is required when email is enabled".into()));
        }
        Ok(Arc::new(SmtpSender::new(config)?))
    } else {
        tracing::debug!("Email disabled, using log transport");
        Ok(Arc::new(LogSender::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_sender_records() {
        let sender = LogSender::new();
        let email = OutgoingEmail {
            to: "owner@shop.test".into(),
            subject: "Hi".into(),
            body: "Body".into(),
        };
        sender.send(&email).await.unwrap();
        assert_eq!(sender.sent(), vec![email]);

        let blank = OutgoingEmail {
            to: " ".into(),
            subject: "s".into(),
            body: "b".into(),
        };
        assert!(matches!(sender.send(&blank).await, Err(BizAuditError::Email(_))));
    }

    #[test]
    fn test_sender_from_config() {
        let config = EmailConfig::default();
        assert_eq!(email_sender_from_config(&config).unwrap().name(), "log");

        let enabled = EmailConfig {
            enabled: true,
            ..EmailConfig::default()
        };
        assert!(matches!(
            email_sender_from_config(&enabled),
            Err(BizAuditError::Config(_))
        ));
    }

    #[test]
    fn test_webhook_status_classification() {
        let ok = WebhookResponse { status: 204, body: Value::Null };
        let bad = WebhookResponse { status: 502, body: Value::Null };
        assert!(ok.is_success());
        assert!(!bad.is_success());
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_http_error() {
        let client = reqwest::Client::new();
        let err = send_webhook(
            &client,
            "http://127.0.0.1:1/hook",
            "POST",
            &BTreeMap::new(),
            &serde_json::json!({"a": 1}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BizAuditError::Http(_)));
    }
}
