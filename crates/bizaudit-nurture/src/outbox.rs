//! Email outbox (`scheduled_emails`) and sent-email log (`email_log`).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use bizaudit_core::error::{BizAuditError, Result};
use bizaudit_core::traits::store::{self, CollectionStore, Prunable};
use bizaudit_core::types::collections;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    Pending,
    Sent,
    Failed,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

/// A personalised sequence email waiting for its send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEmail {
    pub id: String,
    pub lead_id: String,
    pub sequence_id: String,
    pub template_id: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub send_at: DateTime<Utc>,
    pub status: EmailStatus,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One dispatch attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailLogEntry {
    pub email_id: String,
    pub lead_id: String,
    pub sequence_id: String,
    pub to: String,
    pub subject: String,
    pub status: EmailStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

pub struct Outbox {
    store: Arc<dyn CollectionStore>,
    lock: Mutex<()>,
    log_lock: Mutex<()>,
}

impl Outbox {
    pub fn new(store: Arc<dyn CollectionStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
            log_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Vec<ScheduledEmail>> {
        store::load(self.store.as_ref(), collections::SCHEDULED_EMAILS)
    }

    pub async fn enqueue(&self, emails: &[ScheduledEmail]) -> Result<()> {
        if emails.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        let mut all = self.load()?;
        all.extend_from_slice(emails);
        store::save(self.store.as_ref(), collections::SCHEDULED_EMAILS, &all)?;
        tracing::debug!("📬 Queued {} email(s)", emails.len());
        Ok(())
    }

    pub async fn list(&self, status: Option<EmailStatus>) -> Result<Vec<ScheduledEmail>> {
        let all = self.load()?;
        Ok(match status {
            Some(s) => all.into_iter().filter(|e| e.status == s).collect(),
            None => all,
        })
    }

    /// Pending emails with `sendAt <= now`, earliest first.
    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledEmail>> {
        let mut due: Vec<ScheduledEmail> = self
            .load()?
            .into_iter()
            .filter(|e| e.status == EmailStatus::Pending && e.send_at <= now)
            .collect();
        due.sort_by_key(|e| e.send_at);
        Ok(due)
    }

    /// Record the outcome of one attempt: `Ok` = sent, `Err(reason)` = failed.
    pub async fn finish(
        &self,
        email_id: &str,
        outcome: std::result::Result<(), String>,
        at: DateTime<Utc>,
    ) -> Result<ScheduledEmail> {
        let updated = {
            let _guard = self.lock.lock().await;
            let mut all = self.load()?;
            let email = all
                .iter_mut()
                .find(|e| e.id == email_id)
                .ok_or_else(|| BizAuditError::NotFound(format!("scheduled email '{email_id}'")))?;
            match &outcome {
                Ok(()) => {
                    email.status = EmailStatus::Sent;
                    email.sent_at = Some(at);
                    email.error = None;
                }
                Err(reason) => {
                    email.status = EmailStatus::Failed;
                    email.error = Some(reason.clone());
                }
            }
            let updated = email.clone();
            store::save(self.store.as_ref(), collections::SCHEDULED_EMAILS, &all)?;
            updated
        };

        self.append_log(EmailLogEntry {
            email_id: updated.id.clone(),
            lead_id: updated.lead_id.clone(),
            sequence_id: updated.sequence_id.clone(),
            to: updated.to.clone(),
            subject: updated.subject.clone(),
            status: updated.status,
            error: updated.error.clone(),
            attempted_at: at,
        })
        .await?;
        Ok(updated)
    }

    async fn append_log(&self, entry: EmailLogEntry) -> Result<()> {
        let _guard = self.log_lock.lock().await;
        let mut log: Vec<EmailLogEntry> = store::load(self.store.as_ref(), collections::EMAIL_LOG)?;
        log.push(entry);
        store::save(self.store.as_ref(), collections::EMAIL_LOG, &log)
    }

    pub async fn log(&self) -> Result<Vec<EmailLogEntry>> {
        store::load(self.store.as_ref(), collections::EMAIL_LOG)
    }
}

impl ScheduledEmail {
    /// When the email left the outbox: sent time, or its slot for failures.
    fn settled_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            EmailStatus::Pending => None,
            EmailStatus::Sent => Some(self.sent_at.unwrap_or(self.send_at)),
            EmailStatus::Failed => Some(self.send_at),
        }
    }
}

/// The weekly cleanup drops settled outbox entries and old attempt log lines.
/// Pending emails are kept however old they are.
#[async_trait]
impl Prunable for Outbox {
    fn label(&self) -> &str {
        "outbox"
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let settled = {
            let _guard = self.lock.lock().await;
            let mut all = self.load()?;
            let len = all.len();
            all.retain(|e| e.settled_at().is_none_or(|at| at >= cutoff));
            let removed = len - all.len();
            if removed > 0 {
                store::save(self.store.as_ref(), collections::SCHEDULED_EMAILS, &all)?;
            }
            removed
        };

        let _guard = self.log_lock.lock().await;
        let mut log: Vec<EmailLogEntry> = store::load(self.store.as_ref(), collections::EMAIL_LOG)?;
        let len = log.len();
        log.retain(|e| e.attempted_at >= cutoff);
        let logged = len - log.len();
        if logged > 0 {
            store::save(self.store.as_ref(), collections::EMAIL_LOG, &log)?;
        }
        tracing::debug!("🧹 Outbox prune: {settled} email(s), {logged} log line(s)");
        Ok(settled + logged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizaudit_db::MemoryStore;
    use chrono::Duration;

    fn email(id: &str, send_at: DateTime<Utc>) -> ScheduledEmail {
        ScheduledEmail {
            id: id.into(),
            lead_id: "lead-1".into(),
            sequence_id: "audit_welcome".into(),
            template_id: "t".into(),
            to: "a@b.test".into(),
            subject: "s".into(),
            body: "b".into(),
            send_at,
            status: EmailStatus::Pending,
            sent_at: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_due_finish_and_log() {
        let outbox = Outbox::new(Arc::new(MemoryStore::new()));
        let now = Utc::now();
        outbox
            .enqueue(&[email("later", now + Duration::hours(2)), email("now", now)])
            .await
            .unwrap();

        let due = outbox.due(now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "now");

        let sent = outbox.finish("now", Ok(()), now).await.unwrap();
        assert_eq!(sent.status, EmailStatus::Sent);
        assert!(outbox.due(now).await.unwrap().is_empty());

        let failed = outbox
            .finish("later", Err("bounced".into()), now)
            .await
            .unwrap();
        assert_eq!(failed.error.as_deref(), Some("bounced"));

        let log = outbox.log().await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].status, EmailStatus::Failed);
    }

    #[tokio::test]
    async fn test_prune_settled_emails_and_log() {
        let outbox = Outbox::new(Arc::new(MemoryStore::new()));
        let now = Utc::now();
        let old = now - Duration::days(45);
        outbox
            .enqueue(&[
                email("sent-old", old),
                email("failed-old", old),
                email("pending-old", old),
                email("sent-recent", now),
            ])
            .await
            .unwrap();
        outbox.finish("sent-old", Ok(()), old).await.unwrap();
        outbox
            .finish("failed-old", Err("bounced".into()), old)
            .await
            .unwrap();
        outbox.finish("sent-recent", Ok(()), now).await.unwrap();

        // two settled emails plus their two log lines
        assert_eq!(outbox.prune_before(now - Duration::days(30)).await.unwrap(), 4);

        let mut left: Vec<String> = outbox
            .list(None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        left.sort();
        assert_eq!(left, vec!["pending-old", "sent-recent"]);
        let log = outbox.log().await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].email_id, "sent-recent");

        assert_eq!(outbox.prune_before(now - Duration::days(30)).await.unwrap(), 0);
    }
}
