use async_trait::async_trait;

use crate::error::Result;
use crate::types::OutgoingEmail;

/// Outbound email transport (SMTP in production, log-only in development).
#[async_trait]
pub trait EmailSender: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
}
