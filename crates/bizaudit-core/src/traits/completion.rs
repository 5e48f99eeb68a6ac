//! Text-completion collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Generation parameters passed through to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            max_tokens: 1000,
            temperature: 0.7,
        }
    }
}

/// Opaque text-completion service. Returns the first completion text.
///
/// Failures are reported as `BizAuditError::Service` (or `Http`/`ApiKeyMissing`
/// from concrete providers); callers treat any `Err` as a service failure.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name, used in logs.
    fn name(&self) -> &str;

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: &GenerateParams,
    ) -> Result<String>;

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
