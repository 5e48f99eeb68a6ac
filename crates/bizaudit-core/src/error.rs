//! Error taxonomy shared by every BizAudit crate.

use thiserror::Error;

/// All errors surfaced by the automation core.
#[derive(Debug, Error)]
pub enum BizAuditError {
    /// Malformed or missing input. Nothing was persisted beyond what already existed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Text-completion collaborator failure (timeout, quota, bad response).
    #[error("Service error: {0}")]
    Service(String),

    /// Durable store read/write failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A single workflow step failed. Converted to an in-band result by the engine.
    #[error("Step error: {0}")]
    Step(String),

    /// Invalid cron expression at registration time.
    #[error("Scheduling error: {0}")]
    Scheduling(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("API key missing for provider: {0}")]
    ApiKeyMissing(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BizAuditError {
    /// Shorthand used by store implementations.
    pub fn storage(e: impl std::fmt::Display) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BizAuditError>;
