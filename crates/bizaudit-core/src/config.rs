//! BizAudit configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BizAuditError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BizAuditConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

impl BizAuditConfig {
    /// Load config from the default path (~/.bizaudit/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BizAuditError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse a TOML document.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| BizAuditError::Config(format!("Failed to parse config: {e}")))
    }

    /// Save config to a path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| BizAuditError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the BizAudit home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".bizaudit")
    }
}

fn bool_true() -> bool { true }

/// Text-completion provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Empty = resolve from the provider's env vars.
    #[serde(default)]
    pub api_key: String,
    /// Empty = registry default.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Providers tried in order when the primary fails.
    #[serde(default)]
    pub fallback_providers: Vec<String>,
}

fn default_provider() -> String { "openai".into() }
fn default_model() -> String { "gpt-4o-mini".into() }
fn default_max_tokens() -> u32 { 1000 }
fn default_temperature() -> f32 { 0.7 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: String::new(),
            endpoint: String::new(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            fallback_providers: Vec::new(),
        }
    }
}

/// Durable store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "sqlite", "json" or "memory".
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    /// SQLite file (sqlite) or directory (json).
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_storage_backend() -> String { "sqlite".into() }
fn default_storage_path() -> String { "~/.bizaudit/bizaudit.db".into() }

impl StorageConfig {
    /// Storage path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: default_storage_path(),
        }
    }
}

/// Scheduler and default job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// How often the tick loop checks for due jobs.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_pending_sweep_cron")]
    pub pending_sweep_cron: String,
    /// Pending tasks older than this are resumed by the sweep.
    #[serde(default = "default_stale_after_mins")]
    pub stale_after_mins: i64,
    #[serde(default = "default_daily_summary_cron")]
    pub daily_summary_cron: String,
    #[serde(default = "default_log_cleanup_cron")]
    pub log_cleanup_cron: String,
    #[serde(default = "default_retention_days")]
    pub log_retention_days: i64,
    #[serde(default = "default_email_queue_cron")]
    pub email_queue_cron: String,
    /// Re-binds scheduled workflows created, edited or paused while serving.
    #[serde(default = "default_workflow_sync_cron")]
    pub workflow_sync_cron: String,
}

fn default_check_interval() -> u64 { 15 }
fn default_pending_sweep_cron() -> String { "*/5 * * * *".into() }
fn default_stale_after_mins() -> i64 { 5 }
fn default_daily_summary_cron() -> String { "0 18 * * *".into() }
fn default_log_cleanup_cron() -> String { "0 0 * * 0".into() }
fn default_retention_days() -> i64 { 30 }
fn default_email_queue_cron() -> String { "*/10 * * * *".into() }
fn default_workflow_sync_cron() -> String { "* * * * *".into() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: default_check_interval(),
            pending_sweep_cron: default_pending_sweep_cron(),
            stale_after_mins: default_stale_after_mins(),
            daily_summary_cron: default_daily_summary_cron(),
            log_cleanup_cron: default_log_cleanup_cron(),
            log_retention_days: default_retention_days(),
            email_queue_cron: default_email_queue_cron(),
            workflow_sync_cron: default_workflow_sync_cron(),
        }
    }
}

/// Outbound email configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// When false, emails are only logged.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_from")]
    pub from: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

fn default_smtp_port() -> u16 { 587 }
fn default_from() -> String { "hello@bizaudit.local".into() }

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: default_from(),
            display_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = BizAuditConfig::parse("").unwrap();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.storage.backend, "sqlite");
        assert_eq!(config.scheduler.daily_summary_cron, "0 18 * * *");
        assert_eq!(config.scheduler.pending_sweep_cron, "*/5 * * * *");
        assert!(!config.email.enabled);
    }

    #[test]
    fn test_partial_sections() {
        let config = BizAuditConfig::parse(
            r#"
            [llm]
            provider = "groq"
            max_tokens = 500

            [scheduler]
            log_retention_days = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.provider, "groq");
        assert_eq!(config.llm.max_tokens, 500);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.scheduler.log_retention_days, 7);
        assert_eq!(config.scheduler.check_interval_secs, 15);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join(format!("bizaudit-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let mut config = BizAuditConfig::default();
        config.storage.backend = "json".into();
        config.save_to(&path).unwrap();

        let loaded = BizAuditConfig::load_from(&path).unwrap();
        assert_eq!(loaded.storage.backend, "json");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = BizAuditConfig::parse("[llm\nprovider=").unwrap_err();
        assert!(matches!(err, BizAuditError::Config(_)));
    }
}
