//! Provider Failover: automatic fallback when primary provider fails.
//!
//! Lightweight failover chain: try primary → fallback₁ → fallback₂.
//! No heavyweight circuit breaker, no thread pools.

use async_trait::async_trait;
use bizaudit_core::error::{BizAuditError, Result};
use bizaudit_core::traits::completion::{CompletionProvider, GenerateParams};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Per-provider health tracking.
struct ProviderSlot {
    provider: Box<dyn CompletionProvider>,
    /// Consecutive failure count.
    failures: AtomicU32,
    /// Timestamp of last failure (unix secs, 0 = never failed).
    last_failure: AtomicU64,
    /// Max failures before skip (default: 3).
    max_failures: u32,
    /// Cool-down period in seconds before retrying a failed provider.
    cooldown_secs: u64,
    /// Ignore the caller's model and use the provider's own default.
    own_model: bool,
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl ProviderSlot {
    fn new(provider: Box<dyn CompletionProvider>, own_model: bool) -> Self {
        Self {
            provider,
            failures: AtomicU32::new(0),
            last_failure: AtomicU64::new(0),
            max_failures: 3,
            cooldown_secs: 60,
            own_model,
        }
    }

    /// Healthy when below the failure threshold or the cooldown has expired.
    fn is_healthy(&self) -> bool {
        let fails = self.failures.load(Ordering::Relaxed);
        if fails < self.max_failures {
            return true;
        }
        let last = self.last_failure.load(Ordering::Relaxed);
        unix_now().saturating_sub(last) > self.cooldown_secs
    }

    fn record_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.last_failure.store(unix_now(), Ordering::Relaxed);
    }
}

/// Failover provider: tries providers in order, skipping unhealthy ones.
pub struct FailoverProvider {
    slots: Vec<ProviderSlot>,
}

impl FailoverProvider {
    /// Create a failover chain. First provider is primary, rest are fallbacks.
    /// The configured model only applies to the primary; fallbacks run their default model.
    pub fn new(providers: Vec<Box<dyn CompletionProvider>>) -> Result<Self> {
        if providers.is_empty() {
            return Err(BizAuditError::Config(
                "Failover chain needs at least one provider".into(),
            ));
        }
        Ok(Self {
            slots: providers
                .into_iter()
                .enumerate()
                .map(|(idx, p)| ProviderSlot::new(p, idx > 0))
                .collect(),
        })
    }

    /// Number of providers in the chain.
    pub fn chain_len(&self) -> usize {
        self.slots.len()
    }

    /// Get health status of all providers: (name, healthy, consecutive failures).
    pub fn health_status(&self) -> Vec<(&str, bool, u32)> {
        self.slots
            .iter()
            .map(|s| {
                (
                    s.provider.name(),
                    s.is_healthy(),
                    s.failures.load(Ordering::Relaxed),
                )
            })
            .collect()
    }
}

#[async_trait]
impl CompletionProvider for FailoverProvider {
    fn name(&self) -> &str {
        self.slots
            .first()
            .map(|s| s.provider.name())
            .unwrap_or("failover")
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: &GenerateParams,
    ) -> Result<String> {
        let mut last_error = None;
        let fallback_params = GenerateParams {
            model: String::new(),
            ..params.clone()
        };

        for (idx, slot) in self.slots.iter().enumerate() {
            if !slot.is_healthy() {
                tracing::debug!(
                    "⏭️ Skipping unhealthy provider: {} ({} failures)",
                    slot.provider.name(),
                    slot.failures.load(Ordering::Relaxed)
                );
                continue;
            }

            let slot_params = if slot.own_model { &fallback_params } else { params };
            match slot.provider.complete(system_prompt, user_prompt, slot_params).await {
                Ok(text) => {
                    if idx > 0 {
                        tracing::info!(
                            "🔄 Failover: {} → {} (success)",
                            self.slots[0].provider.name(),
                            slot.provider.name()
                        );
                    }
                    slot.record_success();
                    return Ok(text);
                }
                Err(e) => {
                    slot.record_failure();
                    tracing::warn!(
                        "⚠️ Provider {} failed (attempt {}): {}",
                        slot.provider.name(),
                        slot.failures.load(Ordering::Relaxed),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| BizAuditError::Service("All providers unhealthy".into())))
    }

    async fn health_check(&self) -> Result<bool> {
        // Healthy if at least one provider is healthy
        for slot in &self.slots {
            if slot.is_healthy() {
                if let Ok(true) = slot.provider.health_check().await {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    struct Scripted {
        name: &'static str,
        fail: bool,
        calls: Arc<AtomicUsize>,
        models: Arc<std::sync::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl CompletionProvider for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn complete(&self, _s: &str, _u: &str, p: &GenerateParams) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.models.lock().unwrap().push(p.model.clone());
            if self.fail {
                Err(BizAuditError::Service(format!("{} down", self.name)))
            } else {
                Ok(format!("from {}", self.name))
            }
        }
    }

    fn scripted(name: &'static str, fail: bool) -> (Box<dyn CompletionProvider>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Scripted {
                name,
                fail,
                calls: calls.clone(),
                models: Default::default(),
            }),
            calls,
        )
    }

    #[test]
    fn test_empty_chain_rejected() {
        assert!(FailoverProvider::new(vec![]).is_err());
    }

    #[tokio::test]
    async fn test_falls_back_on_error() {
        let (primary, _) = scripted("primary", true);
        let (backup, _) = scripted("backup", false);
        let chain = FailoverProvider::new(vec![primary, backup]).unwrap();
        let text = chain
            .complete("", "hi", &GenerateParams::default())
            .await
            .unwrap();
        assert_eq!(text, "from backup");
        assert_eq!(chain.health_status()[0].2, 1);
    }

    #[tokio::test]
    async fn test_unhealthy_primary_is_skipped() {
        let (primary, primary_calls) = scripted("primary", true);
        let (backup, _) = scripted("backup", false);
        let chain = FailoverProvider::new(vec![primary, backup]).unwrap();
        for _ in 0..5 {
            chain
                .complete("", "hi", &GenerateParams::default())
                .await
                .unwrap();
        }
        // Three failures trip the threshold; later calls skip it during cooldown.
        assert_eq!(primary_calls.load(Ordering::SeqCst), 3);
        assert!(!chain.health_status()[0].1);
    }

    #[tokio::test]
    async fn test_all_failing_returns_last_error() {
        let (a, _) = scripted("a", true);
        let (b, _) = scripted("b", true);
        let chain = FailoverProvider::new(vec![a, b]).unwrap();
        let err = chain
            .complete("", "hi", &GenerateParams::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("b down"));
    }

    #[tokio::test]
    async fn test_fallback_runs_its_own_model() {
        let primary_models = Arc::new(std::sync::Mutex::new(Vec::new()));
        let backup_models = Arc::new(std::sync::Mutex::new(Vec::new()));
        let primary = Box::new(Scripted {
            name: "primary",
            fail: true,
            calls: Default::default(),
            models: primary_models.clone(),
        });
        let backup = Box::new(Scripted {
            name: "backup",
            fail: false,
            calls: Default::default(),
            models: backup_models.clone(),
        });
        let chain = FailoverProvider::new(vec![primary, backup]).unwrap();
        let params = GenerateParams {
            model: "gpt-4o".into(),
            ..GenerateParams::default()
        };

        let text = chain.complete("", "hi", &params).await.unwrap();
        assert_eq!(text, "from backup");
        assert_eq!(*primary_models.lock().unwrap(), vec!["gpt-4o".to_string()]);
        // empty model = the backup's registry default
        assert_eq!(*backup_models.lock().unwrap(), vec![String::new()]);
    }
}
