//! # BizAudit Providers
//!
//! Text-completion providers for BizAudit.
//!
//! All OpenAI-compatible APIs (OpenAI, OpenRouter, DeepSeek, Gemini, Groq,
//! Ollama, llama.cpp) are handled by a single `OpenAiCompatibleProvider`.
//! `FailoverProvider` chains several of them.

pub mod failover;
pub mod openai_compatible;
pub mod provider_registry;

use bizaudit_core::config::LlmConfig;
use bizaudit_core::error::{BizAuditError, Result};
use bizaudit_core::traits::CompletionProvider;

/// Create a single provider by name.
///
/// `custom:https://host/v1` targets an arbitrary OpenAI-compatible endpoint.
pub fn create_named_provider(name: &str, config: &LlmConfig) -> Result<Box<dyn CompletionProvider>> {
    if name.starts_with("custom:") {
        return Ok(Box::new(openai_compatible::OpenAiCompatibleProvider::custom(
            name, config,
        )));
    }
    let registry = provider_registry::get_provider_config(name)
        .ok_or_else(|| BizAuditError::ProviderNotFound(name.into()))?;
    Ok(Box::new(
        openai_compatible::OpenAiCompatibleProvider::from_registry(registry, config),
    ))
}

/// Create the provider described by `[llm]`.
///
/// With `fallback_providers` set, the primary is wrapped in a failover chain.
pub fn create_provider(config: &LlmConfig) -> Result<Box<dyn CompletionProvider>> {
    let primary = create_named_provider(&config.provider, config)?;
    if config.fallback_providers.is_empty() {
        return Ok(primary);
    }

    let mut chain = vec![primary];
    for name in &config.fallback_providers {
        // Fallbacks use their own env keys/endpoints, never the primary's overrides.
        // Their model is chosen per slot by the failover chain.
        let fallback_config = LlmConfig {
            api_key: String::new(),
            endpoint: String::new(),
            ..config.clone()
        };
        chain.push(create_named_provider(name, &fallback_config)?);
    }
    Ok(Box::new(failover::FailoverProvider::new(chain)?))
}

/// List all available provider names.
pub fn available_providers() -> Vec<&'static str> {
    let mut names = provider_registry::all_provider_names();
    names.push("custom");
    names
}
