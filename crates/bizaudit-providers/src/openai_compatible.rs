//! Unified OpenAI-compatible completion provider.
//!
//! A single struct that handles chat completions for ALL OpenAI-compatible APIs.
//! Different providers are distinguished only by endpoint URL, auth style, and API key.

use async_trait::async_trait;
use bizaudit_core::config::LlmConfig;
use bizaudit_core::error::{BizAuditError, Result};
use bizaudit_core::traits::completion::{CompletionProvider, GenerateParams};
use serde_json::{Value, json};

use crate::provider_registry::{AuthStyle, ProviderConfig};

/// A unified provider that works with any OpenAI-compatible API.
pub struct OpenAiCompatibleProvider {
    /// Provider name (e.g., "openai", "groq", "deepseek").
    name: String,
    /// API key for authentication.
    api_key: String,
    /// Base URL for the API (e.g., "https://api.openai.com/v1").
    base_url: String,
    /// Authentication style.
    auth_style: AuthStyle,
    /// Used when the caller's params carry no model.
    default_model: String,
    /// HTTP client.
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Create from a known provider config + `[llm]` section.
    ///
    /// Resolution order:
    /// - API key: `llm.api_key` > env vars > empty
    /// - Base URL: `llm.endpoint` > env override > registry default
    pub fn from_registry(registry: &ProviderConfig, config: &LlmConfig) -> Self {
        let api_key = if !config.api_key.is_empty() {
            config.api_key.clone()
        } else {
            registry
                .env_keys
                .iter()
                .find_map(|key| std::env::var(key).ok())
                .unwrap_or_default()
        };

        let base_url = if !config.endpoint.is_empty() {
            config.endpoint.trim_end_matches('/').to_string()
        } else {
            registry
                .base_url_env
                .and_then(|env_key| {
                    let val = std::env::var(env_key).ok()?;
                    // For OLLAMA_HOST / LLAMACPP_HOST, append /v1 if not present
                    if val.ends_with("/v1") {
                        Some(val)
                    } else {
                        Some(format!("{}/v1", val.trim_end_matches('/')))
                    }
                })
                .unwrap_or_else(|| registry.base_url.to_string())
        };

        Self {
            name: registry.name.to_string(),
            api_key,
            base_url,
            auth_style: registry.auth_style,
            default_model: registry.default_model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create for a custom endpoint (e.g., "custom:https://my-server.com/v1").
    pub fn custom(endpoint: &str, config: &LlmConfig) -> Self {
        let base_url = endpoint
            .strip_prefix("custom:")
            .unwrap_or(endpoint)
            .trim_end_matches('/')
            .to_string();

        let api_key = if !config.api_key.is_empty() {
            config.api_key.clone()
        } else {
            std::env::var("CUSTOM_API_KEY").unwrap_or_default()
        };

        let auth_style = if api_key.is_empty() {
            AuthStyle::None
        } else {
            AuthStyle::Bearer
        };

        Self {
            name: "custom".to_string(),
            api_key,
            base_url,
            auth_style,
            default_model: config.model.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Completion endpoint URL.
    pub fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Build the auth header for the request.
    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_style {
            AuthStyle::Bearer if !self.api_key.is_empty() => {
                req.header("Authorization", format!("Bearer {}", self.api_key))
            }
            _ => req,
        }
    }

    /// Standard OpenAI chat-completions request body.
    pub fn request_body(&self, system_prompt: &str, user_prompt: &str, params: &GenerateParams) -> Value {
        let model = if params.model.is_empty() {
            self.default_model.as_str()
        } else {
            params.model.as_str()
        };

        let mut messages = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": system_prompt}));
        }
        messages.push(json!({"role": "user", "content": user_prompt}));

        json!({
            "model": model,
            "messages": messages,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        })
    }
}

/// Take the first choice's text out of a chat-completions response.
pub fn parse_completion(provider: &str, json: &Value) -> Result<String> {
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| BizAuditError::Service(format!("{provider}: no choices in response")))?;
    choice["message"]["content"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| BizAuditError::Service(format!("{provider}: empty completion")))
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: &GenerateParams,
    ) -> Result<String> {
        // For providers that require auth, check API key
        if self.auth_style != AuthStyle::None && self.api_key.is_empty() {
            return Err(BizAuditError::ApiKeyMissing(self.name.clone()));
        }

        let body = self.request_body(system_prompt, user_prompt, params);
        let url = self.url();
        let req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        let req = self.apply_auth(req);

        let resp = req.send().await.map_err(|e| {
            BizAuditError::Http(format!("{} connection failed ({}): {}", self.name, url, e))
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(BizAuditError::Service(format!(
                "{} API error {}: {}",
                self.name, status, text
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| BizAuditError::Service(format!("{} malformed response: {}", self.name, e)))?;

        let text = parse_completion(&self.name, &json)?;
        tracing::debug!("🧠 {} returned {} chars", self.name, text.len());
        Ok(text)
    }

    async fn health_check(&self) -> Result<bool> {
        if self.auth_style != AuthStyle::None {
            // For cloud providers, just check if API key is set
            return Ok(!self.api_key.is_empty());
        }

        // For local servers (ollama, llamacpp), try to connect
        let resp = self.client.get(&self.base_url).send().await;
        Ok(resp.is_ok())
    }
}
