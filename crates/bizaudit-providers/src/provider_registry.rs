//! Known completion endpoints, keyed by provider name.
//!
//! Every entry speaks the OpenAI chat-completions protocol at
//! `<base_url>/chat/completions`.

/// How credentials are attached to requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// Local servers.
    None,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: &'static str,
    pub base_url: &'static str,
    /// API key env vars, tried in order.
    pub env_keys: &'static [&'static str],
    pub auth_style: AuthStyle,
    /// Env var overriding the base URL (OLLAMA_HOST, ...).
    pub base_url_env: Option<&'static str>,
    /// Used when `[llm].model` is empty.
    pub default_model: &'static str,
}

impl ProviderConfig {
    const fn hosted(
        name: &'static str,
        base_url: &'static str,
        env_keys: &'static [&'static str],
        default_model: &'static str,
    ) -> Self {
        Self {
            name,
            base_url,
            env_keys,
            auth_style: AuthStyle::Bearer,
            base_url_env: None,
            default_model,
        }
    }

    const fn local(
        name: &'static str,
        base_url: &'static str,
        host_env: &'static str,
        default_model: &'static str,
    ) -> Self {
        Self {
            name,
            base_url,
            env_keys: &[],
            auth_style: AuthStyle::None,
            base_url_env: Some(host_env),
            default_model,
        }
    }

    const fn with_base_url_env(mut self, env: &'static str) -> Self {
        self.base_url_env = Some(env);
        self
    }
}

static PROVIDERS: &[ProviderConfig] = &[
    ProviderConfig::hosted("openai", "https://api.openai.com/v1", &["OPENAI_API_KEY"], "gpt-4o-mini")
        .with_base_url_env("OPENAI_API_BASE"),
    ProviderConfig::hosted(
        "openrouter",
        "https://openrouter.ai/api/v1",
        &["OPENROUTER_API_KEY", "OPENAI_API_KEY"],
        "openai/gpt-4o-mini",
    ),
    ProviderConfig::hosted("deepseek", "https://api.deepseek.com", &["DEEPSEEK_API_KEY"], "deepseek-chat"),
    ProviderConfig::hosted(
        "gemini",
        "https://generativelanguage.googleapis.com/v1beta/openai",
        &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        "gemini-2.5-flash",
    ),
    ProviderConfig::hosted(
        "groq",
        "https://api.groq.com/openai/v1",
        &["GROQ_API_KEY"],
        "llama-3.3-70b-versatile",
    ),
    ProviderConfig::local("ollama", "http://localhost:11434/v1", "OLLAMA_HOST", "llama3.2"),
    ProviderConfig::local("llamacpp", "http://localhost:8080/v1", "LLAMACPP_HOST", "local-model"),
];

pub fn get_provider_config(name: &str) -> Option<&'static ProviderConfig> {
    let canonical = match name {
        "google" => "gemini",
        "llama.cpp" => "llamacpp",
        other => other,
    };
    PROVIDERS.iter().find(|p| p.name == canonical)
}

pub fn all_provider_names() -> Vec<&'static str> {
    PROVIDERS.iter().map(|p| p.name).collect()
}
