//! Secrets configuration loaded from environment variables only.
//!
//! API keys never live in the settings file. Models may name a custom env
//! var through `api_key_env`; those are resolved with [`Secrets::load_named`].

use std::collections::BTreeMap;
use std::env;

use crate::provider::ProviderType;

/// Secrets loaded exclusively from environment variables.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    /// OpenAI API key (env: OPENAI_API_KEY)
    pub openai_api_key: Option<String>,

    /// Groq API key (env: GROQ_API_KEY)
    pub groq_api_key: Option<String>,

    /// Anthropic API key (env: ANTHROPIC_API_KEY)
    pub anthropic_api_key: Option<String>,

    /// Tavily Search API key (env: TAVILY_API_KEY)
    pub tavily_api_key: Option<String>,

    /// Keys resolved from custom env var names
    pub(crate) named: BTreeMap<String, String>,
}

/// Errors that can occur when loading secrets
#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
    #[error("Missing required secret: {0}")]
    MissingSecret(String),
}

impl Secrets {
    /// Load secrets from environment variables, reading `.env` first.
    pub fn from_env() -> Self {
        super::load_dotenv();
        Self::from_env_inner()
    }

    pub(crate) fn from_env_inner() -> Self {
        Self {
            openai_api_key: read_var("OPENAI_API_KEY"),
            groq_api_key: read_var("GROQ_API_KEY"),
            anthropic_api_key: read_var("ANTHROPIC_API_KEY"),
            tavily_api_key: read_var("TAVILY_API_KEY"),
            named: BTreeMap::new(),
        }
    }

    /// Read an additional env var by name and keep it for later lookup.
    pub fn load_named(&mut self, name: &str) {
        if let Some(value) = read_var(name) {
            self.named.insert(name.to_string(), value);
        }
    }

    /// Look up a key by env var name.
    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            "OPENAI_API_KEY" => self.openai_api_key.as_deref(),
            "GROQ_API_KEY" => self.groq_api_key.as_deref(),
            "ANTHROPIC_API_KEY" => self.anthropic_api_key.as_deref(),
            "TAVILY_API_KEY" => self.tavily_api_key.as_deref(),
            other => self.named.get(other).map(String::as_str),
        }
    }

    /// Like [`Secrets::get`] but missing keys are an error.
    pub fn require(&self, name: &str) -> Result<&str, SecretsError> {
        self.get(name)
            .ok_or_else(|| SecretsError::MissingSecret(name.to_string()))
    }

    /// Check whether the provider's default key is present (keyless providers always are).
    pub fn has_provider_type(&self, provider: ProviderType) -> bool {
        match provider.api_key_env() {
            Some(name) => self.get(name).is_some(),
            None => true,
        }
    }
}

fn read_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
