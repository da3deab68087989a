//! Configuration management for imigra.
//!
//! Secrets come from environment variables, settings from a TOML file.
//!
//! # Configuration Sources
//!
//! ## Secrets (Environment Variables)
//! - `OPENAI_API_KEY` - OpenAI API key
//! - `GROQ_API_KEY` - Groq API key
//! - `ANTHROPIC_API_KEY` - Anthropic API key
//! - `TAVILY_API_KEY` - Tavily Search API key
//!
//! ## Settings (TOML File)
//! Located at `~/.config/imigra/config.toml` (or `$IMIGRA_CONFIG_DIR/config.toml`):
//! ```toml
//! default_model = "local"
//!
//! [models.local]
//! provider = "ollama"
//! model = "llama3.1:8b"
//!
//! [embedding]
//! provider = "ollama"
//! dimension = 768
//!
//! [answering]
//! confidence_threshold = 0.7
//! ```

mod secrets;
mod settings;

pub use secrets::{Secrets, SecretsError};
pub use settings::{
    AnsweringSettings, DatabaseSettings, EmbeddingSettings, GatewaySettings, LoggingSettings,
    ModelConfig, OperatorSettings, Settings, SettingsError, WebSearchSettings,
};

#[cfg(test)]
pub(crate) static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Load `.env` from the working directory if present.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

/// Combined configuration containing both secrets and settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Secrets loaded from environment variables
    pub secrets: Secrets,
    /// Settings loaded from TOML configuration file
    pub settings: Settings,
}

/// Errors that can occur when loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Secrets error: {0}")]
    Secrets(#[from] SecretsError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Default model alias is not set")]
    DefaultModelNotSet,

    #[error("Default model alias '{0}' not found in config")]
    DefaultModelNotFound(String),

    #[error("Model '{alias}' needs an API key in {env}")]
    MissingApiKey { alias: String, env: String },

    #[error("Model '{0}' uses openai_compatible but has no base_url")]
    MissingBaseUrl(String),

    #[error("Embedding dimension must be positive")]
    InvalidEmbeddingDimension,

    #[error("confidence_threshold must be within [0, 1], got {0}")]
    InvalidConfidenceThreshold(f32),

    #[error("Unsupported web search provider '{0}'")]
    UnsupportedWebSearchProvider(String),

    #[error("Unsupported search depth '{0}' (expected basic or advanced)")]
    InvalidSearchDepth(String),
}

impl Config {
    /// Load configuration from the environment and the settings file.
    pub fn load() -> Result<Self, ConfigError> {
        let secrets = Secrets::from_env();
        let settings = Settings::load()?;
        Self::from_parts(secrets, settings)
    }

    /// Validate settings against available secrets.
    pub fn from_parts(mut secrets: Secrets, settings: Settings) -> Result<Self, ConfigError> {
        let default_alias = settings.default_model.trim();
        if default_alias.is_empty() {
            return Err(ConfigError::DefaultModelNotSet);
        }

        let default_model = settings
            .models
            .get(default_alias)
            .ok_or_else(|| ConfigError::DefaultModelNotFound(default_alias.to_string()))?;

        if let Some(env) = default_model.key_env() {
            secrets.load_named(env);
            if secrets.get(env).is_none() {
                return Err(ConfigError::MissingApiKey {
                    alias: default_alias.to_string(),
                    env: env.to_string(),
                });
            }
        }

        if default_model.provider == crate::ProviderType::OpenAiCompatible
            && default_model.base_url.is_none()
        {
            return Err(ConfigError::MissingBaseUrl(default_alias.to_string()));
        }

        if settings.embedding.dimension == 0 {
            return Err(ConfigError::InvalidEmbeddingDimension);
        }
        if let Some(env) = settings.embedding.key_env() {
            secrets.load_named(env);
        }

        let threshold = settings.answering.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidConfidenceThreshold(threshold));
        }

        let web = &settings.web_search;
        if web.provider != "tavily" {
            return Err(ConfigError::UnsupportedWebSearchProvider(web.provider.clone()));
        }
        if !matches!(web.search_depth.as_str(), "basic" | "advanced") {
            return Err(ConfigError::InvalidSearchDepth(web.search_depth.clone()));
        }
        if web.enabled && secrets.tavily_api_key.is_none() {
            tracing::warn!("web_search.enabled is set but TAVILY_API_KEY is missing; web search disabled");
        }

        Ok(Self { secrets, settings })
    }

    /// Get the default model alias.
    pub fn default_model_alias(&self) -> &str {
        self.settings.default_model.trim()
    }

    /// Get the default model configuration.
    pub fn default_model_config(&self) -> Option<&ModelConfig> {
        self.settings.default_model_config()
    }

    /// API key for a model, if its provider needs one.
    pub fn model_api_key(&self, model: &ModelConfig) -> Option<&str> {
        model.key_env().and_then(|env| self.secrets.get(env))
    }

    /// API key for the embedding backend, if any.
    pub fn embedding_api_key(&self) -> Option<&str> {
        self.settings
            .embedding
            .key_env()
            .and_then(|env| self.secrets.get(env))
    }

    /// Web search is active only when enabled and a key is present.
    pub fn web_search_enabled(&self) -> bool {
        self.settings.web_search.enabled && self.secrets.tavily_api_key.is_some()
    }

    /// Get the Tavily API key (if configured).
    pub fn tavily_api_key(&self) -> Option<&str> {
        self.secrets.tavily_api_key.as_deref()
    }

    /// Get the HTTP bind address.
    pub fn bind_addr(&self) -> String {
        format!(
            "{}:{}",
            self.settings.gateway.host, self.settings.gateway.port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets_with_groq() -> Secrets {
        Secrets {
            groq_api_key: Some("gsk".to_string()),
            ..Default::default()
        }
    }

    const GROQ_TOML: &str = r#"
default_model = "fast"

[models.fast]
provider = "groq"
model = "llama-3.3-70b-versatile"
"#;

    #[test]
    fn test_valid_config() {
        let settings = Settings::from_toml(GROQ_TOML).unwrap();
        let config = Config::from_parts(secrets_with_groq(), settings).unwrap();
        assert_eq!(config.default_model_alias(), "fast");
        let model = config.default_model_config().unwrap();
        assert_eq!(config.model_api_key(model), Some("gsk"));
        assert_eq!(config.bind_addr(), "127.0.0.1:3000");
        assert!(!config.web_search_enabled());
    }

    #[test]
    fn test_missing_default_model() {
        let settings = Settings::from_toml("default_model = \"nope\"").unwrap();
        assert!(matches!(
            Config::from_parts(Secrets::default(), settings),
            Err(ConfigError::DefaultModelNotFound(alias)) if alias == "nope"
        ));

        let settings = Settings::from_toml("").unwrap();
        assert!(matches!(
            Config::from_parts(Secrets::default(), settings),
            Err(ConfigError::DefaultModelNotSet)
        ));
    }

    #[test]
    fn test_missing_api_key() {
        let settings = Settings::from_toml(GROQ_TOML).unwrap();
        assert!(matches!(
            Config::from_parts(Secrets::default(), settings),
            Err(ConfigError::MissingApiKey { env, .. }) if env == "GROQ_API_KEY"
        ));
    }

    #[test]
    fn test_invalid_threshold_and_depth() {
        let toml = format!("{GROQ_TOML}\n[answering]\nconfidence_threshold = 1.5\n");
        let settings = Settings::from_toml(&toml).unwrap();
        assert!(matches!(
            Config::from_parts(secrets_with_groq(), settings),
            Err(ConfigError::InvalidConfidenceThreshold(_))
        ));

        let toml = format!("{GROQ_TOML}\n[web_search]\nsearch_depth = \"deep\"\n");
        let settings = Settings::from_toml(&toml).unwrap();
        assert!(matches!(
            Config::from_parts(secrets_with_groq(), settings),
            Err(ConfigError::InvalidSearchDepth(_))
        ));
    }

    #[test]
    fn test_web_search_requires_key() {
        let toml = format!("{GROQ_TOML}\n[web_search]\nenabled = true\n");
        let settings = Settings::from_toml(&toml).unwrap();
        let config = Config::from_parts(secrets_with_groq(), settings.clone()).unwrap();
        assert!(!config.web_search_enabled());

        let mut secrets = secrets_with_groq();
        secrets.tavily_api_key = Some("tvly".to_string());
        let config = Config::from_parts(secrets, settings).unwrap();
        assert!(config.web_search_enabled());
        assert_eq!(config.tavily_api_key(), Some("tvly"));
    }
}
