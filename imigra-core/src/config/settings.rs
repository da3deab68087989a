//! Settings configuration loaded from TOML files.
//!
//! This module handles non-sensitive configuration stored in TOML format
//! in the XDG config directory (~/.config/imigra/config.toml).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::provider::{EmbeddingProviderType, ProviderType};

/// Default TOML configuration file content
const DEFAULT_CONFIG_TOML: &str = r#"# imigra configuration file
# Located at: ~/.config/imigra/config.toml
#
# This file contains non-sensitive configuration.
# Secrets (API keys) are loaded from environment variables:
#   - OPENAI_API_KEY
#   - GROQ_API_KEY
#   - ANTHROPIC_API_KEY
#   - TAVILY_API_KEY (web search)

# Model alias used to generate answers (must exist under [models])
default_model = "local"

[models.local]
provider = "ollama"
model = "llama3.1:8b"
# base_url = "http://127.0.0.1:11434/v1"

# [models.openai]
# provider = "openai"
# model = "gpt-4o-mini"
# max_tokens = 1500
# temperature = 0.7

# [models.groq]
# provider = "groq"
# model = "llama-3.3-70b-versatile"

[embedding]
provider = "ollama"
url = "http://127.0.0.1:11434"
model = "nomic-embed-text"
# Fixed per deployment. Changing it requires a fresh knowledge database.
dimension = 768

[answering]
confidence_threshold = 0.7
top_k = 5
max_distance = 0.4
history_limit = 3
history_window_hours = 24

[web_search]
enabled = false
provider = "tavily"
max_results = 3
search_depth = "basic"
timeout_seconds = 15
cache_ttl_minutes = 60
cache_capacity = 256

[operators]
# Platform user ids allowed to answer escalated questions
ids = []

[gateway]
host = "127.0.0.1"
port = 3000

[logging]
level = "info"
"#;

/// Settings loaded from TOML configuration file.
///
/// These are non-sensitive configuration values that can be safely
/// stored in files and version controlled (excluding secrets).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    /// Model alias used for answer generation (must exist in `models`)
    #[serde(default)]
    pub default_model: String,

    /// Configured models keyed by alias
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,

    /// Embedding backend
    #[serde(default)]
    pub embedding: EmbeddingSettings,

    /// Retrieval and escalation tuning
    #[serde(default)]
    pub answering: AnsweringSettings,

    /// Web search enrichment
    #[serde(default)]
    pub web_search: WebSearchSettings,

    /// Operator identities
    #[serde(default)]
    pub operators: OperatorSettings,

    /// Gateway server configuration
    #[serde(default)]
    pub gateway: GatewaySettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Database location
    #[serde(default)]
    pub database: DatabaseSettings,
}

/// Model configuration entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Provider type (e.g. "openai", "groq", "ollama", "anthropic")
    #[serde(
        deserialize_with = "deserialize_model_provider",
        serialize_with = "serialize_model_provider"
    )]
    pub provider: ProviderType,
    /// Model identifier
    pub model: String,
    /// Base URL override (required for `openai_compatible`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Optional env var name used to resolve the provider API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ModelConfig {
    /// Env var that holds the API key for this model, if any.
    pub fn key_env(&self) -> Option<&str> {
        self.api_key_env
            .as_deref()
            .or_else(|| self.provider.api_key_env())
    }
}

/// Embedding backend settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingSettings {
    #[serde(
        default = "default_embedding_provider",
        deserialize_with = "deserialize_embedding_provider",
        serialize_with = "serialize_embedding_provider"
    )]
    pub provider: EmbeddingProviderType,

    /// Base URL of the embedding service
    #[serde(default)]
    pub url: Option<String>,

    /// Embedding model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Vector width; constant for the lifetime of a knowledge database
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Optional env var name holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

impl EmbeddingSettings {
    pub fn key_env(&self) -> Option<&str> {
        match (&self.api_key_env, self.provider) {
            (Some(name), _) => Some(name.as_str()),
            (None, EmbeddingProviderType::OpenAi) if self.url.is_none() => Some("OPENAI_API_KEY"),
            _ => None,
        }
    }

    pub fn base_url(&self) -> &str {
        match (&self.url, self.provider) {
            (Some(url), _) => url.as_str(),
            (None, EmbeddingProviderType::Ollama) => "http://127.0.0.1:11434",
            (None, EmbeddingProviderType::OpenAi) => "https://api.openai.com/v1",
        }
    }
}

/// Retrieval and escalation tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnsweringSettings {
    /// Minimum confidence for an automated reply (default: 0.7)
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Knowledge entries retrieved per question (default: 5)
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Maximum cosine distance for a knowledge hit (default: 0.4)
    #[serde(default = "default_max_distance")]
    pub max_distance: f32,

    /// Prior answered turns included as history (default: 3)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// History look-back window in hours (default: 24)
    #[serde(default = "default_history_window_hours")]
    pub history_window_hours: u64,
}

/// Web search settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebSearchSettings {
    /// Allow web search enrichment at all
    #[serde(default)]
    pub enabled: bool,

    /// Provider name (currently only "tavily")
    #[serde(default = "default_web_search_provider")]
    pub provider: String,

    /// Base URL override (tests, proxies)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Maximum sources included in the formatted context
    #[serde(default = "default_web_search_max_results")]
    pub max_results: usize,

    /// "basic" or "advanced"
    #[serde(default = "default_web_search_depth")]
    pub search_depth: String,

    /// Request timeout in seconds
    #[serde(default = "default_web_search_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Cache TTL in minutes
    #[serde(default = "default_web_search_cache_ttl_minutes")]
    pub cache_ttl_minutes: u64,

    /// Maximum cached queries
    #[serde(default = "default_web_search_cache_capacity")]
    pub cache_capacity: usize,
}

/// Operator identities
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OperatorSettings {
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Gateway server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewaySettings {
    /// Host to bind to
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Database settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseSettings {
    /// Override for the SQLite file location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

// Default value functions

fn default_embedding_provider() -> EmbeddingProviderType {
    EmbeddingProviderType::Ollama
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_embedding_dimension() -> usize {
    768
}

fn default_confidence_threshold() -> f32 {
    0.7
}

fn default_top_k() -> usize {
    5
}

fn default_max_distance() -> f32 {
    0.4
}

fn default_history_limit() -> usize {
    3
}

fn default_history_window_hours() -> u64 {
    24
}

fn default_web_search_provider() -> String {
    "tavily".to_string()
}

fn default_web_search_max_results() -> usize {
    3
}

fn default_web_search_depth() -> String {
    "basic".to_string()
}

fn default_web_search_timeout_seconds() -> u64 {
    15
}

fn default_web_search_cache_ttl_minutes() -> u64 {
    60
}

fn default_web_search_cache_capacity() -> usize {
    256
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            url: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            api_key_env: None,
        }
    }
}

impl Default for AnsweringSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            top_k: default_top_k(),
            max_distance: default_max_distance(),
            history_limit: default_history_limit(),
            history_window_hours: default_history_window_hours(),
        }
    }
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_web_search_provider(),
            base_url: None,
            max_results: default_web_search_max_results(),
            search_depth: default_web_search_depth(),
            timeout_seconds: default_web_search_timeout_seconds(),
            cache_ttl_minutes: default_web_search_cache_ttl_minutes(),
            cache_capacity: default_web_search_cache_capacity(),
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn deserialize_model_provider<'de, D>(deserializer: D) -> Result<ProviderType, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    value.parse().map_err(serde::de::Error::custom)
}

fn serialize_model_provider<S>(provider: &ProviderType, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(provider.as_str())
}

fn deserialize_embedding_provider<'de, D>(
    deserializer: D,
) -> Result<EmbeddingProviderType, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    value.parse().map_err(serde::de::Error::custom)
}

fn serialize_embedding_provider<S>(
    provider: &EmbeddingProviderType,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(provider.as_str())
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config directory not found")]
    ConfigDirNotFound,
}

impl Settings {
    /// Load settings from the TOML configuration file.
    ///
    /// If the config file doesn't exist, creates it with default values.
    pub fn load() -> Result<Self, SettingsError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("Creating default configuration at {:?}", config_path);
            Self::create_default_config(&config_path)?;
        }

        let content = fs::read_to_string(&config_path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(content)?;
        Ok(settings)
    }

    /// Get the configuration file path.
    ///
    /// `IMIGRA_CONFIG_DIR` wins over the XDG config directory.
    pub fn config_path() -> Result<PathBuf, SettingsError> {
        if let Ok(override_dir) = std::env::var("IMIGRA_CONFIG_DIR") {
            return Ok(PathBuf::from(override_dir).join("config.toml"));
        }

        let config_dir = dirs::config_dir()
            .ok_or(SettingsError::ConfigDirNotFound)?
            .join("imigra");

        Ok(config_dir.join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, DEFAULT_CONFIG_TOML)?;
        Ok(())
    }

    /// Resolve the model used for answer generation.
    pub fn default_model_config(&self) -> Option<&ModelConfig> {
        self.models.get(self.default_model.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_toml_parses() {
        let settings = Settings::from_toml(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(settings.default_model, "local");
        let model = settings.default_model_config().unwrap();
        assert_eq!(model.provider, ProviderType::Ollama);
        assert_eq!(settings.embedding.dimension, 768);
        assert_eq!(settings.answering.top_k, 5);
        assert!((settings.answering.confidence_threshold - 0.7).abs() < f32::EPSILON);
        assert!(!settings.web_search.enabled);
        assert!(settings.operators.ids.is_empty());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert!(settings.default_model_config().is_none());
        assert_eq!(settings.embedding.provider, EmbeddingProviderType::Ollama);
        assert_eq!(settings.answering.history_limit, 3);
        assert_eq!(settings.answering.history_window_hours, 24);
        assert_eq!(settings.web_search.cache_ttl_minutes, 60);
        assert_eq!(settings.gateway.port, 3000);
    }

    #[test]
    fn test_model_entry_parsing() {
        let toml = r#"
default_model = "fast"

[models.fast]
provider = "groq"
model = "llama-3.3-70b-versatile"
max_tokens = 1500
temperature = 0.7

[embedding]
provider = "openai"
model = "text-embedding-3-small"
dimension = 1536
"#;
        let settings = Settings::from_toml(toml).unwrap();
        let model = settings.default_model_config().unwrap();
        assert_eq!(model.provider, ProviderType::Groq);
        assert_eq!(model.key_env(), Some("GROQ_API_KEY"));
        assert_eq!(model.max_tokens, Some(1500));
        assert_eq!(settings.embedding.dimension, 1536);
        assert_eq!(settings.embedding.key_env(), Some("OPENAI_API_KEY"));
        assert_eq!(settings.embedding.base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let toml = "[models.x]\nprovider = \"gemini\"\nmodel = \"m\"\n";
        assert!(matches!(
            Settings::from_toml(toml),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn test_load_creates_default_file() {
        let _lock = crate::config::ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        unsafe { std::env::set_var("IMIGRA_CONFIG_DIR", dir.path()) }

        let settings = Settings::load().unwrap();
        assert!(dir.path().join("config.toml").exists());
        assert_eq!(settings.default_model, "local");

        unsafe { std::env::remove_var("IMIGRA_CONFIG_DIR") }
    }
}
