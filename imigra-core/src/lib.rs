pub mod access;
pub mod config;
pub mod provider;

pub use access::{AccessPolicy, OperatorList};
pub use provider::{EmbeddingProviderType, ProviderType};

// Config re-exports
pub use config::{
    AnsweringSettings,
    Config,
    ConfigError,
    EmbeddingSettings,
    GatewaySettings,
    ModelConfig,
    Secrets,
    SecretsError,
    Settings,
    SettingsError,
    WebSearchSettings,
    load_dotenv,
};
