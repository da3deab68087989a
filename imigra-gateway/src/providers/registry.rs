//! Backend selection from configuration.

use std::sync::Arc;

use imigra_core::{Config, EmbeddingProviderType, ModelConfig, ProviderType};
use tracing::info;

use crate::providers::anthropic::AnthropicClient;
use crate::providers::answer::{AnswerProvider, ModelAnswerProvider};
use crate::providers::embedding::{EmbeddingProvider, OllamaEmbeddingClient, OpenAiEmbeddingClient};
use crate::providers::openai_compatible::OpenAiCompatibleClient;
use crate::providers::provider::{ChatProvider, ProviderError};

/// Build the chat backend for a configured model.
pub fn build_chat_provider(
    config: &Config,
    model: &ModelConfig,
) -> Result<Arc<dyn ChatProvider>, ProviderError> {
    let api_key = config.model_api_key(model).map(str::to_string);
    if api_key.is_none()
        && let Some(env) = model.key_env()
    {
        return Err(ProviderError::MissingApiKey(env.to_string()));
    }

    let provider: Arc<dyn ChatProvider> = match model.provider {
        ProviderType::Anthropic => {
            let api_key =
                api_key.ok_or_else(|| ProviderError::MissingApiKey("ANTHROPIC_API_KEY".into()))?;
            let mut client = AnthropicClient::new(api_key, &model.model)?;
            if let Some(base_url) = &model.base_url {
                client = client.with_base_url(base_url);
            }
            Arc::new(client)
        }
        ProviderType::OpenAi
        | ProviderType::Groq
        | ProviderType::Ollama
        | ProviderType::OpenAiCompatible => {
            let base_url = model
                .base_url
                .as_deref()
                .or_else(|| model.provider.default_base_url())
                .ok_or_else(|| {
                    ProviderError::InvalidFormat(format!(
                        "model '{}' needs a base_url",
                        model.model
                    ))
                })?;
            Arc::new(OpenAiCompatibleClient::new(
                base_url,
                api_key,
                &model.model,
                model.provider.as_str(),
            )?)
        }
    };

    info!(
        provider = provider.name(),
        model = provider.model(),
        "chat provider ready"
    );
    Ok(provider)
}

/// Answer provider for the default model.
pub fn build_answer_provider(config: &Config) -> Result<Arc<dyn AnswerProvider>, ProviderError> {
    let model = config.default_model_config().ok_or_else(|| {
        ProviderError::InvalidFormat(format!(
            "default model '{}' is not configured",
            config.default_model_alias()
        ))
    })?;
    let chat = build_chat_provider(config, model)?;
    Ok(Arc::new(
        ModelAnswerProvider::new(chat).with_limits(model.max_tokens, model.temperature),
    ))
}

/// Embedding backend from `[embedding]`.
pub fn build_embedding_provider(
    config: &Config,
) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
    let settings = &config.settings.embedding;
    let provider: Arc<dyn EmbeddingProvider> = match settings.provider {
        EmbeddingProviderType::Ollama => Arc::new(OllamaEmbeddingClient::new(
            settings.base_url(),
            &settings.model,
        )?),
        EmbeddingProviderType::OpenAi => {
            let api_key = config.embedding_api_key().map(str::to_string);
            if api_key.is_none()
                && let Some(env) = settings.key_env()
            {
                return Err(ProviderError::MissingApiKey(env.to_string()));
            }
            let mut client =
                OpenAiEmbeddingClient::new(settings.base_url(), &settings.model, api_key)?;
            if settings.model.starts_with("text-embedding-3") {
                client = client.with_dimensions(settings.dimension);
            }
            Arc::new(client)
        }
    };

    info!(
        provider = %settings.provider,
        model = provider.model(),
        dimension = settings.dimension,
        "embedding provider ready"
    );
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use imigra_core::{Secrets, Settings};

    use super::*;

    fn secrets(set: impl FnOnce(&mut Secrets)) -> Secrets {
        let mut secrets = Secrets::default();
        set(&mut secrets);
        secrets
    }

    fn config(toml: &str, secrets: Secrets) -> Config {
        Config::from_parts(secrets, Settings::from_toml(toml).unwrap()).unwrap()
    }

    #[test]
    fn test_builds_groq_chat_provider() {
        let config = config(
            "default_model = \"fast\"\n[models.fast]\nprovider = \"groq\"\nmodel = \"llama\"\n",
            secrets(|s| s.groq_api_key = Some("gsk".to_string())),
        );
        let model = config.default_model_config().unwrap();
        let chat = build_chat_provider(&config, model).unwrap();
        assert_eq!(chat.name(), "groq");
        assert_eq!(chat.model(), "llama");
        assert!(build_answer_provider(&config).is_ok());
    }

    #[test]
    fn test_builds_anthropic_and_embedding() {
        let config = config(
            "default_model = \"c\"\n[models.c]\nprovider = \"anthropic\"\nmodel = \"claude\"\n\
             [embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\n",
            secrets(|s| s.anthropic_api_key = Some("sk-ant".to_string())),
        );
        let model = config.default_model_config().unwrap();
        assert_eq!(build_chat_provider(&config, model).unwrap().name(), "anthropic");
        assert_eq!(
            build_embedding_provider(&config).unwrap().model(),
            "nomic-embed-text"
        );
    }

    #[test]
    fn test_openai_embedding_requires_key() {
        let config = config(
            "default_model = \"l\"\n[models.l]\nprovider = \"ollama\"\nmodel = \"llama3.1\"\n\
             [embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndimension = 1536\n",
            Secrets::default(),
        );
        assert!(matches!(
            build_embedding_provider(&config),
            Err(ProviderError::MissingApiKey(env)) if env == "OPENAI_API_KEY"
        ));
    }
}
