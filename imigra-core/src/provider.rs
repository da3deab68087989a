//! Backend kinds selectable from configuration.

/// Chat backends able to produce answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderType {
    OpenAi,
    Groq,
    Ollama,
    OpenAiCompatible,
    Anthropic,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::OpenAi => "openai",
            ProviderType::Groq => "groq",
            ProviderType::Ollama => "ollama",
            ProviderType::OpenAiCompatible => "openai_compatible",
            ProviderType::Anthropic => "anthropic",
        }
    }

    /// Default API base URL for the provider, when it has a well-known one.
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            ProviderType::OpenAi => Some("https://api.openai.com/v1"),
            ProviderType::Groq => Some("https://api.groq.com/openai/v1"),
            ProviderType::Ollama => Some("http://127.0.0.1:11434/v1"),
            ProviderType::OpenAiCompatible => None,
            ProviderType::Anthropic => Some("https://api.anthropic.com"),
        }
    }

    /// Environment variable holding the API key, if the provider needs one.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderType::OpenAi => Some("OPENAI_API_KEY"),
            ProviderType::Groq => Some("GROQ_API_KEY"),
            ProviderType::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderType::Ollama | ProviderType::OpenAiCompatible => None,
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderType::OpenAi),
            "groq" => Ok(ProviderType::Groq),
            "ollama" => Ok(ProviderType::Ollama),
            "openai_compatible" | "openai-compatible" | "openaicompatible" => {
                Ok(ProviderType::OpenAiCompatible)
            }
            "anthropic" | "claude" => Ok(ProviderType::Anthropic),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Embedding backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbeddingProviderType {
    /// Native Ollama `/api/embed` endpoint
    Ollama,
    /// OpenAI `/v1/embeddings` and compatible servers
    OpenAi,
}

impl EmbeddingProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingProviderType::Ollama => "ollama",
            EmbeddingProviderType::OpenAi => "openai",
        }
    }
}

impl std::fmt::Display for EmbeddingProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EmbeddingProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(EmbeddingProviderType::Ollama),
            "openai" | "openai_compatible" | "openai-compatible" => {
                Ok(EmbeddingProviderType::OpenAi)
            }
            _ => Err(format!("Unknown embedding provider: {}", s)),
        }
    }
}
