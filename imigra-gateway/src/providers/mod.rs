pub mod anthropic;
pub mod answer;
pub mod confidence;
pub mod embedding;
pub mod openai_compatible;
pub mod prompt;
pub mod provider;
pub mod registry;

pub use answer::{
    AnswerProvider, AnswerRequest, GeneratedAnswer, HistoryTurn, KnowledgeSnippet,
    ModelAnswerProvider,
};
pub use embedding::{EmbeddingProvider, OllamaEmbeddingClient, OpenAiEmbeddingClient};
pub use provider::{
    ChatMessage, ChatProvider, ChatRequest, ChatRole, ProviderError, ProviderResponse,
    ProviderUsage,
};
