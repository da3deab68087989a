//! Answer generation capability.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::providers::confidence::parse_confidence;
use crate::providers::prompt;
use crate::providers::provider::{ChatProvider, ChatRequest, ProviderError};

/// A verified Q&A pair handed to the model as reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSnippet {
    pub question: String,
    pub answer: String,
    pub similarity: f32,
}

/// One earlier exchange with the same user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
    pub knowledge: Vec<KnowledgeSnippet>,
    pub history: Vec<HistoryTurn>,
    pub web_context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub answer: String,
    /// Self-reported confidence in [0, 1]
    pub confidence: f32,
}

#[async_trait::async_trait]
pub trait AnswerProvider: Send + Sync {
    async fn generate(&self, request: &AnswerRequest) -> Result<GeneratedAnswer, ProviderError>;
}

/// Answers through a chat model and reads confidence from its reply.
#[derive(Clone)]
pub struct ModelAnswerProvider {
    chat: Arc<dyn ChatProvider>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl ModelAnswerProvider {
    pub fn new(chat: Arc<dyn ChatProvider>) -> Self {
        Self {
            chat,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_limits(mut self, max_tokens: Option<u32>, temperature: Option<f32>) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }
}

#[async_trait::async_trait]
impl AnswerProvider for ModelAnswerProvider {
    async fn generate(&self, request: &AnswerRequest) -> Result<GeneratedAnswer, ProviderError> {
        let chat_request = ChatRequest {
            system: Some(prompt::SYSTEM_PROMPT.to_string()),
            messages: prompt::build_messages(request),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self.chat.complete(&chat_request).await?;
        let parsed = parse_confidence(&response.text);
        if parsed.answer.is_empty() {
            return Err(ProviderError::NoContent);
        }

        debug!(
            provider = self.chat.name(),
            model = %response.model,
            confidence = parsed.confidence,
            "answer generated"
        );

        Ok(GeneratedAnswer {
            answer: parsed.answer,
            confidence: parsed.confidence,
        })
    }
}
