//! Shared helpers for integration tests.

use std::sync::Arc;

use imigra_core::OperatorList;
use imigra_db::DeskDbPool;
use imigra_db::test_helpers::create_test_desk_pool;
use imigra_gateway::providers::{
    AnswerProvider, AnswerRequest, EmbeddingProvider, GeneratedAnswer, ProviderError,
};
use imigra_gateway::{
    AppState, ConversationHistory, DeskService, KnowledgeStore, RetrievalAugmentedAnswerer,
};

pub const DIM: usize = 16;

const TOPICS: &[&[&str]] = &[
    &["виз", "visa"],
    &["d7"],
    &["документ", "document"],
    &["nif"],
    &["апелляц", "appeal"],
    &["отказ", "refus"],
    &["внж", "residen"],
    &["доход", "income"],
];

/// Topic-counting embedder: paraphrases sharing topics are close.
pub struct TopicEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for TopicEmbedder {
    fn model(&self) -> &str {
        "topic-test"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vector = vec![0.0f32; DIM];
        for token in imigra_gateway::text::tokens(text) {
            match TOPICS
                .iter()
                .position(|stems| stems.iter().any(|stem| token.starts_with(stem)))
            {
                Some(idx) => vector[idx] += 1.0,
                None => vector[TOPICS.len() + token.chars().count() % (DIM - TOPICS.len())] += 0.1,
            }
        }
        vector[DIM - 1] += 0.01;
        Ok(vector)
    }
}

/// Answers from the best knowledge snippet, unsure without one.
pub struct KnowledgeEchoAnswerer;

#[async_trait::async_trait]
impl AnswerProvider for KnowledgeEchoAnswerer {
    async fn generate(&self, request: &AnswerRequest) -> Result<GeneratedAnswer, ProviderError> {
        Ok(match request.knowledge.first() {
            Some(snippet) => GeneratedAnswer {
                answer: snippet.answer.clone(),
                confidence: 0.6,
            },
            None => GeneratedAnswer {
                answer: "Не уверен.".to_string(),
                confidence: 0.2,
            },
        })
    }
}

#[allow(dead_code)]
pub async fn desk() -> (DeskDbPool, DeskService) {
    let db = create_test_desk_pool(DIM).await.expect("test database");
    let answerer = RetrievalAugmentedAnswerer::new(
        KnowledgeStore::new(db.clone(), Arc::new(TopicEmbedder)),
        ConversationHistory::new(db.clone()),
        Arc::new(KnowledgeEchoAnswerer),
    );
    (db.clone(), DeskService::new(db, answerer, 0.7))
}

#[allow(dead_code)]
pub async fn app_state(operators: &[&str]) -> Arc<AppState> {
    let (_db, desk) = desk().await;
    Arc::new(AppState::new(
        desk,
        Arc::new(OperatorList::new(operators.iter().copied())),
    ))
}
