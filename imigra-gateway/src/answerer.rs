//! Retrieval-augmented answering.
//!
//! Short messages that are only a greeting or a thank-you get a canned
//! reply. Everything else is answered by the model with the closest
//! verified knowledge entries, the user's recent exchanges and optionally
//! web results as context.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::deterministic_messages::{Locale, user};
use crate::history::ConversationHistory;
use crate::knowledge::{KnowledgeStore, SimilarEntry};
use crate::providers::{AnswerProvider, AnswerRequest, KnowledgeSnippet, ProviderError};
use crate::text;
use crate::web::search::{SearchDepth, WebSearchClient};

/// Above this top similarity the knowledge base is trusted.
pub const HIGH_SIMILARITY: f32 = 0.8;
/// Confidence floor when a near-identical entry was found.
pub const KNOWLEDGE_CONFIDENCE_FLOOR: f32 = 0.85;
/// Confidence floor when web results backed the answer.
pub const WEB_CONFIDENCE_FLOOR: f32 = 0.75;

/// Title of the synthetic source for web context.
pub const WEB_SOURCE_TITLE: &str = "Web Search";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnswerOptions {
    /// Search the web even when the knowledge base has hits
    pub use_web_search: bool,
    pub search_depth: SearchDepth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    Greeting,
    Closing,
    Generated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceOrigin {
    KnowledgeBase { entry_id: i64, similarity: f32 },
    WebSearch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerSource {
    pub question: String,
    pub answer: String,
    pub origin: SourceOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerOutcome {
    pub answer: String,
    pub confidence: f32,
    pub sources: Vec<AnswerSource>,
    pub kind: AnswerKind,
    pub locale: Locale,
    /// Embedding of the question, when one was computed
    #[serde(skip)]
    pub question_embedding: Option<Vec<f32>>,
}

impl AnswerOutcome {
    fn canned(answer: &str, kind: AnswerKind, locale: Locale) -> Self {
        Self {
            answer: answer.to_string(),
            confidence: 1.0,
            sources: Vec::new(),
            kind,
            locale,
            question_embedding: None,
        }
    }

    /// Whether verified knowledge backed the answer. Web results alone do
    /// not count.
    pub fn context_available(&self) -> bool {
        self.sources
            .iter()
            .any(|source| matches!(source.origin, SourceOrigin::KnowledgeBase { .. }))
    }

    /// Ids of knowledge entries used as context.
    pub fn knowledge_entry_ids(&self) -> Vec<i64> {
        self.sources
            .iter()
            .filter_map(|source| match source.origin {
                SourceOrigin::KnowledgeBase { entry_id, .. } => Some(entry_id),
                SourceOrigin::WebSearch => None,
            })
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnswerError {
    #[error("answer generation failed: {0}")]
    Generation(#[from] ProviderError),
}

/// Tunables of the retrieval step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnswererSettings {
    pub history_limit: usize,
    pub history_window: Duration,
    pub web_max_results: usize,
}

impl Default for AnswererSettings {
    fn default() -> Self {
        Self {
            history_limit: 3,
            history_window: Duration::from_secs(24 * 3600),
            web_max_results: 3,
        }
    }
}

#[derive(Clone)]
pub struct RetrievalAugmentedAnswerer {
    knowledge: KnowledgeStore,
    history: ConversationHistory,
    provider: Arc<dyn AnswerProvider>,
    web: Option<Arc<WebSearchClient>>,
    settings: AnswererSettings,
}

impl RetrievalAugmentedAnswerer {
    pub fn new(
        knowledge: KnowledgeStore,
        history: ConversationHistory,
        provider: Arc<dyn AnswerProvider>,
    ) -> Self {
        Self {
            knowledge,
            history,
            provider,
            web: None,
            settings: AnswererSettings::default(),
        }
    }

    pub fn with_web_search(mut self, web: Arc<WebSearchClient>) -> Self {
        self.web = Some(web);
        self
    }

    pub fn with_settings(mut self, settings: AnswererSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    pub async fn answer(
        &self,
        question: &str,
        user_id: i64,
        options: AnswerOptions,
    ) -> Result<AnswerOutcome, AnswerError> {
        let question = question.trim();
        let locale = Locale::detect(question);

        if text::is_greeting(question) {
            debug!(user_id, "greeting short-circuit");
            return Ok(AnswerOutcome::canned(
                user::greeting(locale),
                AnswerKind::Greeting,
                locale,
            ));
        }
        if text::is_acknowledgement(question) {
            debug!(user_id, "acknowledgement short-circuit");
            return Ok(AnswerOutcome::canned(
                user::closing(locale),
                AnswerKind::Closing,
                locale,
            ));
        }

        let ((embedding, hits), history) = tokio::join!(
            self.retrieve(question),
            self.history.recent_turns(
                user_id,
                self.settings.history_limit,
                self.settings.history_window
            )
        );

        let web_context = if options.use_web_search
            || (hits.is_empty() && !text::is_acknowledgement(question))
        {
            self.search_web(question, options.search_depth).await
        } else {
            None
        };

        let request = AnswerRequest {
            question: question.to_string(),
            knowledge: hits
                .iter()
                .map(|hit| KnowledgeSnippet {
                    question: hit.entry.question.clone(),
                    answer: hit.entry.answer.clone(),
                    similarity: hit.similarity,
                })
                .collect(),
            history,
            web_context,
        };

        let generated = self.provider.generate(&request).await?;

        let top_similarity = hits.first().map(|hit| hit.similarity);
        let confidence = apply_floor(
            generated.confidence,
            top_similarity,
            request.web_context.is_some(),
        );

        let mut sources: Vec<AnswerSource> = hits
            .into_iter()
            .map(|hit| AnswerSource {
                origin: SourceOrigin::KnowledgeBase {
                    entry_id: hit.entry.id,
                    similarity: hit.similarity,
                },
                question: hit.entry.question,
                answer: hit.entry.answer,
            })
            .collect();
        if let Some(web) = request.web_context {
            sources.push(AnswerSource {
                question: WEB_SOURCE_TITLE.to_string(),
                answer: web,
                origin: SourceOrigin::WebSearch,
            });
        }

        info!(
            user_id,
            raw_confidence = generated.confidence,
            confidence,
            sources = sources.len(),
            "answer generated"
        );

        Ok(AnswerOutcome {
            answer: generated.answer,
            confidence,
            sources,
            kind: AnswerKind::Generated,
            locale,
            question_embedding: embedding,
        })
    }

    /// Embed once and search. Failures leave the model without knowledge context.
    async fn retrieve(&self, question: &str) -> (Option<Vec<f32>>, Vec<SimilarEntry>) {
        let embedding = match self.knowledge.embed(question).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(error = %err, "question embedding failed; answering without knowledge");
                return (None, Vec::new());
            }
        };

        let bounds = self.knowledge.bounds();
        let hits = match self
            .knowledge
            .find_similar(&embedding, bounds.top_k, bounds.max_distance)
            .await
        {
            Ok(hits) => hits,
            Err(err) => {
                warn!(error = %err, "knowledge search failed; answering without knowledge");
                Vec::new()
            }
        };
        (Some(embedding), hits)
    }

    async fn search_web(&self, question: &str, depth: SearchDepth) -> Option<String> {
        let web = self.web.as_ref()?;
        web.search(question, self.settings.web_max_results, depth)
            .await
    }
}

/// Raise a model-reported confidence when strong context backed the answer.
pub fn apply_floor(confidence: f32, top_similarity: Option<f32>, web_used: bool) -> f32 {
    let confidence = confidence.clamp(0.0, 1.0);
    match top_similarity {
        Some(similarity) if similarity > HIGH_SIMILARITY => {
            confidence.max(KNOWLEDGE_CONFIDENCE_FLOOR)
        }
        _ if web_used => confidence.max(WEB_CONFIDENCE_FLOOR),
        _ => confidence,
    }
}

#[cfg(test)]
mod tests {
    use imigra_db::test_helpers::create_test_desk_pool;
    use imigra_db::{
        DeskDbPool, InteractionRepository, KnowledgeSource, NewUser, UserRepository,
    };

    use super::*;
    use crate::test_support::{
        FailingAnswerer, FailingEmbedder, KeywordEmbedder, ScriptedAnswerer, StaticSearch,
        TEST_DIM, web_client, web_response,
    };

    const D7_QUESTION: &str = "Какие документы нужны для визы D7?";
    const D7_ANSWER: &str = "Паспорт, подтверждение пассивного дохода, страховка, жильё.";

    struct Fixture {
        db: DeskDbPool,
        embedder: Arc<KeywordEmbedder>,
        provider: Arc<ScriptedAnswerer>,
        answerer: RetrievalAugmentedAnswerer,
    }

    async fn fixture(confidence: f32) -> Fixture {
        let db = create_test_desk_pool(TEST_DIM).await.unwrap();
        let embedder = Arc::new(KeywordEmbedder::new());
        let provider = Arc::new(ScriptedAnswerer::new("Ответ модели.", confidence));
        let answerer = RetrievalAugmentedAnswerer::new(
            KnowledgeStore::new(db.clone(), embedder.clone()),
            ConversationHistory::new(db.clone()),
            provider.clone(),
        );
        Fixture {
            db,
            embedder,
            provider,
            answerer,
        }
    }

    #[tokio::test]
    async fn test_greeting_short_circuits() {
        let f = fixture(0.9).await;
        let outcome = f
            .answerer
            .answer("Привет!", 1, AnswerOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.kind, AnswerKind::Greeting);
        assert_eq!(outcome.confidence, 1.0);
        assert!(outcome.sources.is_empty());
        assert_eq!(outcome.answer, user::greeting(Locale::Ru));
        assert_eq!(f.provider.calls(), 0);
        assert_eq!(f.embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_acknowledgement_gets_closing() {
        let f = fixture(0.9).await;
        let outcome = f
            .answerer
            .answer("thanks, got it", 1, AnswerOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.kind, AnswerKind::Closing);
        assert_eq!(outcome.answer, user::closing(Locale::En));
        assert_eq!(f.provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_knowledge_floor_raises_confidence() {
        let f = fixture(0.3).await;
        f.answerer
            .knowledge()
            .upsert(D7_QUESTION, D7_ANSWER, KnowledgeSource::Admin, true)
            .await
            .unwrap();

        let outcome = f
            .answerer
            .answer(D7_QUESTION, 1, AnswerOptions::default())
            .await
            .unwrap();

        assert!(outcome.confidence >= KNOWLEDGE_CONFIDENCE_FLOOR);
        assert_eq!(outcome.sources.len(), 1);
        assert_eq!(outcome.sources[0].answer, D7_ANSWER);
        assert!(outcome.context_available());
        assert_eq!(outcome.question_embedding.as_ref().map(Vec::len), Some(TEST_DIM));

        let request = &f.provider.requests()[0];
        assert_eq!(request.knowledge.len(), 1);
        assert!(request.web_context.is_none());
    }

    #[tokio::test]
    async fn test_no_hits_searches_web_and_applies_web_floor() {
        let search = Arc::new(StaticSearch::ok(web_response()));
        let f = fixture(0.4).await;
        let answerer = f.answerer.clone().with_web_search(web_client(search.clone()));

        let outcome = answerer
            .answer("Сколько стоит страховка для ВНЖ?", 1, AnswerOptions::default())
            .await
            .unwrap();

        assert_eq!(search.calls(), 1);
        assert_eq!(outcome.confidence, WEB_CONFIDENCE_FLOOR);
        let web = outcome.sources.last().unwrap();
        assert_eq!(web.question, WEB_SOURCE_TITLE);
        assert_eq!(web.origin, SourceOrigin::WebSearch);
        assert!(web.answer.contains("passive income"));
        assert!(outcome.knowledge_entry_ids().is_empty());
        assert!(!outcome.context_available());
    }

    #[tokio::test]
    async fn test_hits_skip_web_unless_requested() {
        let search = Arc::new(StaticSearch::ok(web_response()));
        let f = fixture(0.9).await;
        f.answerer
            .knowledge()
            .upsert(D7_QUESTION, D7_ANSWER, KnowledgeSource::Admin, true)
            .await
            .unwrap();
        let answerer = f.answerer.clone().with_web_search(web_client(search.clone()));

        answerer
            .answer(D7_QUESTION, 1, AnswerOptions::default())
            .await
            .unwrap();
        assert_eq!(search.calls(), 0);

        let options = AnswerOptions {
            use_web_search: true,
            search_depth: SearchDepth::Advanced,
        };
        let outcome = answerer.answer(D7_QUESTION, 1, options).await.unwrap();
        assert_eq!(search.calls(), 1);
        assert_eq!(outcome.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_web_search_is_ignored() {
        let search = Arc::new(StaticSearch::failing());
        let f = fixture(0.4).await;
        let answerer = f.answerer.clone().with_web_search(web_client(search.clone()));

        let outcome = answerer
            .answer("Сколько стоит страховка?", 1, AnswerOptions::default())
            .await
            .unwrap();
        assert_eq!(search.calls(), 1);
        assert_eq!(outcome.confidence, 0.4);
        assert!(outcome.sources.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_no_knowledge() {
        let db = create_test_desk_pool(TEST_DIM).await.unwrap();
        let provider = Arc::new(ScriptedAnswerer::new("ok", 0.6));
        let answerer = RetrievalAugmentedAnswerer::new(
            KnowledgeStore::new(db.clone(), Arc::new(FailingEmbedder)),
            ConversationHistory::new(db),
            provider.clone(),
        );

        let outcome = answerer
            .answer(D7_QUESTION, 1, AnswerOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.confidence, 0.6);
        assert!(outcome.question_embedding.is_none());
        assert!(provider.requests()[0].knowledge.is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let db = create_test_desk_pool(TEST_DIM).await.unwrap();
        let answerer = RetrievalAugmentedAnswerer::new(
            KnowledgeStore::new(db.clone(), Arc::new(KeywordEmbedder::new())),
            ConversationHistory::new(db),
            Arc::new(FailingAnswerer),
        );
        let err = answerer
            .answer(D7_QUESTION, 1, AnswerOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AnswerError::Generation(_)));
    }

    #[tokio::test]
    async fn test_history_is_passed_to_provider() {
        let f = fixture(0.9).await;
        let user = UserRepository::get_or_create(f.db.pool(), &NewUser::new("u1"))
            .await
            .unwrap();
        let earlier =
            InteractionRepository::create_processing(f.db.pool(), user.id, "Что такое NIF?")
                .await
                .unwrap();
        InteractionRepository::mark_answered_by_automation(
            f.db.pool(),
            earlier.id,
            "Налоговый номер.",
            0.9,
        )
        .await
        .unwrap();

        f.answerer
            .answer("А где его получить?", user.id, AnswerOptions::default())
            .await
            .unwrap();

        let request = &f.provider.requests()[0];
        assert_eq!(request.history.len(), 1);
        assert_eq!(request.history[0].question, "Что такое NIF?");
        assert_eq!(request.history[0].answer, "Налоговый номер.");
    }

    #[test]
    fn test_apply_floor() {
        assert_eq!(apply_floor(0.3, Some(0.9), false), KNOWLEDGE_CONFIDENCE_FLOOR);
        assert_eq!(apply_floor(0.95, Some(0.9), true), 0.95);
        assert_eq!(apply_floor(0.3, Some(0.8), true), WEB_CONFIDENCE_FLOOR);
        assert_eq!(apply_floor(0.3, Some(0.7), false), 0.3);
        assert_eq!(apply_floor(1.4, None, false), 1.0);
    }
}
