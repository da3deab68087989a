//! Deterministic fakes for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::providers::{
    AnswerProvider, AnswerRequest, EmbeddingProvider, GeneratedAnswer, ProviderError,
};
use crate::web::search::{
    SearchError, SearchProvider, WebSearchClient, WebSearchQuery, WebSearchResponse,
    WebSearchResult,
};

pub const TEST_DIM: usize = 32;

/// Topic stems, one vector dimension each. The first matching stem wins.
const TOPICS: &[&[&str]] = &[
    &["виз", "visa", "visto"],
    &["d7"],
    &["документ", "document"],
    &["nif"],
    &["nhr"],
    &["налог", "tax"],
    &["внж", "residen"],
    &["отказ", "refus", "recus"],
    &["депорт", "deport"],
    &["суд", "court", "tribunal"],
    &["апелляц", "appeal"],
    &["продл", "renew"],
    &["доход", "income"],
    &["страхов", "insurance"],
    &["гражданств", "citizenship"],
    &["семь", "family"],
];

/// Embeds by topic: shared topic stems dominate, other words add a small
/// hashed component. Paraphrases of the same topic land close together.
#[derive(Debug, Default)]
pub struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn keyword_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; TEST_DIM];
    let hashed = TEST_DIM - TOPICS.len() - 1;
    for token in crate::text::tokens(text) {
        let topic = TOPICS
            .iter()
            .position(|stems| stems.iter().any(|stem| token.starts_with(stem)));
        match topic {
            Some(idx) => vector[idx] += 1.0,
            None => vector[TOPICS.len() + (fnv1a(&token) % hashed as u64) as usize] += 0.1,
        }
    }
    vector[TEST_DIM - 1] = 0.01;
    vector
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x100000001b3)
    })
}

#[async_trait::async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model(&self) -> &str {
        "keyword-test"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(keyword_embedding(text))
    }
}

pub struct FailingEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model(&self) -> &str {
        "failing"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::ApiError {
            status: 503,
            message: "embedding backend unavailable".to_string(),
        })
    }
}

/// Returns a fixed answer and remembers every request it saw.
pub struct ScriptedAnswerer {
    answer: String,
    confidence: f32,
    requests: Mutex<Vec<AnswerRequest>>,
}

impl ScriptedAnswerer {
    pub fn new(answer: impl Into<String>, confidence: f32) -> Self {
        Self {
            answer: answer.into(),
            confidence,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<AnswerRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl AnswerProvider for ScriptedAnswerer {
    async fn generate(&self, request: &AnswerRequest) -> Result<GeneratedAnswer, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(GeneratedAnswer {
            answer: self.answer.clone(),
            confidence: self.confidence,
        })
    }
}

pub struct FailingAnswerer;

#[async_trait::async_trait]
impl AnswerProvider for FailingAnswerer {
    async fn generate(&self, _request: &AnswerRequest) -> Result<GeneratedAnswer, ProviderError> {
        Err(ProviderError::ApiError {
            status: 500,
            message: "model overloaded".to_string(),
        })
    }
}

/// Search backend returning one canned response and counting calls.
pub struct StaticSearch {
    response: Result<WebSearchResponse, ()>,
    calls: AtomicUsize,
}

impl StaticSearch {
    pub fn ok(response: WebSearchResponse) -> Self {
        Self {
            response: Ok(response),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: Err(()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, _query: &WebSearchQuery) -> Result<WebSearchResponse, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone().map_err(|_| SearchError::Timeout)
    }
}

pub fn web_client(search: Arc<StaticSearch>) -> Arc<WebSearchClient> {
    let provider: Arc<dyn SearchProvider> = search;
    Arc::new(WebSearchClient::new(provider, Duration::from_secs(3600), 16))
}

/// One-result response about the D7 visa.
pub fn web_response() -> WebSearchResponse {
    WebSearchResponse {
        answer: Some("D7 requires proof of passive income.".to_string()),
        results: vec![WebSearchResult {
            title: "AIMA".to_string(),
            url: "https://aima.gov.pt".to_string(),
            content: Some("Residence visa for retirees.".to_string()),
        }],
    }
}
