//! Verified Q&A pairs with nearest-neighbour lookup.
//!
//! Rows and the vector index live in `imigra-db`; this layer adds the
//! embedding capability, the configured search bounds and the
//! exact-text upsert rule.

use std::sync::Arc;

use imigra_db::{DbError, DeskDbPool, KnowledgeEntry, KnowledgeRepository, KnowledgeSource};
use tracing::{debug, info};

use crate::providers::{EmbeddingProvider, ProviderError};

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] ProviderError),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    EmbeddingDimMismatch { expected: usize, actual: usize },

    #[error("question must not be empty")]
    EmptyQuestion,
}

/// A knowledge entry with its similarity (`1 - cosine distance`) to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarEntry {
    pub entry: KnowledgeEntry,
    pub similarity: f32,
}

/// Search bounds applied by [`KnowledgeStore::find_similar_text`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalBounds {
    pub top_k: usize,
    pub max_distance: f32,
}

impl Default for RetrievalBounds {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_distance: 0.4,
        }
    }
}

#[derive(Clone)]
pub struct KnowledgeStore {
    db: DeskDbPool,
    embedder: Arc<dyn EmbeddingProvider>,
    bounds: RetrievalBounds,
}

impl KnowledgeStore {
    pub fn new(db: DeskDbPool, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            db,
            embedder,
            bounds: RetrievalBounds::default(),
        }
    }

    pub fn with_bounds(mut self, bounds: RetrievalBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn bounds(&self) -> RetrievalBounds {
        self.bounds
    }

    pub fn embedding_dim(&self) -> usize {
        self.db.embedding_dim()
    }

    /// Embed a text and check the vector against the index dimension.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError> {
        let embedding = self.embedder.embed(text).await?;
        self.check_dimension(&embedding)?;
        Ok(embedding)
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), KnowledgeError> {
        let expected = self.db.embedding_dim();
        if embedding.len() != expected {
            return Err(KnowledgeError::EmbeddingDimMismatch {
                expected,
                actual: embedding.len(),
            });
        }
        Ok(())
    }

    /// Up to `k` verified entries closest to `query_embedding`, nearest
    /// first, none farther than `max_distance`.
    pub async fn find_similar(
        &self,
        query_embedding: &[f32],
        k: usize,
        max_distance: f32,
    ) -> Result<Vec<SimilarEntry>, KnowledgeError> {
        self.check_dimension(query_embedding)?;
        let matches =
            KnowledgeRepository::nearest(self.db.pool(), query_embedding, k, max_distance).await?;

        debug!(
            hits = matches.len(),
            k,
            max_distance,
            "knowledge search finished"
        );

        Ok(matches
            .into_iter()
            .map(|m| SimilarEntry {
                similarity: 1.0 - m.distance,
                entry: m.entry,
            })
            .collect())
    }

    /// Embed `question` and search with the configured bounds.
    pub async fn find_similar_text(
        &self,
        question: &str,
    ) -> Result<Vec<SimilarEntry>, KnowledgeError> {
        let embedding = self.embed(question).await?;
        self.find_similar(&embedding, self.bounds.top_k, self.bounds.max_distance)
            .await
    }

    /// Store a Q&A pair. An entry with the exact same question text is
    /// updated in place and keeps its embedding; otherwise the question is
    /// embedded and inserted.
    pub async fn upsert(
        &self,
        question: &str,
        answer: &str,
        source: KnowledgeSource,
        verified: bool,
    ) -> Result<KnowledgeEntry, KnowledgeError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(KnowledgeError::EmptyQuestion);
        }
        let pool = self.db.pool();

        if let Some(existing) = KnowledgeRepository::find_by_question(pool, question).await? {
            let entry =
                KnowledgeRepository::update_in_place(pool, existing.id, answer, source, verified)
                    .await?;
            info!(entry_id = entry.id, %source, "knowledge entry updated");
            return Ok(entry);
        }

        let embedding = self.embed(question).await?;
        let entry =
            KnowledgeRepository::insert(pool, question, answer, &embedding, source, verified)
                .await?;
        info!(entry_id = entry.id, %source, verified, "knowledge entry added");
        Ok(entry)
    }

    /// Count one more use of each entry that backed an automated answer.
    pub async fn record_usage(&self, entry_ids: &[i64]) -> Result<(), KnowledgeError> {
        KnowledgeRepository::increment_usage(self.db.pool(), entry_ids).await?;
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Option<KnowledgeEntry>, KnowledgeError> {
        Ok(KnowledgeRepository::get_by_id(self.db.pool(), id).await?)
    }

    pub async fn count(&self) -> Result<i64, KnowledgeError> {
        Ok(KnowledgeRepository::count(self.db.pool()).await?)
    }
}
