//! Knowledge base rows and their sqlite-vec index.
//!
//! Only verified entries have a row in `knowledge_vec`, keyed by entry id,
//! so every KNN hit is searchable by definition.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};

/// Where a knowledge entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeSource {
    Ai,
    Admin,
    Manual,
}

impl fmt::Display for KnowledgeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnowledgeSource::Ai => write!(f, "ai"),
            KnowledgeSource::Admin => write!(f, "admin"),
            KnowledgeSource::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for KnowledgeSource {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai" => Ok(KnowledgeSource::Ai),
            "admin" => Ok(KnowledgeSource::Admin),
            "manual" => Ok(KnowledgeSource::Manual),
            _ => Err(DbError::Serialization(format!(
                "Invalid knowledge source: {}",
                s
            ))),
        }
    }
}

/// Knowledge entry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: i64,
    pub question: String,
    pub answer: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub source: KnowledgeSource,
    pub verified: bool,
    pub usage_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Entry with its cosine distance to a query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeMatch {
    pub entry: KnowledgeEntry,
    pub distance: f32,
}

/// Knowledge repository for database operations
pub struct KnowledgeRepository;

const SELECT_COLUMNS: &str = "SELECT id, question, answer, embedding, source, verified, \
     usage_count, created_at, updated_at FROM knowledge_entries";

impl KnowledgeRepository {
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> DbResult<Option<KnowledgeEntry>> {
        let row = sqlx::query_as::<_, KnowledgeRow>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        row.map(KnowledgeEntry::try_from).transpose()
    }

    /// Exact question-text lookup.
    pub async fn find_by_question(
        pool: &SqlitePool,
        question: &str,
    ) -> DbResult<Option<KnowledgeEntry>> {
        let row =
            sqlx::query_as::<_, KnowledgeRow>(&format!("{SELECT_COLUMNS} WHERE question = ?"))
                .bind(question)
                .fetch_optional(pool)
                .await?;

        row.map(KnowledgeEntry::try_from).transpose()
    }

    /// Overwrite answer, source and verification of an existing entry.
    /// The stored embedding is kept.
    pub async fn update_in_place(
        pool: &SqlitePool,
        id: i64,
        answer: &str,
        source: KnowledgeSource,
        verified: bool,
    ) -> DbResult<KnowledgeEntry> {
        let now = Utc::now().timestamp();
        let mut tx = pool.begin().await?;

        let embedding: Option<(String,)> = sqlx::query_as(
            "UPDATE knowledge_entries
             SET answer = ?, source = ?, verified = ?, updated_at = ?
             WHERE id = ?
             RETURNING embedding",
        )
        .bind(answer)
        .bind(source.to_string())
        .bind(verified)
        .bind(now)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let (embedding,) = embedding.ok_or(DbError::KnowledgeEntryNotFound(id))?;
        sync_vector(&mut tx, id, verified, &embedding).await?;
        tx.commit().await?;

        debug!(entry_id = id, %source, verified, "Knowledge entry updated in place");

        Self::get_by_id(pool, id)
            .await?
            .ok_or(DbError::KnowledgeEntryNotFound(id))
    }

    /// Insert a new entry, or update the row that won a concurrent insert of
    /// the same question text. The embedding of an existing row is kept.
    pub async fn insert(
        pool: &SqlitePool,
        question: &str,
        answer: &str,
        embedding: &[f32],
        source: KnowledgeSource,
        verified: bool,
    ) -> DbResult<KnowledgeEntry> {
        let now = Utc::now().timestamp();
        let payload = serde_json::to_string(embedding)?;
        let mut tx = pool.begin().await?;

        let (id, stored_embedding): (i64, String) = sqlx::query_as(
            "INSERT INTO knowledge_entries
                 (question, answer, embedding, source, verified, usage_count, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 0, ?, ?)
             ON CONFLICT(question) DO UPDATE SET
                 answer = excluded.answer,
                 source = excluded.source,
                 verified = excluded.verified,
                 updated_at = excluded.updated_at
             RETURNING id, embedding",
        )
        .bind(question)
        .bind(answer)
        .bind(&payload)
        .bind(source.to_string())
        .bind(verified)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sync_vector(&mut tx, id, verified, &stored_embedding).await?;
        tx.commit().await?;

        debug!(entry_id = id, %source, verified, "Knowledge entry stored");

        Self::get_by_id(pool, id)
            .await?
            .ok_or(DbError::KnowledgeEntryNotFound(id))
    }

    /// K nearest verified entries by cosine distance, ascending, dropping
    /// anything farther than `max_distance`.
    pub async fn nearest(
        pool: &SqlitePool,
        embedding: &[f32],
        k: usize,
        max_distance: f32,
    ) -> DbResult<Vec<KnowledgeMatch>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let payload = serde_json::to_string(embedding)?;

        let rows = sqlx::query_as::<_, MatchRow>(
            r#"WITH knn AS (
                   SELECT rowid, distance
                   FROM knowledge_vec
                   WHERE embedding MATCH ? AND k = ?
               )
               SELECT e.id, e.question, e.answer, e.embedding, e.source, e.verified,
                      e.usage_count, e.created_at, e.updated_at, knn.distance
               FROM knn
               JOIN knowledge_entries e ON e.id = knn.rowid
               WHERE e.verified = 1 AND knn.distance <= ?
               ORDER BY knn.distance ASC
               LIMIT ?"#,
        )
        .bind(payload)
        .bind(k as i64)
        .bind(max_distance)
        .bind(k as i64)
        .fetch_all(pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(KnowledgeMatch {
                    distance: row.distance,
                    entry: KnowledgeEntry::try_from(row.entry)?,
                })
            })
            .collect()
    }

    /// Increment `usage_count` of the given entries.
    pub async fn increment_usage(pool: &SqlitePool, ids: &[i64]) -> DbResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut tx = pool.begin().await?;
        for id in ids {
            sqlx::query("UPDATE knowledge_entries SET usage_count = usage_count + 1 WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn count(pool: &SqlitePool) -> DbResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM knowledge_entries")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}

async fn sync_vector(
    conn: &mut SqliteConnection,
    id: i64,
    verified: bool,
    embedding_json: &str,
) -> DbResult<()> {
    // vec0 has no upsert; replace the row explicitly.
    sqlx::query("DELETE FROM knowledge_vec WHERE rowid = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if verified {
        sqlx::query("INSERT INTO knowledge_vec(rowid, embedding) VALUES (?, ?)")
            .bind(id)
            .bind(embedding_json)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

#[derive(sqlx::FromRow)]
struct KnowledgeRow {
    id: i64,
    question: String,
    answer: String,
    embedding: String,
    source: String,
    verified: bool,
    usage_count: i64,
    created_at: i64,
    updated_at: i64,
}

#[derive(sqlx::FromRow)]
struct MatchRow {
    #[sqlx(flatten)]
    entry: KnowledgeRow,
    distance: f32,
}

impl TryFrom<KnowledgeRow> for KnowledgeEntry {
    type Error = DbError;

    fn try_from(row: KnowledgeRow) -> Result<Self, Self::Error> {
        Ok(KnowledgeEntry {
            id: row.id,
            question: row.question,
            answer: row.answer,
            embedding: serde_json::from_str(&row.embedding)?,
            source: row.source.parse()?,
            verified: row.verified,
            usage_count: row.usage_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
