//! Interaction records: one row per incoming question.
//!
//! Lifecycle: `processing → answered`, `processing → escalated`,
//! `escalated → answered`. Nothing leaves `answered`.
//!
//! Operators answer `escalated` records, and `processing` records older than
//! [`STALE_PROCESSING_SECS`] (left behind when generation failed). A fresh
//! `processing` record still belongs to the automated flow.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};

/// Age after which a `processing` record is considered abandoned.
pub const STALE_PROCESSING_SECS: i64 = 300;

/// Interaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionStatus {
    Processing,
    Answered,
    Escalated,
}

impl InteractionStatus {
    pub fn can_transition_to(self, next: InteractionStatus) -> bool {
        matches!(
            (self, next),
            (InteractionStatus::Processing, InteractionStatus::Answered)
                | (InteractionStatus::Processing, InteractionStatus::Escalated)
                | (InteractionStatus::Escalated, InteractionStatus::Answered)
        )
    }
}

impl fmt::Display for InteractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionStatus::Processing => write!(f, "processing"),
            InteractionStatus::Answered => write!(f, "answered"),
            InteractionStatus::Escalated => write!(f, "escalated"),
        }
    }
}

impl std::str::FromStr for InteractionStatus {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(InteractionStatus::Processing),
            "answered" => Ok(InteractionStatus::Answered),
            "escalated" => Ok(InteractionStatus::Escalated),
            _ => Err(DbError::Serialization(format!(
                "Invalid interaction status: {}",
                s
            ))),
        }
    }
}

/// Interaction record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: i64,
    pub user_id: i64,
    pub question_text: String,
    pub embedding: Option<Vec<f32>>,
    pub answer_text: Option<String>,
    pub confidence_score: Option<f32>,
    pub answered_by_automation: bool,
    pub answered_by_operator_id: Option<String>,
    pub status: InteractionStatus,
    pub created_at: i64,
    pub answered_at: Option<i64>,
}

impl Interaction {
    /// Whether an operator may answer this record at `now` (unix seconds).
    pub fn accepts_operator_answer(&self, now: i64) -> bool {
        match self.status {
            InteractionStatus::Escalated => true,
            InteractionStatus::Processing => now - self.created_at >= STALE_PROCESSING_SECS,
            InteractionStatus::Answered => false,
        }
    }
}

/// Interaction repository for database operations
pub struct InteractionRepository;

const SELECT_COLUMNS: &str = "SELECT id, user_id, question_text, embedding, answer_text, \
     confidence_score, answered_by_automation, answered_by_operator_id, status, created_at, \
     answered_at FROM interactions";

impl InteractionRepository {
    /// Record an incoming question in `processing` state.
    pub async fn create_processing(
        pool: &SqlitePool,
        user_id: i64,
        question_text: &str,
    ) -> DbResult<Interaction> {
        let now = Utc::now().timestamp();
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO interactions (user_id, question_text, status, created_at)
             VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(user_id)
        .bind(question_text)
        .bind(InteractionStatus::Processing.to_string())
        .bind(now)
        .fetch_one(pool)
        .await?;

        debug!(interaction_id = id, user_id, "Created processing interaction");

        Self::require(pool, id).await
    }

    /// Get interaction by id
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> DbResult<Option<Interaction>> {
        let row = sqlx::query_as::<_, InteractionRow>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        row.map(Interaction::try_from).transpose()
    }

    async fn require(pool: &SqlitePool, id: i64) -> DbResult<Interaction> {
        Self::get_by_id(pool, id)
            .await?
            .ok_or(DbError::InteractionNotFound(id))
    }

    /// Store the question embedding computed while answering.
    pub async fn set_embedding(pool: &SqlitePool, id: i64, embedding: &[f32]) -> DbResult<()> {
        let payload = serde_json::to_string(embedding)?;
        let result = sqlx::query("UPDATE interactions SET embedding = ? WHERE id = ?")
            .bind(payload)
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::InteractionNotFound(id));
        }
        Ok(())
    }

    /// Finalize an automated answer (`processing → answered`).
    pub async fn mark_answered_by_automation(
        pool: &SqlitePool,
        id: i64,
        answer_text: &str,
        confidence: f32,
    ) -> DbResult<Interaction> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            "UPDATE interactions
             SET answer_text = ?, confidence_score = ?, answered_by_automation = 1,
                 status = 'answered', answered_at = ?
             WHERE id = ? AND status = 'processing'",
        )
        .bind(answer_text)
        .bind(confidence)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::transition_error(pool, id, InteractionStatus::Answered).await);
        }

        info!(interaction_id = id, confidence, "Interaction answered automatically");
        Self::require(pool, id).await
    }

    /// Hand the question to operators (`processing → escalated`).
    pub async fn mark_escalated(
        pool: &SqlitePool,
        id: i64,
        confidence: f32,
    ) -> DbResult<Interaction> {
        let result = sqlx::query(
            "UPDATE interactions
             SET confidence_score = ?, status = 'escalated'
             WHERE id = ? AND status = 'processing'",
        )
        .bind(confidence)
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::transition_error(pool, id, InteractionStatus::Escalated).await);
        }

        info!(interaction_id = id, confidence, "Interaction escalated");
        Self::require(pool, id).await
    }

    /// Check that an operator may answer `id` right now.
    pub async fn require_operator_answerable(pool: &SqlitePool, id: i64) -> DbResult<Interaction> {
        let interaction = Self::require(pool, id).await?;
        if interaction.accepts_operator_answer(Utc::now().timestamp()) {
            return Ok(interaction);
        }
        Err(Self::operator_rejection(&interaction))
    }

    /// Store an operator answer on an escalated or abandoned record.
    ///
    /// The guard is part of the UPDATE so two operators racing on the same
    /// question produce exactly one answer.
    pub async fn record_operator_answer(
        pool: &SqlitePool,
        id: i64,
        operator_id: &str,
        answer_text: &str,
    ) -> DbResult<Interaction> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            "UPDATE interactions
             SET answer_text = ?, answered_by_automation = 0, answered_by_operator_id = ?,
                 status = 'answered', answered_at = ?
             WHERE id = ?
               AND (status = 'escalated' OR (status = 'processing' AND created_at <= ?))",
        )
        .bind(answer_text)
        .bind(operator_id)
        .bind(now)
        .bind(id)
        .bind(now - STALE_PROCESSING_SECS)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return match Self::get_by_id(pool, id).await? {
                Some(current) => Err(Self::operator_rejection(&current)),
                None => Err(DbError::InteractionNotFound(id)),
            };
        }

        info!(interaction_id = id, operator_id, "Interaction answered by operator");
        Self::require(pool, id).await
    }

    fn operator_rejection(current: &Interaction) -> DbError {
        match current.status {
            InteractionStatus::Answered => DbError::AlreadyAnswered(current.id),
            status => DbError::InvalidTransition {
                from: status.to_string(),
                to: InteractionStatus::Answered.to_string(),
            },
        }
    }

    /// Most recent answered interactions of a user created at or after
    /// `since` (unix seconds), returned oldest first.
    pub async fn recent_answered(
        pool: &SqlitePool,
        user_id: i64,
        since: i64,
        limit: usize,
    ) -> DbResult<Vec<Interaction>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, InteractionRow>(&format!(
            "{SELECT_COLUMNS}
             WHERE user_id = ? AND status = 'answered' AND answer_text IS NOT NULL
               AND created_at >= ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?"
        ))
        .bind(user_id)
        .bind(since)
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;

        let mut interactions = rows
            .into_iter()
            .map(Interaction::try_from)
            .collect::<DbResult<Vec<_>>>()?;
        interactions.reverse();
        Ok(interactions)
    }

    async fn transition_error(pool: &SqlitePool, id: i64, to: InteractionStatus) -> DbError {
        match Self::get_by_id(pool, id).await {
            Ok(Some(current)) => DbError::InvalidTransition {
                from: current.status.to_string(),
                to: to.to_string(),
            },
            Ok(None) => DbError::InteractionNotFound(id),
            Err(err) => err,
        }
    }
}

#[derive(sqlx::FromRow)]
struct InteractionRow {
    id: i64,
    user_id: i64,
    question_text: String,
    embedding: Option<String>,
    answer_text: Option<String>,
    confidence_score: Option<f32>,
    answered_by_automation: i64,
    answered_by_operator_id: Option<String>,
    status: String,
    created_at: i64,
    answered_at: Option<i64>,
}

impl TryFrom<InteractionRow> for Interaction {
    type Error = DbError;

    fn try_from(row: InteractionRow) -> Result<Self, Self::Error> {
        let embedding = row
            .embedding
            .as_deref()
            .map(serde_json::from_str::<Vec<f32>>)
            .transpose()?;

        Ok(Interaction {
            id: row.id,
            user_id: row.user_id,
            question_text: row.question_text,
            embedding,
            answer_text: row.answer_text,
            confidence_score: row.confidence_score,
            answered_by_automation: row.answered_by_automation != 0,
            answered_by_operator_id: row.answered_by_operator_id,
            status: row.status.parse()?,
            created_at: row.created_at,
            answered_at: row.answered_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::create_test_desk_pool;
    use crate::users::{NewUser, UserRepository};

    async fn setup() -> (crate::DeskDbPool, i64) {
        let db = create_test_desk_pool(4).await.unwrap();
        let user = UserRepository::get_or_create(db.pool(), &NewUser::new("u1"))
            .await
            .unwrap();
        (db, user.id)
    }

    #[test]
    fn test_transition_table() {
        use InteractionStatus::*;
        assert!(Processing.can_transition_to(Answered));
        assert!(Processing.can_transition_to(Escalated));
        assert!(Escalated.can_transition_to(Answered));
        assert!(!Answered.can_transition_to(Escalated));
        assert!(!Answered.can_transition_to(Processing));
        assert!(!Escalated.can_transition_to(Processing));
    }

    #[tokio::test]
    async fn test_automation_answer_flow() {
        let (db, user_id) = setup().await;
        let pool = db.pool();

        let created = InteractionRepository::create_processing(pool, user_id, "Нужна ли виза?")
            .await
            .unwrap();
        assert_eq!(created.status, InteractionStatus::Processing);
        assert!(created.answer_text.is_none());

        InteractionRepository::set_embedding(pool, created.id, &[0.5, 0.5, 0.0, 0.0])
            .await
            .unwrap();

        let answered =
            InteractionRepository::mark_answered_by_automation(pool, created.id, "Да.", 0.9)
                .await
                .unwrap();
        assert_eq!(answered.status, InteractionStatus::Answered);
        assert!(answered.answered_by_automation);
        assert!(answered.answered_at.is_some());
        assert_eq!(answered.embedding, Some(vec![0.5, 0.5, 0.0, 0.0]));

        let err = InteractionRepository::mark_escalated(pool, created.id, 0.2)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::InvalidTransition { ref from, ref to } if from == "answered" && to == "escalated"
        ));
    }

    #[tokio::test]
    async fn test_operator_answer_only_once() {
        let (db, user_id) = setup().await;
        let pool = db.pool();

        let created = InteractionRepository::create_processing(pool, user_id, "Court appeal?")
            .await
            .unwrap();
        InteractionRepository::mark_escalated(pool, created.id, 0.3)
            .await
            .unwrap();

        let answered =
            InteractionRepository::record_operator_answer(pool, created.id, "op-1", "File it.")
                .await
                .unwrap();
        assert_eq!(answered.status, InteractionStatus::Answered);
        assert!(!answered.answered_by_automation);
        assert_eq!(answered.answered_by_operator_id.as_deref(), Some("op-1"));
        assert_eq!(answered.confidence_score, Some(0.3));

        let err = InteractionRepository::record_operator_answer(pool, created.id, "op-2", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::AlreadyAnswered(id) if id == created.id));

        let missing = InteractionRepository::record_operator_answer(pool, 9999, "op-1", "x")
            .await
            .unwrap_err();
        assert!(matches!(missing, DbError::InteractionNotFound(9999)));
    }

    #[tokio::test]
    async fn test_operator_cannot_answer_in_flight_question() {
        let (db, user_id) = setup().await;
        let pool = db.pool();

        let in_flight = InteractionRepository::create_processing(pool, user_id, "Нужен ли NIF?")
            .await
            .unwrap();
        let err = InteractionRepository::record_operator_answer(pool, in_flight.id, "op-1", "Да.")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::InvalidTransition { ref from, .. } if from == "processing"
        ));
        assert!(
            InteractionRepository::require_operator_answerable(pool, in_flight.id)
                .await
                .is_err()
        );

        // The automated flow still finishes normally.
        InteractionRepository::mark_answered_by_automation(pool, in_flight.id, "Да.", 0.9)
            .await
            .unwrap();

        // A record abandoned by a failed generation is answerable.
        let abandoned = InteractionRepository::create_processing(pool, user_id, "Нужен ли NHR?")
            .await
            .unwrap();
        sqlx::query("UPDATE interactions SET created_at = created_at - ? WHERE id = ?")
            .bind(STALE_PROCESSING_SECS + 1)
            .bind(abandoned.id)
            .execute(pool)
            .await
            .unwrap();
        InteractionRepository::require_operator_answerable(pool, abandoned.id)
            .await
            .unwrap();
        let answered =
            InteractionRepository::record_operator_answer(pool, abandoned.id, "op-1", "Нет.")
                .await
                .unwrap();
        assert_eq!(answered.status, InteractionStatus::Answered);
        assert!(!answered.answered_by_automation);
    }

    #[tokio::test]
    async fn test_recent_answered_window_and_order() {
        let (db, user_id) = setup().await;
        let pool = db.pool();

        let mut ids = Vec::new();
        for (idx, question) in ["q1", "q2", "q3", "q4"].iter().enumerate() {
            let row = InteractionRepository::create_processing(pool, user_id, question)
                .await
                .unwrap();
            InteractionRepository::mark_answered_by_automation(pool, row.id, "a", 0.9)
                .await
                .unwrap();
            // Spread creation times one hour apart, oldest first.
            sqlx::query("UPDATE interactions SET created_at = ? WHERE id = ?")
                .bind(10_000 + idx as i64 * 3600)
                .bind(row.id)
                .execute(pool)
                .await
                .unwrap();
            ids.push(row.id);
        }
        // Still processing: never part of the history.
        InteractionRepository::create_processing(pool, user_id, "pending")
            .await
            .unwrap();

        let recent = InteractionRepository::recent_answered(pool, user_id, 0, 3)
            .await
            .unwrap();
        let questions: Vec<_> = recent.iter().map(|i| i.question_text.as_str()).collect();
        assert_eq!(questions, vec!["q2", "q3", "q4"]);

        let windowed = InteractionRepository::recent_answered(pool, user_id, 10_000 + 2 * 3600, 3)
            .await
            .unwrap();
        assert_eq!(windowed.len(), 2);
        assert!(
            InteractionRepository::recent_answered(pool, user_id, 0, 0)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
