//! Escalation tickets for questions handed to human operators.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{DbError, DbResult};

/// Escalation ticket record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationTicket {
    pub id: i64,
    pub interaction_id: i64,
    pub user_external_id: String,
    pub forwarded_to_operators: bool,
    /// Platform message ids of the operator notifications
    pub operator_message_ids: Vec<String>,
    pub created_at: i64,
}

/// Ticket joined with the question it tracks, for operator listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTicket {
    pub ticket: EscalationTicket,
    pub question_text: String,
    pub confidence_score: Option<f32>,
}

/// Ticket repository for database operations
pub struct TicketRepository;

impl TicketRepository {
    /// Open a ticket for an escalated interaction.
    ///
    /// Idempotent per interaction: an existing ticket is returned as is.
    pub async fn create(
        pool: &SqlitePool,
        interaction_id: i64,
        user_external_id: &str,
    ) -> DbResult<EscalationTicket> {
        let now = Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO escalation_tickets (interaction_id, user_external_id, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(interaction_id) DO NOTHING",
        )
        .bind(interaction_id)
        .bind(user_external_id)
        .bind(now)
        .execute(pool)
        .await?;

        info!(interaction_id, "Escalation ticket opened");

        Self::get_by_interaction(pool, interaction_id)
            .await?
            .ok_or(DbError::InteractionNotFound(interaction_id))
    }

    pub async fn get_by_interaction(
        pool: &SqlitePool,
        interaction_id: i64,
    ) -> DbResult<Option<EscalationTicket>> {
        let row = sqlx::query_as::<_, TicketRow>(
            "SELECT id, interaction_id, user_external_id, forwarded_to_operators,
                    operator_message_ids, created_at
             FROM escalation_tickets
             WHERE interaction_id = ?",
        )
        .bind(interaction_id)
        .fetch_optional(pool)
        .await?;

        row.map(EscalationTicket::try_from).transpose()
    }

    /// Record that operators were notified, with their message ids.
    pub async fn mark_forwarded(
        pool: &SqlitePool,
        ticket_id: i64,
        operator_message_ids: &[String],
    ) -> DbResult<()> {
        let payload = serde_json::to_string(operator_message_ids)?;
        sqlx::query(
            "UPDATE escalation_tickets
             SET forwarded_to_operators = 1, operator_message_ids = ?
             WHERE id = ?",
        )
        .bind(payload)
        .bind(ticket_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Delete the ticket of an answered interaction. Returns whether one existed.
    pub async fn delete_for_interaction(pool: &SqlitePool, interaction_id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM escalation_tickets WHERE interaction_id = ?")
            .bind(interaction_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Open tickets, oldest first.
    pub async fn list_pending(pool: &SqlitePool, limit: usize) -> DbResult<Vec<PendingTicket>> {
        let rows = sqlx::query_as::<_, PendingRow>(
            "SELECT t.id, t.interaction_id, t.user_external_id, t.forwarded_to_operators,
                    t.operator_message_ids, t.created_at,
                    i.question_text, i.confidence_score
             FROM escalation_tickets t
             JOIN interactions i ON i.id = t.interaction_id
             ORDER BY t.created_at ASC, t.id ASC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(PendingTicket {
                    question_text: row.question_text,
                    confidence_score: row.confidence_score,
                    ticket: EscalationTicket::try_from(row.ticket)?,
                })
            })
            .collect()
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: i64,
    interaction_id: i64,
    user_external_id: String,
    forwarded_to_operators: i64,
    operator_message_ids: String,
    created_at: i64,
}

#[derive(sqlx::FromRow)]
struct PendingRow {
    #[sqlx(flatten)]
    ticket: TicketRow,
    question_text: String,
    confidence_score: Option<f32>,
}

impl TryFrom<TicketRow> for EscalationTicket {
    type Error = DbError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(EscalationTicket {
            id: row.id,
            interaction_id: row.interaction_id,
            user_external_id: row.user_external_id,
            forwarded_to_operators: row.forwarded_to_operators != 0,
            operator_message_ids: serde_json::from_str(&row.operator_message_ids)?,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interactions::InteractionRepository;
    use crate::test_helpers::create_test_desk_pool;
    use crate::users::{NewUser, UserRepository};

    #[tokio::test]
    async fn test_ticket_lifecycle() {
        let db = create_test_desk_pool(4).await.unwrap();
        let pool = db.pool();
        let user = UserRepository::get_or_create(pool, &NewUser::new("tg-7"))
            .await
            .unwrap();
        let interaction = InteractionRepository::create_processing(pool, user.id, "Отказ в визе")
            .await
            .unwrap();
        InteractionRepository::mark_escalated(pool, interaction.id, 0.4)
            .await
            .unwrap();

        let ticket = TicketRepository::create(pool, interaction.id, "tg-7")
            .await
            .unwrap();
        assert!(!ticket.forwarded_to_operators);
        assert!(ticket.operator_message_ids.is_empty());

        let same = TicketRepository::create(pool, interaction.id, "tg-7")
            .await
            .unwrap();
        assert_eq!(same.id, ticket.id);

        TicketRepository::mark_forwarded(pool, ticket.id, &["m1".to_string(), "m2".to_string()])
            .await
            .unwrap();

        let pending = TicketRepository::list_pending(pool, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].question_text, "Отказ в визе");
        assert_eq!(pending[0].confidence_score, Some(0.4));
        assert!(pending[0].ticket.forwarded_to_operators);
        assert_eq!(pending[0].ticket.operator_message_ids, vec!["m1", "m2"]);

        assert!(
            TicketRepository::delete_for_interaction(pool, interaction.id)
                .await
                .unwrap()
        );
        assert!(
            !TicketRepository::delete_for_interaction(pool, interaction.id)
                .await
                .unwrap()
        );
        assert!(TicketRepository::list_pending(pool, 10).await.unwrap().is_empty());
    }
}
