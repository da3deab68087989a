//! The consulting desk: end-to-end handling of user questions and of
//! operator answers.

use imigra_db::{
    DbError, DeskDbPool, EscalationTicket, Interaction, InteractionRepository, KnowledgeEntry,
    KnowledgeSource, NewUser, PendingTicket, TicketRepository, UserRepository,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::answerer::{AnswerError, AnswerOptions, AnswerSource, RetrievalAugmentedAnswerer};
use crate::deterministic_messages::{Locale, operator, user};
use crate::escalation::{self, EscalationRule};
use crate::knowledge::{KnowledgeError, KnowledgeStore};

const DEFAULT_PENDING_LIMIT: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error(transparent)]
    Generation(#[from] AnswerError),

    #[error("knowledge base update failed: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("question must not be empty")]
    EmptyQuestion,
}

/// Result of handling one incoming question.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeskOutcome {
    Answered {
        interaction_id: i64,
        reply: String,
        confidence: f32,
        sources: Vec<AnswerSource>,
    },
    Escalated {
        interaction_id: i64,
        /// Notice sent to the user while operators work on it
        reply: String,
        confidence: f32,
        ticket: EscalationTicket,
        /// Text to forward to every operator
        operator_notification: String,
        #[serde(skip)]
        rule: EscalationRule,
    },
}

impl DeskOutcome {
    pub fn interaction_id(&self) -> i64 {
        match self {
            DeskOutcome::Answered { interaction_id, .. }
            | DeskOutcome::Escalated { interaction_id, .. } => *interaction_id,
        }
    }

    pub fn reply(&self) -> &str {
        match self {
            DeskOutcome::Answered { reply, .. } | DeskOutcome::Escalated { reply, .. } => reply,
        }
    }

    pub fn is_escalated(&self) -> bool {
        matches!(self, DeskOutcome::Escalated { .. })
    }
}

/// An operator answer after it was stored.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedAnswer {
    pub interaction: Interaction,
    /// Who should receive the answer
    pub user_external_id: String,
    pub knowledge_entry: KnowledgeEntry,
    pub ticket_closed: bool,
}

#[derive(Clone)]
pub struct DeskService {
    db: DeskDbPool,
    answerer: RetrievalAugmentedAnswerer,
    confidence_threshold: f32,
    pending_limit: usize,
}

impl DeskService {
    pub fn new(
        db: DeskDbPool,
        answerer: RetrievalAugmentedAnswerer,
        confidence_threshold: f32,
    ) -> Self {
        Self {
            db,
            answerer,
            confidence_threshold,
            pending_limit: DEFAULT_PENDING_LIMIT,
        }
    }

    pub fn with_pending_limit(mut self, limit: usize) -> Self {
        self.pending_limit = limit;
        self
    }

    pub fn knowledge(&self) -> &KnowledgeStore {
        self.answerer.knowledge()
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Answer a question or hand it to operators.
    ///
    /// The interaction is recorded as `processing` on arrival. When
    /// generation fails it stays there and the error is returned; the
    /// caller replies with [`user::technical_error`].
    pub async fn handle_question(
        &self,
        from: &NewUser,
        question: &str,
        options: AnswerOptions,
    ) -> Result<DeskOutcome, DeskError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DeskError::EmptyQuestion);
        }
        let pool = self.db.pool();

        let profile = UserRepository::get_or_create(pool, from).await?;
        let interaction =
            InteractionRepository::create_processing(pool, profile.id, question).await?;

        let outcome = match self.answerer.answer(question, profile.id, options).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    error = %err,
                    interaction_id = interaction.id,
                    "answer generation failed"
                );
                return Err(err.into());
            }
        };

        if let Some(embedding) = &outcome.question_embedding
            && let Err(err) =
                InteractionRepository::set_embedding(pool, interaction.id, embedding).await
        {
            warn!(
                error = %err,
                interaction_id = interaction.id,
                "failed to store question embedding"
            );
        }

        let decision = escalation::evaluate(
            question,
            outcome.confidence,
            self.confidence_threshold,
            outcome.context_available(),
        );

        if !decision.escalate {
            InteractionRepository::mark_answered_by_automation(
                pool,
                interaction.id,
                &outcome.answer,
                outcome.confidence,
            )
            .await?;

            let used = outcome.knowledge_entry_ids();
            if let Err(err) = self.answerer.knowledge().record_usage(&used).await {
                warn!(error = %err, "failed to record knowledge usage");
            }

            info!(
                interaction_id = interaction.id,
                confidence = outcome.confidence,
                rule = %decision.rule,
                "question answered automatically"
            );
            return Ok(DeskOutcome::Answered {
                interaction_id: interaction.id,
                reply: outcome.answer,
                confidence: outcome.confidence,
                sources: outcome.sources,
            });
        }

        InteractionRepository::mark_escalated(pool, interaction.id, outcome.confidence).await?;
        let ticket = TicketRepository::create(pool, interaction.id, &profile.external_id).await?;

        info!(
            interaction_id = interaction.id,
            ticket_id = ticket.id,
            confidence = outcome.confidence,
            rule = %decision.rule,
            "question escalated to operators"
        );

        Ok(DeskOutcome::Escalated {
            interaction_id: interaction.id,
            reply: user::escalation_notice(outcome.locale).to_string(),
            confidence: outcome.confidence,
            operator_notification: operator::escalated_question(
                interaction.id,
                &profile,
                question,
                outcome.confidence,
            ),
            ticket,
            rule: decision.rule,
        })
    }

    /// Store an operator's answer and teach it to the knowledge base.
    ///
    /// The question/answer pair is upserted as a verified admin entry, then
    /// the interaction becomes `answered` and its ticket is closed. When the
    /// upsert fails nothing else changes and the call can be retried.
    /// Answering an already answered question is rejected.
    pub async fn record_human_answer(
        &self,
        question_id: i64,
        operator_id: &str,
        answer: &str,
    ) -> Result<RecordedAnswer, DeskError> {
        let pool = self.db.pool();

        let pending = InteractionRepository::require_operator_answerable(pool, question_id).await?;
        let user_external_id = UserRepository::get_by_id(pool, pending.user_id)
            .await?
            .map(|profile| profile.external_id)
            .ok_or_else(|| DbError::UserNotFound(pending.user_id.to_string()))?;

        let knowledge_entry = self
            .answerer
            .knowledge()
            .upsert(&pending.question_text, answer, KnowledgeSource::Admin, true)
            .await
            .inspect_err(|err| {
                warn!(
                    error = %err,
                    interaction_id = question_id,
                    "operator answer not stored; question stays open"
                )
            })?;

        let interaction =
            InteractionRepository::record_operator_answer(pool, question_id, operator_id, answer)
                .await?;
        let ticket_closed = TicketRepository::delete_for_interaction(pool, question_id).await?;

        info!(
            interaction_id = question_id,
            operator_id,
            entry_id = knowledge_entry.id,
            "operator answer recorded"
        );

        Ok(RecordedAnswer {
            interaction,
            user_external_id,
            knowledge_entry,
            ticket_closed,
        })
    }

    /// Open tickets, oldest first.
    pub async fn pending_tickets(&self) -> Result<Vec<PendingTicket>, DeskError> {
        Ok(TicketRepository::list_pending(self.db.pool(), self.pending_limit).await?)
    }

    /// Remember which operator messages carry a ticket.
    pub async fn mark_forwarded(
        &self,
        ticket_id: i64,
        operator_message_ids: &[String],
    ) -> Result<(), DeskError> {
        TicketRepository::mark_forwarded(self.db.pool(), ticket_id, operator_message_ids).await?;
        Ok(())
    }

    /// Reply for a user whose question could not be processed.
    pub fn technical_error_reply(question: &str) -> &'static str {
        user::technical_error(Locale::detect(question))
    }
}
