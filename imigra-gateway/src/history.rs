//! Recent answered exchanges of a user, used as conversational context.

use std::time::Duration;

use chrono::Utc;
use imigra_db::{DeskDbPool, InteractionRepository};
use tracing::{debug, warn};

use crate::providers::HistoryTurn;

#[derive(Clone)]
pub struct ConversationHistory {
    db: DeskDbPool,
}

impl ConversationHistory {
    pub fn new(db: DeskDbPool) -> Self {
        Self { db }
    }

    /// The last `limit` answered questions of `user_id` asked within
    /// `window`, oldest first. Store failures yield an empty history.
    pub async fn recent_turns(
        &self,
        user_id: i64,
        limit: usize,
        window: Duration,
    ) -> Vec<HistoryTurn> {
        let window_secs = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
        let since = Utc::now().timestamp().saturating_sub(window_secs);

        match InteractionRepository::recent_answered(self.db.pool(), user_id, since, limit).await
        {
            Ok(interactions) => {
                let turns: Vec<HistoryTurn> = interactions
                    .into_iter()
                    .filter_map(|interaction| {
                        interaction.answer_text.map(|answer| HistoryTurn {
                            question: interaction.question_text,
                            answer,
                        })
                    })
                    .collect();
                debug!(user_id, turns = turns.len(), "loaded conversation history");
                turns
            }
            Err(err) => {
                warn!(error = %err, user_id, "failed to load conversation history");
                Vec::new()
            }
        }
    }
}
