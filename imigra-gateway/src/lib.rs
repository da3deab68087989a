//! imigra-gateway: the retrieval-augmented consulting desk.
//!
//! Questions flow through [`desk::DeskService`]: the answerer retrieves
//! similar verified Q&A pairs, recent history and optionally web results,
//! asks the model, and the escalation policy decides whether the reply is
//! sent or handed to an operator. Operator answers are written back to the
//! knowledge base.

pub mod answerer;
pub mod desk;
pub mod deterministic_messages;
pub mod escalation;
pub mod history;
pub mod knowledge;
pub mod providers;
pub mod seed;
pub mod server;
pub mod state;
pub mod text;
pub mod web;

#[cfg(test)]
mod test_support;

pub use answerer::{AnswerError, AnswerOptions, AnswerOutcome, RetrievalAugmentedAnswerer};
pub use desk::{DeskError, DeskOutcome, DeskService, RecordedAnswer};
pub use escalation::should_escalate;
pub use history::ConversationHistory;
pub use knowledge::{KnowledgeError, KnowledgeStore};
pub use providers::provider::ProviderError;
pub use state::AppState;
