//! imigra-db: SQLite + sqlite-vec persistence for the consulting desk.
//!
//! This crate provides database operations for:
//! - User profiles created on first contact
//! - Interaction records and their status lifecycle
//! - Escalation tickets awaiting an operator
//! - Knowledge entries with a cosine KNN index over verified rows

pub mod desk_db;
pub mod error;
pub mod interactions;
pub mod knowledge;
mod sqlite_runtime;
pub mod tickets;
pub mod users;

// Re-export commonly used types
pub use desk_db::DeskDbPool;
pub use error::{DbError, DbResult};
pub use interactions::{
    Interaction, InteractionRepository, InteractionStatus, STALE_PROCESSING_SECS,
};
pub use knowledge::{KnowledgeEntry, KnowledgeMatch, KnowledgeRepository, KnowledgeSource};
pub use tickets::{EscalationTicket, PendingTicket, TicketRepository};
pub use users::{NewUser, UserProfile, UserRepository};

// Re-export test helpers when running tests or when test-helpers feature is enabled
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
