//! Database error types.

/// Database operation errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// SQL error from sqlx
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// User not found
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Interaction not found
    #[error("Interaction not found: {0}")]
    InteractionNotFound(i64),

    /// Knowledge entry not found
    #[error("Knowledge entry not found: {0}")]
    KnowledgeEntryNotFound(i64),

    /// Invalid status transition
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Interaction already carries a final answer
    #[error("Interaction {0} is already answered")]
    AlreadyAnswered(i64),

    /// Stored embedding dimension differs from the configured one
    #[error("Embedding dimension mismatch: database has {stored}, configured {configured}")]
    DimensionMismatch { stored: usize, configured: usize },

    /// Embedding dimension must be positive
    #[error("Invalid embedding dimension: {0}")]
    InvalidDimension(usize),

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Config directory not found
    #[error("Config/data directory not found")]
    NoConfigDir,

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite vec initialization error
    #[error("SQLite-vec initialization error: {0}")]
    SqliteVec(String),
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

/// Result type alias for database operations
pub type DbResult<T> = Result<T, DbError>;
