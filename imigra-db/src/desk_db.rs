//! Desk database connection pool and initialization.

use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use tracing::info;

use crate::{
    error::{DbError, DbResult},
    sqlite_runtime::create_file_pool,
};

/// Name of the sqlite-vec table holding verified knowledge embeddings.
pub(crate) const KNOWLEDGE_VEC_TABLE: &str = "knowledge_vec";

/// Desk database pool wrapper
#[derive(Debug, Clone)]
pub struct DeskDbPool {
    pool: SqlitePool,
    embedding_dim: usize,
}

impl DeskDbPool {
    /// Open the database at its default location (or `path_override`).
    pub async fn new(path_override: Option<&Path>, embedding_dim: usize) -> DbResult<Self> {
        let db_path = match path_override {
            Some(path) => path.to_path_buf(),
            None => Self::db_path()?,
        };
        Self::open(&db_path, embedding_dim).await
    }

    /// Open (or create) a database file, run migrations and prepare the
    /// vector index for `embedding_dim`.
    ///
    /// Fails with [`DbError::DimensionMismatch`] when the file was created
    /// for another dimension.
    pub async fn open(db_path: &Path, embedding_dim: usize) -> DbResult<Self> {
        info!("Initializing desk database at: {}", db_path.display());

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let pool = create_file_pool(db_path, 5).await?;
        let db = Self::from_pool(pool, embedding_dim).await?;

        info!(embedding_dim, "Desk database initialized successfully");
        Ok(db)
    }

    /// Wrap an existing pool, running migrations and the dimension check.
    pub async fn from_pool(pool: SqlitePool, embedding_dim: usize) -> DbResult<Self> {
        Self::run_migrations(&pool).await?;
        ensure_vec_table(&pool, embedding_dim).await?;
        Ok(Self {
            pool,
            embedding_dim,
        })
    }

    /// Get the inner SQLx pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Vector width the knowledge index was created with.
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Default database file path
    pub fn db_path() -> DbResult<PathBuf> {
        let data_dir = dirs::data_dir().ok_or(DbError::NoConfigDir)?;
        Ok(data_dir.join("imigra").join("desk.sqlite3"))
    }

    async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
        sqlx::migrate!("./migrations/desk")
            .run(pool)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;

        info!("Desk database migrations completed");
        Ok(())
    }

    /// Close the pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn ensure_vec_table(pool: &SqlitePool, embedding_dim: usize) -> DbResult<()> {
    if embedding_dim == 0 {
        return Err(DbError::InvalidDimension(embedding_dim));
    }

    let existing: Option<(String,)> =
        sqlx::query_as("SELECT value FROM meta WHERE key = 'embedding_dim' LIMIT 1")
            .fetch_optional(pool)
            .await?;

    if let Some((value,)) = existing {
        let stored = value
            .parse::<usize>()
            .map_err(|e| DbError::Serialization(format!("invalid embedding_dim '{value}': {e}")))?;
        if stored != embedding_dim {
            return Err(DbError::DimensionMismatch {
                stored,
                configured: embedding_dim,
            });
        }
    }

    let create_sql = format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {KNOWLEDGE_VEC_TABLE} \
         USING vec0(embedding float[{embedding_dim}] distance_metric=cosine)"
    );
    sqlx::query(&create_sql).execute(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO meta (key, value) VALUES ('embedding_dim', ?)")
        .bind(embedding_dim.to_string())
        .execute(pool)
        .await?;

    Ok(())
}
