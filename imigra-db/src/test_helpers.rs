//! Test helpers for the desk database.

use crate::{desk_db::DeskDbPool, error::DbResult, sqlite_runtime::create_in_memory_pool};

/// Create a migrated in-memory desk database with a `dim`-wide vector index.
pub async fn create_test_desk_pool(dim: usize) -> DbResult<DeskDbPool> {
    let pool = create_in_memory_pool().await?;
    DeskDbPool::from_pool(pool, dim).await
}
