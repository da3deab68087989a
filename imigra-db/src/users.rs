//! User profiles, created lazily on first contact.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};

/// User record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    /// Platform identifier (e.g. a messenger user id)
    pub external_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: i64,
}

impl UserProfile {
    /// Human readable name for operator notifications.
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if full.is_empty() {
            self.username
                .clone()
                .unwrap_or_else(|| self.external_id.clone())
        } else {
            full
        }
    }
}

/// Attributes supplied by the transport on first contact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub external_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl NewUser {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            ..Default::default()
        }
    }
}

/// User repository for database operations
pub struct UserRepository;

impl UserRepository {
    /// Get or create a user by external id.
    ///
    /// Existing profiles are returned unchanged.
    pub async fn get_or_create(pool: &SqlitePool, user: &NewUser) -> DbResult<UserProfile> {
        if let Some(existing) = Self::get_by_external_id(pool, &user.external_id).await? {
            debug!("Found existing user: {}", user.external_id);
            return Ok(existing);
        }

        let now = Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO users (external_id, username, first_name, last_name, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(external_id) DO NOTHING",
        )
        .bind(&user.external_id)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(now)
        .execute(pool)
        .await?;

        info!("Created new user: {}", user.external_id);

        Self::get_by_external_id(pool, &user.external_id)
            .await?
            .ok_or_else(|| DbError::UserNotFound(user.external_id.clone()))
    }

    /// Get user by internal id
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> DbResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, external_id, username, first_name, last_name, created_at
             FROM users
             WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(UserProfile::from))
    }

    /// Get user by platform identifier
    pub async fn get_by_external_id(
        pool: &SqlitePool,
        external_id: &str,
    ) -> DbResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, external_id, username, first_name, last_name, created_at
             FROM users
             WHERE external_id = ?",
        )
        .bind(external_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(UserProfile::from))
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    external_id: String,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    created_at: i64,
}

impl From<UserRow> for UserProfile {
    fn from(row: UserRow) -> Self {
        UserProfile {
            id: row.id,
            external_id: row.external_id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::create_test_desk_pool;

    #[tokio::test]
    async fn test_get_or_create_is_lazy_and_stable() {
        let db = create_test_desk_pool(4).await.unwrap();
        let pool = db.pool();

        let new_user = NewUser {
            external_id: "tg-1".to_string(),
            username: Some("maria".to_string()),
            first_name: Some("Maria".to_string()),
            last_name: None,
        };
        let created = UserRepository::get_or_create(pool, &new_user).await.unwrap();
        assert_eq!(created.external_id, "tg-1");
        assert_eq!(created.display_name(), "Maria");

        let renamed = NewUser {
            first_name: Some("Other".to_string()),
            ..new_user
        };
        let again = UserRepository::get_or_create(pool, &renamed).await.unwrap();
        assert_eq!(again.id, created.id);
        assert_eq!(again.first_name.as_deref(), Some("Maria"));

        let by_id = UserRepository::get_by_id(pool, created.id).await.unwrap();
        assert_eq!(by_id, Some(created));
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut user = UserProfile {
            id: 1,
            external_id: "42".to_string(),
            username: None,
            first_name: None,
            last_name: None,
            created_at: 0,
        };
        assert_eq!(user.display_name(), "42");
        user.username = Some("joao".to_string());
        assert_eq!(user.display_name(), "joao");
        user.first_name = Some("João".to_string());
        user.last_name = Some("Silva".to_string());
        assert_eq!(user.display_name(), "João Silva");
    }
}
