use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;

/// Read-only lookups against the user subsystem's table: the messaging core
/// needs display info and existence checks, nothing more.
pub struct UserDirectory;

impl UserDirectory {
    pub async fn get(db: &Pool<Postgres>, user_id: Uuid) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, avatar_url, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound)
    }

    pub async fn exists(db: &Pool<Postgres>, user_id: Uuid) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT 1 AS present FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(db)
            .await?;
        Ok(row.is_some())
    }
}
