use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::conversation::Conversation;

/// Orders a member pair so that (a, b) and (b, a) address the same row.
pub fn normalize_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

const CONVERSATION_COLUMNS: &str =
    "id, user_a, user_b, last_message_preview, created_at, updated_at";

pub struct ConversationService;

impl ConversationService {
    /// Returns the conversation for the unordered pair, creating it on first
    /// contact. Concurrent first contacts race on the `(user_a, user_b)`
    /// unique index: the losing insert is a no-op and both callers read back
    /// the same row.
    pub async fn find_or_create(
        db: &Pool<Postgres>,
        a: Uuid,
        b: Uuid,
    ) -> Result<Conversation, AppError> {
        let (user_a, user_b) = normalize_pair(a, b);

        sqlx::query(
            "INSERT INTO conversations (id, user_a, user_b) VALUES ($1, $2, $3) \
             ON CONFLICT (user_a, user_b) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(user_a)
        .bind(user_b)
        .execute(db)
        .await?;

        let conversation = sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_a = $1 AND user_b = $2"
        ))
        .bind(user_a)
        .bind(user_b)
        .fetch_one(db)
        .await?;

        Ok(conversation)
    }

    pub async fn get(db: &Pool<Postgres>, id: Uuid) -> Result<Conversation, AppError> {
        sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound)
    }

    pub async fn is_member(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, AppError> {
        let row = sqlx::query(
            "SELECT 1 AS present FROM conversations \
             WHERE id = $1 AND (user_a = $2 OR user_b = $2) LIMIT 1",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(row.is_some())
    }

    /// Records the latest message preview and bumps recency. Called once per
    /// persisted message; the caller treats failure as non-fatal metadata.
    pub async fn touch(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        preview: &str,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE conversations SET last_message_preview = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(conversation_id)
        .bind(preview)
        .execute(db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    /// All conversations the user belongs to, most recently active first.
    pub async fn list_for_user(
        db: &Pool<Postgres>,
        user_id: Uuid,
    ) -> Result<Vec<Conversation>, AppError> {
        let rows = sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE user_a = $1 OR user_b = $1 \
             ORDER BY updated_at DESC"
        ))
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }
}
