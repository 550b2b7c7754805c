use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::message::Message;

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 100;

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, text, image_url, is_read, created_at";

pub struct MessageService;

impl MessageService {
    /// Persists one message. The creation timestamp comes from the database,
    /// never from the client, so the conversation's order is decided at the
    /// storage layer. Rejects content where neither text nor image is present;
    /// no row is created in that case.
    pub async fn append(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        sender_id: Uuid,
        text: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<Message, AppError> {
        let text = text.map(str::trim).filter(|t| !t.is_empty());
        let image_url = image_url.map(str::trim).filter(|u| !u.is_empty());
        if text.is_none() && image_url.is_none() {
            return Err(AppError::Validation(
                "message must contain text or an image".into(),
            ));
        }

        let message = sqlx::query_as::<_, Message>(&format!(
            "INSERT INTO messages (id, conversation_id, sender_id, text, image_url) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(sender_id)
        .bind(text)
        .bind(image_url)
        .fetch_one(db)
        .await?;

        Ok(message)
    }

    /// One page of history, newest first. Sorting on `(created_at, id)` keeps
    /// pagination stable under concurrent appends even when two rows share a
    /// timestamp.
    pub async fn history(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, AppError> {
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        let offset = offset.max(0);

        let rows = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(conversation_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;

        Ok(rows)
    }

    /// Flips every unread message authored by someone other than the reader.
    /// Idempotent: a second call matches no rows. Returns how many rows
    /// flipped.
    pub async fn mark_read(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = TRUE \
             WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE",
        )
        .bind(conversation_id)
        .bind(reader_id)
        .execute(db)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn count_unread(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        for_user: Uuid,
    ) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages \
             WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE",
        )
        .bind(conversation_id)
        .bind(for_user)
        .fetch_one(db)
        .await?;
        Ok(count)
    }

    /// Unread total across every conversation the user belongs to, for the
    /// global badge.
    pub async fn total_unread(db: &Pool<Postgres>, user_id: Uuid) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages m \
             JOIN conversations c ON c.id = m.conversation_id \
             WHERE (c.user_a = $1 OR c.user_b = $1) \
               AND m.sender_id <> $1 AND m.is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(db)
        .await?;
        Ok(count)
    }
}
