use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::conversation::Conversation;
use crate::models::message::Message;
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::MessageService;

pub const PREVIEW_MAX_CHARS: usize = 80;
pub const IMAGE_PREVIEW: &str = "Sent an image";

/// Display info for the other participant of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// One row of the conversation list: the thread, who it is with, and how
/// many of their messages are still unread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub peer: PeerInfo,
    pub last_message_preview: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub unread_count: i64,
}

/// Short snapshot of a message for conversation-list rendering and
/// notifications. Image-only messages get a fixed placeholder.
pub fn preview_for(text: Option<&str>, image_url: Option<&str>) -> String {
    match text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => {
            if t.chars().count() <= PREVIEW_MAX_CHARS {
                t.to_string()
            } else {
                let mut cut: String = t.chars().take(PREVIEW_MAX_CHARS).collect();
                cut.push('…');
                cut
            }
        }
        None if image_url.map(str::trim).filter(|u| !u.is_empty()).is_some() => {
            IMAGE_PREVIEW.to_string()
        }
        None => String::new(),
    }
}

pub struct ChatService;

impl ChatService {
    /// Looks up or lazily creates the conversation between two distinct
    /// users. Talking to yourself is rejected outright rather than creating
    /// a degenerate single-member pair.
    pub async fn get_or_create_conversation(
        db: &Pool<Postgres>,
        user_a: Uuid,
        user_b: Uuid,
    ) -> Result<Conversation, AppError> {
        if user_a == user_b {
            return Err(AppError::SelfConversation);
        }
        ConversationService::find_or_create(db, user_a, user_b).await
    }

    /// Persists a message and refreshes the conversation's preview/recency.
    /// The append is the authoritative action: a failure updating the
    /// preview afterwards is logged and the message is still returned as
    /// sent.
    pub async fn send_message(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        sender_id: Uuid,
        text: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<Message, AppError> {
        let conversation = ConversationService::get(db, conversation_id).await?;
        if !conversation.has_member(sender_id) {
            return Err(AppError::NotAMember);
        }

        let message =
            MessageService::append(db, conversation_id, sender_id, text, image_url).await?;

        let preview = preview_for(message.text.as_deref(), message.image_url.as_deref());
        if let Err(e) = ConversationService::touch(db, conversation_id, &preview).await {
            tracing::warn!(%conversation_id, error = %e, "failed to update conversation preview");
        }

        Ok(message)
    }

    /// Conversation summaries for one user, newest activity first. A single
    /// statement joins the peer's display row and the unread count so every
    /// summary carries a count consistent with the list itself.
    pub async fn list_conversations(
        db: &Pool<Postgres>,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id,
                   c.last_message_preview,
                   c.updated_at,
                   u.id AS peer_id,
                   u.username AS peer_username,
                   u.avatar_url AS peer_avatar_url,
                   (SELECT COUNT(*) FROM messages m
                     WHERE m.conversation_id = c.id
                       AND m.sender_id <> $1
                       AND m.is_read = FALSE) AS unread_count
            FROM conversations c
            JOIN users u ON u.id = CASE WHEN c.user_a = $1 THEN c.user_b ELSE c.user_a END
            WHERE c.user_a = $1 OR c.user_b = $1
            ORDER BY c.updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        let summaries = rows
            .into_iter()
            .map(|row| ConversationSummary {
                id: row.get("id"),
                peer: PeerInfo {
                    id: row.get("peer_id"),
                    username: row.get("peer_username"),
                    avatar_url: row.get("peer_avatar_url"),
                },
                last_message_preview: row.get("last_message_preview"),
                updated_at: row.get("updated_at"),
                unread_count: row.get("unread_count"),
            })
            .collect();

        Ok(summaries)
    }

    /// Chronological page of history. The store keeps newest-first order;
    /// the page is reversed here so consumers always read oldest to newest.
    pub async fn get_history(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, AppError> {
        let conversation = ConversationService::get(db, conversation_id).await?;
        if !conversation.has_member(user_id) {
            return Err(AppError::NotAMember);
        }

        let mut page = MessageService::history(db, conversation_id, limit, offset).await?;
        page.reverse();
        Ok(page)
    }

    pub async fn get_total_unread(db: &Pool<Postgres>, user_id: Uuid) -> Result<i64, AppError> {
        MessageService::total_unread(db, user_id).await
    }

    pub async fn mark_conversation_read(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), AppError> {
        let conversation = ConversationService::get(db, conversation_id).await?;
        if !conversation.has_member(user_id) {
            return Err(AppError::NotAMember);
        }

        MessageService::mark_read(db, conversation_id, user_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_keeps_short_text() {
        assert_eq!(preview_for(Some("hi"), None), "hi");
    }

    #[test]
    fn preview_trims_whitespace_before_deciding() {
        assert_eq!(preview_for(Some("   "), Some("http://img")), IMAGE_PREVIEW);
    }

    #[test]
    fn preview_truncates_long_text_on_char_boundary() {
        let long = "ä".repeat(200);
        let preview = preview_for(Some(&long), None);
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS + 1);
        assert!(preview.ends_with('…'));
    }

    #[test]
    fn image_only_message_gets_placeholder() {
        assert_eq!(preview_for(None, Some("http://img")), IMAGE_PREVIEW);
    }

    #[test]
    fn preview_of_exactly_max_chars_is_untouched() {
        let text = "a".repeat(PREVIEW_MAX_CHARS);
        assert_eq!(preview_for(Some(&text), None), text);
    }
}
