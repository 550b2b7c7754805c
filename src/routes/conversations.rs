use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::conversation::Conversation;
use crate::services::chat_service::{ChatService, ConversationSummary};
use crate::services::user_directory::UserDirectory;
use crate::state::AppState;
use crate::websocket::events::{self, ServerEvent};

pub async fn list_conversations(
    State(state): State<AppState>,
    user: User,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    let summaries = ChatService::list_conversations(&state.db, user.id).await?;
    Ok(Json(summaries))
}

#[derive(Debug, Deserialize)]
pub struct StartConversationRequest {
    pub recipient_id: Uuid,
}

pub async fn start_conversation(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<StartConversationRequest>,
) -> Result<Json<Conversation>, AppError> {
    if !UserDirectory::exists(&state.db, body.recipient_id).await? {
        return Err(AppError::NotFound);
    }

    let conversation =
        ChatService::get_or_create_conversation(&state.db, user.id, body.recipient_id).await?;
    Ok(Json(conversation))
}

/// Flips the caller's unread messages and tells the room, so the other
/// side's client can update its delivery ticks.
pub async fn mark_as_read(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    ChatService::mark_conversation_read(&state.db, conversation_id, user.id).await?;

    events::broadcast_to_room(
        &state.rooms,
        &state.redis,
        state.instance_id,
        conversation_id,
        &ServerEvent::MessagesRead {
            conversation_id,
            user_id: user.id,
        },
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
