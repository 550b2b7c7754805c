use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::message::Message;
use crate::services::chat_service::ChatService;
use crate::services::message_service::DEFAULT_HISTORY_LIMIT;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Chronological page of one conversation's history.
pub async fn get_messages(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Message>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let offset = params.offset.unwrap_or(0);

    let messages =
        ChatService::get_history(&state.db, conversation_id, user.id, limit, offset).await?;
    Ok(Json(messages))
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

/// Aggregate unread count across all of the caller's conversations.
pub async fn get_unread_count(
    State(state): State<AppState>,
    user: User,
) -> Result<Json<UnreadCountResponse>, AppError> {
    let count = ChatService::get_total_unread(&state.db, user.id).await?;
    Ok(Json(UnreadCountResponse { count }))
}
