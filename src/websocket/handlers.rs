use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth;
use crate::services::chat_service::{self, ChatService, PeerInfo};
use crate::services::conversation_service::ConversationService;
use crate::services::user_directory::UserDirectory;
use crate::state::AppState;
use crate::websocket::events::{self, ClientEvent, ServerEvent};
use crate::websocket::ConnectionHandle;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

fn bearer_token(params: &WsParams, headers: &HeaderMap) -> Option<String> {
    params.token.clone().or_else(|| {
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(|s| s.to_string())
    })
}

/// Validates the handshake credential and resolves it to an existing user,
/// under the configured deadline. A connection that cannot authenticate in
/// time is refused before any presence registration happens.
async fn authenticate(
    state: &AppState,
    params: &WsParams,
    headers: &HeaderMap,
) -> Result<Uuid, StatusCode> {
    let Some(token) = bearer_token(params, headers) else {
        warn!("connection rejected: no credential presented");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let verify = async {
        let user_id = auth::user_id_from_token(&token, &state.config.jwt_secret)?;
        if !UserDirectory::exists(&state.db, user_id).await? {
            return Err(AppError::Unauthorized);
        }
        Ok::<Uuid, AppError>(user_id)
    };

    match tokio::time::timeout(state.config.auth_timeout, verify).await {
        Ok(Ok(user_id)) => Ok(user_id),
        Ok(Err(e)) => {
            warn!(error = %e, "connection rejected: invalid credential");
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(_) => {
            warn!("connection rejected: authentication handshake timed out");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let user_id = match authenticate(&state, &params, &headers).await {
        Ok(id) => id,
        Err(status) => return status.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(state, user_id, socket))
        .into_response()
}

async fn handle_socket(state: AppState, user_id: Uuid, socket: WebSocket) {
    let connection_id = Uuid::new_v4();
    let (tx, mut outbound) = unbounded_channel::<Message>();
    let handle = ConnectionHandle {
        connection_id,
        sender: tx,
    };

    state.presence.register(user_id, handle.clone()).await;
    info!(%user_id, %connection_id, "connection established");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            // pushes queued by registries and other connections
            queued = outbound.recv() => {
                match queued {
                    Some(msg) => {
                        if sink.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => handle_event(&state, user_id, &handle, event).await,
                            Err(_) => send_error(&handle, "malformed event"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // ping/pong answered by the framework; binary frames ignored
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    state.presence.unregister(user_id, connection_id).await;
    state.rooms.leave_all(connection_id).await;
    info!(%user_id, %connection_id, "connection closed");
}

async fn handle_event(
    state: &AppState,
    user_id: Uuid,
    handle: &ConnectionHandle,
    event: ClientEvent,
) {
    match event {
        ClientEvent::JoinConversation { conversation_id } => {
            join_conversation(state, user_id, handle, conversation_id).await
        }
        ClientEvent::SendMessage {
            conversation_id,
            text,
            image,
            recipient_id,
        } => {
            send_message(
                state,
                user_id,
                handle,
                conversation_id,
                text.as_deref(),
                image.as_deref(),
                recipient_id,
            )
            .await
        }
        ClientEvent::Typing {
            conversation_id,
            recipient_id,
        } => typing(state, conversation_id, recipient_id).await,
        ClientEvent::MarkRead { conversation_id } => {
            mark_read(state, user_id, handle, conversation_id).await
        }
    }
}

/// Room joins are authorized against the conversation's member pair, so a
/// connection can never subscribe to someone else's thread.
async fn join_conversation(
    state: &AppState,
    user_id: Uuid,
    handle: &ConnectionHandle,
    conversation_id: Uuid,
) {
    match ConversationService::get(&state.db, conversation_id).await {
        Ok(conversation) if conversation.has_member(user_id) => {
            state.rooms.join(conversation_id, handle.clone()).await;
            debug!(%user_id, %conversation_id, "joined room");
        }
        Ok(_) => {
            warn!(%user_id, %conversation_id, "room join rejected: not a member");
            send_error(handle, "not a member of this conversation");
        }
        Err(AppError::NotFound) => {
            send_error(handle, "conversation not found");
        }
        Err(e) => {
            warn!(%user_id, %conversation_id, error = %e, "room join failed");
            send_error(handle, "failed to join conversation");
        }
    }
}

/// Persist, then deliver: the room broadcast and the out-of-room
/// notification both happen only after the message is durably stored.
async fn send_message(
    state: &AppState,
    sender_id: Uuid,
    handle: &ConnectionHandle,
    conversation_id: Uuid,
    text: Option<&str>,
    image: Option<&str>,
    recipient_id: Uuid,
) {
    let message =
        match ChatService::send_message(&state.db, conversation_id, sender_id, text, image).await {
            Ok(message) => message,
            Err(e) => {
                warn!(%sender_id, %conversation_id, error = %e, "send failed");
                send_error(handle, &client_error_text(&e));
                return;
            }
        };

    // Snapshot the room before broadcasting so the notification below can
    // skip handles the broadcast already reached.
    let covered = state.rooms.connections_in_room(conversation_id).await;

    events::broadcast_to_room(
        &state.rooms,
        &state.redis,
        state.instance_id,
        conversation_id,
        &ServerEvent::ReceiveMessage {
            message: message.clone(),
        },
    )
    .await;

    notify_recipient(state, sender_id, recipient_id, conversation_id, &message, &covered).await;
}

/// Best-effort secondary channel for a recipient who is connected but not
/// watching the conversation. Never sent to the sender's own sockets.
async fn notify_recipient(
    state: &AppState,
    sender_id: Uuid,
    recipient_id: Uuid,
    conversation_id: Uuid,
    message: &crate::models::message::Message,
    covered: &[Uuid],
) {
    if recipient_id == sender_id || !state.presence.is_online(recipient_id).await {
        return;
    }

    let sender = match UserDirectory::get(&state.db, sender_id).await {
        Ok(user) => user,
        Err(e) => {
            debug!(%sender_id, error = %e, "skipping notification: sender lookup failed");
            return;
        }
    };

    let event = ServerEvent::NewNotification {
        sender: PeerInfo {
            id: sender.id,
            username: sender.username,
            avatar_url: sender.avatar_url,
        },
        preview: chat_service::preview_for(message.text.as_deref(), message.image_url.as_deref()),
        conversation_id,
    };

    if let Some(frame) = event.to_frame() {
        state
            .presence
            .send_to_user_except(recipient_id, covered, frame)
            .await;
    }
}

/// Ephemeral: forwarded to the recipient's live handles only, silently
/// dropped when they are offline. Nothing is persisted.
async fn typing(state: &AppState, conversation_id: Uuid, recipient_id: Uuid) {
    let event = ServerEvent::UserTyping { conversation_id };
    if let Some(frame) = event.to_frame() {
        state.presence.send_to_user(recipient_id, frame).await;
    }
}

async fn mark_read(
    state: &AppState,
    user_id: Uuid,
    handle: &ConnectionHandle,
    conversation_id: Uuid,
) {
    if let Err(e) = ChatService::mark_conversation_read(&state.db, conversation_id, user_id).await {
        warn!(%user_id, %conversation_id, error = %e, "mark-read failed");
        send_error(handle, &client_error_text(&e));
        return;
    }

    events::broadcast_to_room(
        &state.rooms,
        &state.redis,
        state.instance_id,
        conversation_id,
        &ServerEvent::MessagesRead {
            conversation_id,
            user_id,
        },
    )
    .await;
}

fn send_error(handle: &ConnectionHandle, message: &str) {
    let event = ServerEvent::Error {
        message: message.to_string(),
    };
    if let Some(frame) = event.to_frame() {
        let _ = handle.send(frame);
    }
}

fn client_error_text(err: &AppError) -> String {
    if err.is_retryable() {
        "failed to send, try again".to_string()
    } else {
        err.to_string()
    }
}
