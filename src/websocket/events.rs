//! Wire events for the persistent connection. Every frame is JSON with a
//! `type` tag; inbound sender identity always comes from the authenticated
//! connection, never from payload fields.

use axum::extract::ws::Message as WsMessage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::message::Message;
use crate::services::chat_service::PeerInfo;
use crate::websocket::{pubsub, RoomRegistry};

/// client -> server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "join_conversation")]
    JoinConversation { conversation_id: Uuid },

    #[serde(rename = "send_message")]
    SendMessage {
        conversation_id: Uuid,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        image: Option<String>,
        recipient_id: Uuid,
    },

    #[serde(rename = "typing")]
    Typing {
        conversation_id: Uuid,
        recipient_id: Uuid,
    },

    #[serde(rename = "mark_read")]
    MarkRead { conversation_id: Uuid },
}

/// server -> client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Room broadcast of a freshly persisted message.
    #[serde(rename = "receive_message")]
    ReceiveMessage { message: Message },

    /// Secondary channel for a recipient who is online but not watching the
    /// conversation.
    #[serde(rename = "new_notification")]
    NewNotification {
        sender: PeerInfo,
        preview: String,
        conversation_id: Uuid,
    },

    #[serde(rename = "user_typing")]
    UserTyping { conversation_id: Uuid },

    #[serde(rename = "messages_read")]
    MessagesRead {
        conversation_id: Uuid,
        user_id: Uuid,
    },

    /// Reported to the originating connection only, never broadcast.
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn to_frame(&self) -> Option<WsMessage> {
        match serde_json::to_string(self) {
            Ok(payload) => Some(WsMessage::Text(payload)),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize server event");
                None
            }
        }
    }
}

/// Delivers an event to the conversation's room on this instance and
/// publishes it for any peer instances. Redis being down degrades to
/// local-only delivery; it never fails the operation that produced the
/// event.
pub async fn broadcast_to_room(
    rooms: &RoomRegistry,
    redis: &redis::Client,
    instance_id: Uuid,
    conversation_id: Uuid,
    event: &ServerEvent,
) {
    let Ok(payload) = serde_json::to_string(event) else {
        tracing::error!(%conversation_id, "failed to serialize room event");
        return;
    };

    rooms
        .broadcast(conversation_id, WsMessage::Text(payload.clone()))
        .await;

    if let Err(e) = pubsub::publish(redis, instance_id, conversation_id, &payload).await {
        tracing::debug!(error = %e, %conversation_id, "pub/sub publish failed; delivered locally only");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn inbound_send_message_parses_with_optional_fields_missing() {
        let conversation_id = Uuid::new_v4();
        let recipient_id = Uuid::new_v4();
        let raw = serde_json::json!({
            "type": "send_message",
            "conversation_id": conversation_id,
            "image": "https://cdn.example/covers/1.jpg",
            "recipient_id": recipient_id,
        })
        .to_string();

        let event: ClientEvent = serde_json::from_str(&raw).unwrap();
        match event {
            ClientEvent::SendMessage {
                text,
                image,
                recipient_id: r,
                ..
            } => {
                assert_eq!(text, None);
                assert_eq!(image.as_deref(), Some("https://cdn.example/covers/1.jpg"));
                assert_eq!(r, recipient_id);
            }
            other => panic!("parsed wrong variant: {other:?}"),
        }
    }

    #[test]
    fn inbound_events_are_tagged_by_type() {
        let raw = serde_json::json!({
            "type": "join_conversation",
            "conversation_id": Uuid::new_v4(),
        })
        .to_string();
        assert!(matches!(
            serde_json::from_str::<ClientEvent>(&raw).unwrap(),
            ClientEvent::JoinConversation { .. }
        ));

        let unknown = serde_json::json!({"type": "shrug"}).to_string();
        assert!(serde_json::from_str::<ClientEvent>(&unknown).is_err());
    }

    #[test]
    fn receive_message_frame_carries_the_full_message() {
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            text: Some("hi".into()),
            image_url: None,
            is_read: false,
            created_at: Utc::now(),
        };
        let event = ServerEvent::ReceiveMessage {
            message: message.clone(),
        };

        let parsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(parsed["type"], "receive_message");
        assert_eq!(parsed["message"]["id"], message.id.to_string());
        assert_eq!(parsed["message"]["text"], "hi");
        assert_eq!(parsed["message"]["is_read"], false);
    }

    #[test]
    fn notification_frame_has_sender_preview_and_conversation() {
        let event = ServerEvent::NewNotification {
            sender: PeerInfo {
                id: Uuid::new_v4(),
                username: "alice".into(),
                avatar_url: None,
            },
            preview: "hello".into(),
            conversation_id: Uuid::new_v4(),
        };

        let parsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(parsed["type"], "new_notification");
        assert_eq!(parsed["sender"]["username"], "alice");
        assert_eq!(parsed["preview"], "hello");
    }
}
