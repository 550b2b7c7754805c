//! Cross-instance room fanout over Redis pub/sub. Each instance publishes
//! its room broadcasts tagged with its own id and relays everyone else's to
//! local sockets; the tag keeps a broadcast from being delivered twice on
//! the instance that produced it.

use futures_util::StreamExt;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::websocket::RoomRegistry;
use axum::extract::ws::Message;

fn channel_for_conversation(id: Uuid) -> String {
    format!("conversation:{id}")
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    origin: Uuid,
    payload: String,
}

pub async fn publish(
    client: &redis::Client,
    origin: Uuid,
    conversation_id: Uuid,
    payload: &str,
) -> redis::RedisResult<()> {
    let mut conn = client.get_multiplexed_async_connection().await?;
    let envelope = serde_json::json!({ "origin": origin, "payload": payload }).to_string();
    conn.publish::<_, _, ()>(channel_for_conversation(conversation_id), envelope)
        .await
}

/// Long-running relay task: rebroadcasts frames published by other
/// instances into this instance's rooms.
pub async fn start_psub_listener(
    client: redis::Client,
    rooms: RoomRegistry,
    local_instance: Uuid,
) -> redis::RedisResult<()> {
    // PubSub needs a dedicated connection, not the multiplexed one
    let conn = client.get_async_connection().await?;
    let mut pubsub = conn.into_pubsub();
    pubsub.psubscribe("conversation:*").await?;
    let mut stream = pubsub.on_message();

    while let Some(msg) = stream.next().await {
        let channel: String = msg.get_channel_name().into();
        let raw: String = msg.get_payload()?;

        let Some(id_part) = channel.strip_prefix("conversation:") else {
            continue;
        };
        let Ok(conversation_id) = Uuid::parse_str(id_part) else {
            continue;
        };
        let Ok(envelope) = serde_json::from_str::<Envelope>(&raw) else {
            tracing::debug!(%channel, "dropping malformed fanout envelope");
            continue;
        };
        if envelope.origin == local_instance {
            continue;
        }

        rooms
            .broadcast(conversation_id, Message::Text(envelope.payload))
            .await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips() {
        let origin = Uuid::new_v4();
        let raw = serde_json::json!({ "origin": origin, "payload": "{\"type\":\"user_typing\"}" })
            .to_string();
        let envelope: Envelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(envelope.origin, origin);
        assert_eq!(envelope.payload, "{\"type\":\"user_typing\"}");
    }

    #[test]
    fn channel_name_embeds_the_conversation() {
        let id = Uuid::new_v4();
        let channel = channel_for_conversation(id);
        assert_eq!(channel.strip_prefix("conversation:"), Some(id.to_string().as_str()));
    }
}
