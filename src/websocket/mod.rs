use axum::extract::ws::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use uuid::Uuid;

pub mod events;
pub mod handlers;
pub mod presence;
pub mod pubsub;

/// One live connection as seen by the registries: the id distinguishes
/// multiple sockets of the same user, the sender feeds the socket task's
/// outbound loop.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub connection_id: Uuid,
    pub sender: UnboundedSender<Message>,
}

impl ConnectionHandle {
    pub fn send(&self, msg: Message) -> bool {
        self.sender.send(msg).is_ok()
    }
}

/// Logical broadcast groups, one per conversation. Connections subscribe on
/// demand and are dropped lazily when a send fails or explicitly on
/// disconnect.
#[derive(Default, Clone)]
pub struct RoomRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Vec<ConnectionHandle>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, conversation_id: Uuid, handle: ConnectionHandle) {
        let mut guard = self.inner.write().await;
        let members = guard.entry(conversation_id).or_default();
        if !members
            .iter()
            .any(|m| m.connection_id == handle.connection_id)
        {
            members.push(handle);
        }
    }

    /// Removes the connection from every room it joined.
    pub async fn leave_all(&self, connection_id: Uuid) {
        let mut guard = self.inner.write().await;
        guard.retain(|_, members| {
            members.retain(|m| m.connection_id != connection_id);
            !members.is_empty()
        });
    }

    /// Best-effort fan-out to the room. A closed handle is pruned without
    /// affecting delivery to the rest.
    pub async fn broadcast(&self, conversation_id: Uuid, msg: Message) {
        let mut guard = self.inner.write().await;
        if let Some(members) = guard.get_mut(&conversation_id) {
            members.retain(|m| m.send(msg.clone()));
            if members.is_empty() {
                guard.remove(&conversation_id);
            }
        }
    }

    /// Connection ids currently subscribed to the room.
    pub async fn connections_in_room(&self, conversation_id: Uuid) -> Vec<Uuid> {
        self.inner
            .read()
            .await
            .get(&conversation_id)
            .map(|members| members.iter().map(|m| m.connection_id).collect())
            .unwrap_or_default()
    }
}
