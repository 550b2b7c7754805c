use axum::extract::ws::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::ConnectionHandle;

/// Process-wide map of who is currently reachable for push delivery. A user
/// may hold several handles at once (one per device/tab); they count as
/// offline only when the last one goes. Purely advisory: persistence never
/// consults this registry.
#[derive(Default, Clone)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Vec<ConnectionHandle>>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, user_id: Uuid, handle: ConnectionHandle) {
        let mut guard = self.inner.write().await;
        let handles = guard.entry(user_id).or_default();
        if !handles
            .iter()
            .any(|h| h.connection_id == handle.connection_id)
        {
            handles.push(handle);
        }
    }

    pub async fn unregister(&self, user_id: Uuid, connection_id: Uuid) {
        let mut guard = self.inner.write().await;
        if let Some(handles) = guard.get_mut(&user_id) {
            handles.retain(|h| h.connection_id != connection_id);
            if handles.is_empty() {
                guard.remove(&user_id);
            }
        }
    }

    pub async fn lookup(&self, user_id: Uuid) -> Vec<ConnectionHandle> {
        self.inner
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.read().await.contains_key(&user_id)
    }

    /// Pushes to every live handle of one user, pruning the closed ones.
    pub async fn send_to_user(&self, user_id: Uuid, msg: Message) {
        self.send_to_user_except(user_id, &[], msg).await
    }

    /// Same, but skips handles named in `excluded` (e.g. sockets a room
    /// broadcast already covered).
    pub async fn send_to_user_except(&self, user_id: Uuid, excluded: &[Uuid], msg: Message) {
        let mut guard = self.inner.write().await;
        if let Some(handles) = guard.get_mut(&user_id) {
            handles.retain(|h| excluded.contains(&h.connection_id) || h.send(msg.clone()));
            if handles.is_empty() {
                guard.remove(&user_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn handle() -> (ConnectionHandle, tokio::sync::mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = unbounded_channel();
        (
            ConnectionHandle {
                connection_id: Uuid::new_v4(),
                sender: tx,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn a_user_may_hold_several_handles() {
        let presence = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (phone, mut rx_phone) = handle();
        let (laptop, mut rx_laptop) = handle();
        presence.register(user, phone).await;
        presence.register(user, laptop).await;

        assert_eq!(presence.lookup(user).await.len(), 2);

        presence.send_to_user(user, Message::Text("ping".into())).await;
        assert!(rx_phone.try_recv().is_ok());
        assert!(rx_laptop.try_recv().is_ok());
    }

    #[tokio::test]
    async fn user_goes_offline_only_when_the_last_handle_is_gone() {
        let presence = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (phone, _rx_phone) = handle();
        let (laptop, _rx_laptop) = handle();
        let phone_id = phone.connection_id;
        let laptop_id = laptop.connection_id;
        presence.register(user, phone).await;
        presence.register(user, laptop).await;

        presence.unregister(user, phone_id).await;
        assert!(presence.is_online(user).await);

        presence.unregister(user, laptop_id).await;
        assert!(!presence.is_online(user).await);
        assert!(presence.lookup(user).await.is_empty());
    }

    #[tokio::test]
    async fn excluded_handles_are_skipped_but_kept_registered() {
        let presence = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (in_room, mut rx_in_room) = handle();
        let (elsewhere, mut rx_elsewhere) = handle();
        let in_room_id = in_room.connection_id;
        presence.register(user, in_room).await;
        presence.register(user, elsewhere).await;

        presence
            .send_to_user_except(user, &[in_room_id], Message::Text("notify".into()))
            .await;

        assert!(rx_in_room.try_recv().is_err());
        assert!(rx_elsewhere.try_recv().is_ok());
        assert_eq!(presence.lookup(user).await.len(), 2);
    }

    #[tokio::test]
    async fn sending_to_an_offline_user_is_a_no_op() {
        let presence = PresenceRegistry::new();
        presence
            .send_to_user(Uuid::new_v4(), Message::Text("dropped".into()))
            .await;
    }
}
