use axum::extract::ws::Message;
use chat_service::websocket::{presence::PresenceRegistry, ConnectionHandle, RoomRegistry};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use uuid::Uuid;

fn handle() -> (ConnectionHandle, UnboundedReceiver<Message>) {
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
async fn concurrent_register_unregister_leaves_no_stale_presence() {
    let presence = PresenceRegistry::new();
    let user = Uuid::new_v4();

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let presence = presence.clone();
        tasks.push(tokio::spawn(async move {
            let (h, _rx) = handle();
            let connection_id = h.connection_id;
            presence.register(user, h).await;
            tokio::task::yield_now().await;
            presence.unregister(user, connection_id).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(!presence.is_online(user).await);
    assert!(presence.lookup(user).await.is_empty());
}

#[tokio::test]
async fn lookups_race_with_connect_and_disconnect_without_panicking() {
    let presence = PresenceRegistry::new();
    let user = Uuid::new_v4();

    let churn = {
        let presence = presence.clone();
        tokio::spawn(async move {
            for _ in 0..100 {
                let (h, _rx) = handle();
                let id = h.connection_id;
                presence.register(user, h).await;
                presence
                    .send_to_user(user, Message::Text("ping".into()))
                    .await;
                presence.unregister(user, id).await;
            }
        })
    };

    let reader = {
        let presence = presence.clone();
        tokio::spawn(async move {
            for _ in 0..100 {
                let _ = presence.lookup(user).await;
                let _ = presence.is_online(user).await;
                tokio::task::yield_now().await;
            }
        })
    };

    churn.await.unwrap();
    reader.await.unwrap();
    assert!(!presence.is_online(user).await);
}

#[tokio::test]
async fn room_broadcasts_survive_membership_churn_and_stay_ordered() {
    let rooms = RoomRegistry::new();
    let conversation = Uuid::new_v4();

    let (stable, mut rx) = handle();
    rooms.join(conversation, stable).await;

    let churn = {
        let rooms = rooms.clone();
        tokio::spawn(async move {
            for _ in 0..20 {
                let (transient, rx_transient) = handle();
                let id = transient.connection_id;
                rooms.join(conversation, transient).await;
                tokio::task::yield_now().await;
                drop(rx_transient);
                rooms.leave_all(id).await;
            }
        })
    };

    let broadcaster = {
        let rooms = rooms.clone();
        tokio::spawn(async move {
            for i in 0..50 {
                rooms
                    .broadcast(conversation, Message::Text(format!("m{i}")))
                    .await;
            }
        })
    };

    churn.await.unwrap();
    broadcaster.await.unwrap();

    let mut received = Vec::new();
    while let Ok(Message::Text(text)) = rx.try_recv() {
        received.push(text);
    }
    let expected: Vec<String> = (0..50).map(|i| format!("m{i}")).collect();
    assert_eq!(received, expected);
}

#[tokio::test]
async fn multi_device_user_receives_push_on_every_handle() {
    let presence = PresenceRegistry::new();
    let user = Uuid::new_v4();

    let mut receivers = Vec::new();
    for _ in 0..3 {
        let (h, rx) = handle();
        presence.register(user, h).await;
        receivers.push(rx);
    }

    presence
        .send_to_user(user, Message::Text("badge".into()))
        .await;

    for rx in receivers.iter_mut() {
        assert!(matches!(rx.try_recv(), Ok(Message::Text(t)) if t == "badge"));
    }
}
