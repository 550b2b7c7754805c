use crate::{
    config::Config,
    websocket::{presence::PresenceRegistry, RoomRegistry},
};
use sqlx::{Pool, Postgres};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub rooms: RoomRegistry,
    pub presence: PresenceRegistry,
    pub redis: redis::Client,
    pub config: Arc<Config>,
    /// Identifies this process on the pub/sub fanout channel so relayed
    /// broadcasts from other instances are not re-delivered locally.
    pub instance_id: Uuid,
}
