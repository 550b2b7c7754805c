use std::sync::Arc;

use chat_service::{
    config, db, error, logging, routes,
    state::AppState,
    websocket::{presence::PresenceRegistry, pubsub, RoomRegistry},
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let db = db::init_pool(&cfg.database_url, cfg.db_max_connections)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;

    // Embedded migrations are idempotent; a schema mismatch is fatal.
    db::MIGRATOR
        .run(&db)
        .await
        .map_err(|e| error::AppError::StartServer(format!("migrations: {e}")))?;

    let redis = redis::Client::open(cfg.redis_url.as_str())
        .map_err(|e| error::AppError::StartServer(format!("redis: {e}")))?;

    let state = AppState {
        db,
        rooms: RoomRegistry::new(),
        presence: PresenceRegistry::new(),
        redis: redis.clone(),
        config: cfg.clone(),
        instance_id: Uuid::new_v4(),
    };

    // Relay room broadcasts published by peer instances into local sockets.
    tokio::spawn({
        let rooms = state.rooms.clone();
        let instance_id = state.instance_id;
        async move {
            if let Err(e) = pubsub::start_psub_listener(redis, rooms, instance_id).await {
                tracing::error!(error = %e, "pub/sub listener failed");
            }
        }
    });

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting chat-service");

    let app = routes::build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| error::AppError::StartServer(e.to_string()))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| error::AppError::StartServer(e.to_string()))?;

    Ok(())
}
