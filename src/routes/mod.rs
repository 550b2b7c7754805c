use axum::{
    middleware,
    routing::{get, put},
    Router,
};

pub mod conversations;
pub mod messages;

use conversations::{list_conversations, mark_as_read, start_conversation};
use messages::{get_messages, get_unread_count};

use crate::middleware::auth::auth_middleware;
use crate::state::AppState;
use crate::websocket::handlers::ws_handler;

async fn health() -> &'static str {
    "OK"
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/chat/conversations",
            get(list_conversations).post(start_conversation),
        )
        .route("/chat/conversations/:id/messages", get(get_messages))
        .route("/chat/conversations/:id/read", put(mark_as_read))
        .route("/chat/unread", get(get_unread_count))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // The WebSocket endpoint authenticates its own handshake: browser
    // clients pass the token as a query parameter, which the bearer
    // middleware does not accept.
    let ws = Router::new().route("/ws", get(ws_handler));

    let router = Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api.merge(ws))
        .with_state(state);

    crate::middleware::with_defaults(router)
}
