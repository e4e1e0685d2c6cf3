use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tower_http::services::ServeDir;

use crate::auth::AppState;
use crate::messages;
use crate::middleware::require_auth;
use crate::users;
use crate::webhooks;

/// Whole request body cap: room for a profile and a cover image in one update.
const MAX_BODY_SIZE: usize = 12 * 1024 * 1024;

/// All HTTP routes. CORS and request tracing are layered on by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(health))
        .route("/api/webhooks/identity", post(webhooks::identity_event))
        // Authenticates itself: EventSource clients pass the token as a query param.
        .route("/api/message/{user_id}", get(messages::stream_messages));

    let protected_routes = Router::new()
        .route("/api/message/send", post(messages::send_message))
        .route("/api/message/get", post(messages::get_chat_messages))
        .route("/api/user/recent-messages", get(messages::get_recent_messages))
        .route("/api/user/data", get(users::get_user_data))
        .route("/api/user/update", post(users::update_profile))
        .route("/api/user/discover", post(users::discover_users))
        .route("/api/user/follow", post(users::follow_user))
        .route("/api/user/unfollow", post(users::unfollow_user))
        .route("/api/user/connect", post(users::send_connection_request))
        .route("/api/user/accept", post(users::accept_connection_request))
        .route("/api/user/connections", get(users::get_user_connections))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let mut app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    if let Some(dir) = state.assets.local_dir() {
        app = app.nest_service("/uploads", ServeDir::new(dir));
    }

    app.with_state(state)
}

async fn health() -> &'static str {
    "Server Is Running"
}
