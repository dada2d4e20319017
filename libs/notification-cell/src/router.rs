use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::NotificationDispatcher;

#[derive(Clone)]
pub struct NotificationCellState {
    pub config: Arc<AppConfig>,
    pub dispatcher: Arc<NotificationDispatcher>,
}

/// Routes mounted under `/notifications`. The WebSocket route authenticates
/// its own handshake.
pub fn notification_routes(state: NotificationCellState) -> Router {
    let live_routes = Router::new().route("/ws", get(handlers::subscribe));

    let protected_routes = Router::new()
        .route("/", get(handlers::list_notifications))
        .route("/unread", get(handlers::list_unread_notifications))
        .route("/unread/count", get(handlers::unread_count))
        .route("/read-all", put(handlers::mark_all_read))
        .route("/{notification_id}/read", put(handlers::mark_read))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(live_routes)
        .merge(protected_routes)
        .with_state(state)
}
