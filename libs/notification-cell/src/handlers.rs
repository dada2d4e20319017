use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Path, Query, State,
    },
    http::HeaderMap,
    response::Response,
    Json,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::principal_of;
use shared_utils::jwt::validate_token;

use crate::models::{LiveFrame, MarkedRead, Notification, UnreadCount};
use crate::router::NotificationCellState;
use crate::services::NotificationDispatcher;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    pub token: Option<String>,
}

// ==============================================================================
// STORED NOTIFICATIONS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_notifications(
    State(state): State<NotificationCellState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let principal = principal_of(&user)?;
    Ok(Json(state.dispatcher.list_all(principal.user_id).await?))
}

#[axum::debug_handler]
pub async fn list_unread_notifications(
    State(state): State<NotificationCellState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let principal = principal_of(&user)?;
    Ok(Json(state.dispatcher.list_unread(principal.user_id).await?))
}

#[axum::debug_handler]
pub async fn unread_count(
    State(state): State<NotificationCellState>,
    Extension(user): Extension<User>,
) -> Result<Json<UnreadCount>, AppError> {
    let principal = principal_of(&user)?;
    let count = state.dispatcher.unread_count(principal.user_id).await?;
    Ok(Json(UnreadCount { count }))
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<NotificationCellState>,
    Path(notification_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Notification>, AppError> {
    let principal = principal_of(&user)?;
    Ok(Json(state.dispatcher.mark_read(&principal, notification_id).await?))
}

#[axum::debug_handler]
pub async fn mark_all_read(
    State(state): State<NotificationCellState>,
    Extension(user): Extension<User>,
) -> Result<Json<MarkedRead>, AppError> {
    let principal = principal_of(&user)?;
    let updated = state.dispatcher.mark_all_read(principal.user_id).await?;
    Ok(Json(MarkedRead { updated }))
}

// ==============================================================================
// LIVE CHANNEL
// ==============================================================================

/// Browsers cannot set headers on a WebSocket handshake, so the token may
/// also arrive as `?token=`.
pub async fn subscribe(
    State(state): State<NotificationCellState>,
    Query(query): Query<SubscribeQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let token = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .or(query.token)
        .ok_or_else(|| AppError::Auth("Missing authorization token".to_string()))?;

    let user = validate_token(&token, &state.config.supabase_jwt_secret).map_err(AppError::Auth)?;
    let principal = principal_of(&user)?;

    let dispatcher = state.dispatcher.clone();
    Ok(ws.on_upgrade(move |socket| live_session(socket, dispatcher, principal.user_id)))
}

async fn live_session(socket: WebSocket, dispatcher: Arc<NotificationDispatcher>, user_id: Uuid) {
    let handle = dispatcher.subscribe(user_id).await;
    let connection_id = handle.connection_id;
    let mut receiver = handle.receiver;
    info!("Live channel {} opened for user {}", connection_id, user_id);

    let (mut sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(async move {
        if send_frame(&mut sink, &LiveFrame::Connected).await.is_err() {
            return;
        }

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                next = receiver.recv() => match next {
                    Some(data) => {
                        if send_frame(&mut sink, &LiveFrame::Notification { data }).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        // Replaced by a newer session.
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                },
                _ = heartbeat.tick() => {
                    if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(Message::Pong(_)) => debug!("Pong from user {}", user_id),
                Ok(_) => {}
                Err(e) => {
                    debug!("Live channel receive error for user {}: {}", user_id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.registry().release(user_id, connection_id).await;
    info!("Live channel {} closed for user {}", connection_id, user_id);
}

async fn send_frame(sink: &mut SplitSink<WebSocket, Message>, frame: &LiveFrame) -> Result<(), axum::Error> {
    match serde_json::to_string(frame) {
        Ok(text) => sink.send(Message::Text(text.into())).await,
        Err(e) => {
            warn!("Could not encode live frame: {}", e);
            Ok(())
        }
    }
}
