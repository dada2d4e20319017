use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;

/// A message addressed to one user. Only `is_read` ever changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

impl Notification {
    pub fn new(user_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            message: message.into(),
            created_at: Utc::now(),
            is_read: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnreadCount {
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarkedRead {
    pub updated: usize,
}

/// Frames written to a live channel.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveFrame {
    Connected,
    Notification { data: Notification },
}

/// What happened to the live push of a stored notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The user is connected but their buffer is full; the live push was dropped.
    Dropped,
    Offline,
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Notification not found")]
    NotFound,

    #[error("Notification belongs to another user")]
    Unauthorized,

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage rejected the request: {0}")]
    Storage(String),
}

impl From<StoreError> for NotificationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => NotificationError::NotFound,
            StoreError::Unavailable(msg) => NotificationError::Unavailable(msg),
            other => NotificationError::Storage(other.to_string()),
        }
    }
}

impl From<NotificationError> for AppError {
    fn from(e: NotificationError) -> Self {
        match e {
            NotificationError::NotFound => AppError::NotFound(e.to_string()),
            NotificationError::Unauthorized => AppError::Forbidden(e.to_string()),
            NotificationError::Unavailable(msg) => AppError::Unavailable(msg),
            NotificationError::Storage(msg) => AppError::Internal(msg),
        }
    }
}
