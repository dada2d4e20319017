use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{DeliveryOutcome, Notification};

struct LiveConnection {
    connection_id: Uuid,
    sender: mpsc::Sender<Notification>,
    connected_at: DateTime<Utc>,
}

/// Receiving side of a user's live channel. Dropping it closes the channel.
pub struct ChannelHandle {
    pub connection_id: Uuid,
    pub user_id: Uuid,
    pub receiver: mpsc::Receiver<Notification>,
}

/// Maps each user to at most one live channel.
///
/// Registering again for the same user replaces the previous channel. The
/// old sender is dropped, so the stale session sees its receiver close and
/// shuts down instead of getting duplicate deliveries.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Uuid, LiveConnection>>,
    capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub async fn register(&self, user_id: Uuid) -> ChannelHandle {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let connection_id = Uuid::new_v4();

        let previous = self.connections.write().await.insert(
            user_id,
            LiveConnection {
                connection_id,
                sender,
                connected_at: Utc::now(),
            },
        );

        if let Some(old) = previous {
            info!(
                "Replacing live channel {} for user {} (open since {})",
                old.connection_id, user_id, old.connected_at
            );
        } else {
            debug!("Registered live channel {} for user {}", connection_id, user_id);
        }

        ChannelHandle {
            connection_id,
            user_id,
            receiver,
        }
    }

    pub async fn unregister(&self, user_id: Uuid) -> bool {
        self.connections.write().await.remove(&user_id).is_some()
    }

    /// Unregister only if `connection_id` is still the user's current channel.
    /// A replaced session calls this on its way out without evicting its successor.
    pub async fn release(&self, user_id: Uuid, connection_id: Uuid) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(&user_id) {
            Some(current) if current.connection_id == connection_id => {
                connections.remove(&user_id);
                debug!("Released live channel {} for user {}", connection_id, user_id);
                true
            }
            _ => false,
        }
    }

    /// Never waits: a full buffer drops the live push.
    pub async fn push(&self, notification: &Notification) -> DeliveryOutcome {
        let connections = self.connections.read().await;
        let Some(connection) = connections.get(&notification.user_id) else {
            return DeliveryOutcome::Offline;
        };

        match connection.sender.try_send(notification.clone()) {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "Live buffer full for user {}, dropping push of notification {}",
                    notification.user_id, notification.id
                );
                DeliveryOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => DeliveryOutcome::Offline,
        }
    }

    pub async fn is_connected(&self, user_id: Uuid) -> bool {
        self.connections.read().await.contains_key(&user_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
