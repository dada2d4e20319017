use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use shared_models::auth::Principal;

use crate::models::{DeliveryOutcome, Notification, NotificationError};
use crate::services::registry::{ChannelHandle, ConnectionRegistry};
use crate::services::sequencer::{DeliveryGuard, DeliverySequencer};
use crate::services::store::NotificationRepository;

/// Stores notifications and pushes them to the recipient's live channel.
///
/// Storage always comes first. Live delivery is best effort and never
/// waits on a slow or absent client. Pushes to one user leave in the order
/// their records were stored.
pub struct NotificationDispatcher {
    repository: Arc<dyn NotificationRepository>,
    registry: Arc<ConnectionRegistry>,
    sequencer: DeliverySequencer,
}

impl NotificationDispatcher {
    pub fn new(repository: Arc<dyn NotificationRepository>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            repository,
            registry,
            sequencer: DeliverySequencer::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Hold the recipients' delivery lanes across a `record` ... `deliver`
    /// sequence. Take it before the first `record`.
    pub async fn sequence(&self, recipients: &[Uuid]) -> DeliveryGuard {
        self.sequencer.acquire(recipients).await
    }

    /// Persist without pushing. Callers that must commit other writes first
    /// use this, then `deliver` once everything is durable.
    pub async fn record(&self, user_id: Uuid, message: impl Into<String>) -> Result<Notification, NotificationError> {
        let notification = self.repository.insert(Notification::new(user_id, message)).await?;
        debug!("Stored notification {} for user {}", notification.id, user_id);
        Ok(notification)
    }

    /// Undo a `record` whose surrounding operation rolled back.
    pub async fn retract(&self, notification_id: Uuid) -> Result<(), NotificationError> {
        self.repository.delete(notification_id).await?;
        debug!("Retracted notification {}", notification_id);
        Ok(())
    }

    pub async fn deliver(&self, notification: &Notification) -> DeliveryOutcome {
        let outcome = self.registry.push(notification).await;
        debug!(
            "Live delivery of notification {} to user {}: {:?}",
            notification.id, notification.user_id, outcome
        );
        outcome
    }

    pub async fn publish(&self, user_id: Uuid, message: impl Into<String>) -> Result<Notification, NotificationError> {
        let _lane = self.sequence(&[user_id]).await;
        let notification = self.record(user_id, message).await?;
        self.deliver(&notification).await;
        Ok(notification)
    }

    pub async fn list_unread(&self, user_id: Uuid) -> Result<Vec<Notification>, NotificationError> {
        Ok(self.repository.list_for_user(user_id, true).await?)
    }

    pub async fn list_all(&self, user_id: Uuid) -> Result<Vec<Notification>, NotificationError> {
        Ok(self.repository.list_for_user(user_id, false).await?)
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<usize, NotificationError> {
        Ok(self.repository.count_unread(user_id).await?)
    }

    /// Idempotent. Only the recipient may mark a notification.
    pub async fn mark_read(&self, principal: &Principal, notification_id: Uuid) -> Result<Notification, NotificationError> {
        let mut notification = self
            .repository
            .get(notification_id)
            .await?
            .ok_or(NotificationError::NotFound)?;

        if notification.user_id != principal.user_id {
            return Err(NotificationError::Unauthorized);
        }

        if !notification.is_read {
            self.repository.mark_read(notification_id).await?;
            notification.is_read = true;
        }

        Ok(notification)
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<usize, NotificationError> {
        let updated = self.repository.mark_all_read(user_id).await?;
        info!("Marked {} notifications read for user {}", updated, user_id);
        Ok(updated)
    }

    /// Open the user's live channel. Nothing stored earlier is replayed on it.
    pub async fn subscribe(&self, user_id: Uuid) -> ChannelHandle {
        self.registry.register(user_id).await
    }
}
