use std::sync::Arc;

use tracing::error;

use doctor_cell::services::SlotRepository;
use notification_cell::services::NotificationDispatcher;
use notification_cell::Notification;
use shared_database::directory::Directory;

use crate::services::audit::AuditLog;
use crate::services::locks::SchedulingLocks;
use crate::services::repository::AppointmentRepository;

/// Collaborators shared by the booking and lifecycle services.
#[derive(Clone)]
pub struct SchedulingContext {
    pub appointments: Arc<dyn AppointmentRepository>,
    pub slots: Arc<dyn SlotRepository>,
    pub directory: Arc<dyn Directory>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub audit: Arc<AuditLog>,
    pub locks: Arc<SchedulingLocks>,
}

impl SchedulingContext {
    pub(crate) async fn retract_notifications(&self, recorded: &[Notification]) {
        for notification in recorded {
            if let Err(e) = self.dispatcher.retract(notification.id).await {
                error!("Rollback could not retract notification {}: {}", notification.id, e);
            }
        }
    }
}
