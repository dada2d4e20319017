use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use notification_cell::Notification;
use shared_models::auth::{Principal, Role};

use crate::models::{Appointment, AppointmentError, AppointmentStatus, AuditAction};
use crate::services::context::SchedulingContext;

pub struct LifecycleService {
    ctx: SchedulingContext,
}

impl LifecycleService {
    pub fn new(ctx: SchedulingContext) -> Self {
        Self { ctx }
    }

    /// Move an appointment along one allowed edge of the status machine.
    ///
    /// Cancelling reopens the slot the appointment claimed. The counterparty
    /// of the caller is notified: the patient when the doctor acts, the
    /// doctor when the patient acts, both when an admin acts. Status, slot,
    /// notifications and the audit record commit together; a failure part
    /// way restores the previous state.
    #[instrument(skip(self), fields(caller = %principal.user_id))]
    pub async fn update_status(
        &self,
        principal: &Principal,
        appointment_id: Uuid,
        next: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        authorize_transition(principal, &appointment, next)?;

        let guard = self
            .ctx
            .locks
            .acquire(appointment.doctor_id, appointment.appointment_date)
            .await;
        let recipients = counterparties(principal, &appointment);
        let lanes = self.ctx.dispatcher.sequence(&recipients).await;

        // Re-read under the lock; another transition may have landed first.
        let current = self.load(appointment_id).await?;
        let previous = current.status;

        if !previous.can_transition_to(next) {
            warn!("Invalid status transition attempted: {} -> {}", previous, next);
            return Err(AppointmentError::InvalidTransition { from: previous, to: next });
        }

        let updated = self
            .ctx
            .appointments
            .update_status(appointment_id, previous, next, Utc::now())
            .await?
            .ok_or(AppointmentError::InvalidTransition { from: previous, to: next })?;

        let released_slot = match self.reopen_slot(&updated).await {
            Ok(released) => released,
            Err(e) => {
                self.revert_status(&updated, &current).await;
                return Err(e);
            }
        };

        let message = format!(
            "Appointment {} on {} is now {}",
            updated.appointment_code,
            updated.appointment_date.format("%Y-%m-%d %H:%M UTC"),
            next
        );

        let details = format!("{} -> {}", previous, next);
        let recorded = match self.record_transition(principal, &updated, &recipients, message, details).await {
            Ok(recorded) => recorded,
            Err(e) => {
                self.reclaim(released_slot, updated.id).await;
                self.revert_status(&updated, &current).await;
                return Err(e);
            }
        };

        drop(guard);

        for notification in &recorded {
            self.ctx.dispatcher.deliver(notification).await;
        }
        drop(lanes);

        info!("Appointment {} moved {} -> {}", updated.id, previous, next);
        Ok(updated)
    }

    /// Administrative removal regardless of status. A slot the appointment
    /// still holds is reopened.
    #[instrument(skip(self), fields(caller = %principal.user_id))]
    pub async fn delete_appointment(
        &self,
        principal: &Principal,
        appointment_id: Uuid,
    ) -> Result<(), AppointmentError> {
        if !principal.is_admin() {
            return Err(AppointmentError::Unauthorized);
        }

        let appointment = self.load(appointment_id).await?;
        let _guard = self
            .ctx
            .locks
            .acquire(appointment.doctor_id, appointment.appointment_date)
            .await;

        let released_slot = self.reopen_any_slot(&appointment).await?;

        let details = format!(
            "Deleted {} in status {} with doctor {} for patient {}",
            appointment.appointment_code, appointment.status, appointment.doctor_id, appointment.patient_id
        );
        let audit = match self
            .ctx
            .audit
            .record(principal, AuditAction::AppointmentDeleted, appointment_id, details)
            .await
        {
            Ok(audit) => audit,
            Err(e) => {
                self.reclaim(released_slot, appointment_id).await;
                return Err(e.into());
            }
        };

        match self.ctx.appointments.delete(appointment_id).await {
            Ok(true) => {
                info!("Appointment {} deleted by admin {}", appointment_id, principal.user_id);
                Ok(())
            }
            outcome => {
                self.ctx.audit.retract(&audit).await;
                self.reclaim(released_slot, appointment_id).await;
                match outcome {
                    Ok(_) => Err(AppointmentError::NotFound),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Counterparty notifications, then the audit record. Whatever was
    /// recorded before a failure is retracted.
    async fn record_transition(
        &self,
        principal: &Principal,
        updated: &Appointment,
        recipients: &[Uuid],
        message: String,
        details: String,
    ) -> Result<Vec<Notification>, AppointmentError> {
        let mut recorded: Vec<Notification> = Vec::with_capacity(recipients.len());
        for &recipient in recipients {
            match self.ctx.dispatcher.record(recipient, message.clone()).await {
                Ok(notification) => recorded.push(notification),
                Err(e) => {
                    self.ctx.retract_notifications(&recorded).await;
                    return Err(e.into());
                }
            }
        }

        if let Err(e) = self
            .ctx
            .audit
            .record(principal, AuditAction::AppointmentStatusUpdated, updated.id, details)
            .await
        {
            self.ctx.retract_notifications(&recorded).await;
            return Err(e.into());
        }

        Ok(recorded)
    }

    async fn reclaim(&self, slot_id: Option<Uuid>, appointment_id: Uuid) {
        if let Some(slot_id) = slot_id {
            if let Err(e) = self.ctx.slots.claim(slot_id, appointment_id).await {
                error!("Rollback could not re-claim slot {}: {}", slot_id, e);
            }
        }
    }

    async fn load(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.ctx
            .appointments
            .get(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    /// On cancellation, hand the claimed slot back. Returns the slot reopened.
    async fn reopen_slot(&self, appointment: &Appointment) -> Result<Option<Uuid>, AppointmentError> {
        if appointment.status != AppointmentStatus::Canceled {
            return Ok(None);
        }
        self.reopen_any_slot(appointment).await
    }

    async fn reopen_any_slot(&self, appointment: &Appointment) -> Result<Option<Uuid>, AppointmentError> {
        let slot_id = match appointment.time_slot_id {
            Some(slot_id) => Some(slot_id),
            // Slots generated after a manual booking only record the holder on the slot side.
            None => self
                .ctx
                .slots
                .find_at(
                    appointment.doctor_id,
                    appointment.appointment_date.date_naive(),
                    appointment.appointment_date.time(),
                )
                .await?
                .filter(|slot| slot.appointment_id == Some(appointment.id))
                .map(|slot| slot.id),
        };
        let Some(slot_id) = slot_id else {
            return Ok(None);
        };

        if self.ctx.slots.release(slot_id, appointment.id).await? {
            debug!("Slot {} reopened by appointment {}", slot_id, appointment.id);
            Ok(Some(slot_id))
        } else {
            Ok(None)
        }
    }

    /// Put back the status and timestamp `updated` replaced.
    async fn revert_status(&self, updated: &Appointment, original: &Appointment) {
        match self
            .ctx
            .appointments
            .update_status(updated.id, updated.status, original.status, original.updated_at)
            .await
        {
            Ok(Some(_)) => warn!("Transition of appointment {} rolled back to {}", updated.id, original.status),
            Ok(None) => error!("Rollback of appointment {} found an unexpected status", updated.id),
            Err(e) => error!("Rollback of appointment {} failed: {}", updated.id, e),
        }
    }
}

/// The owning doctor or an admin may take any allowed edge. The owning
/// patient may only cancel.
fn authorize_transition(
    principal: &Principal,
    appointment: &Appointment,
    next: AppointmentStatus,
) -> Result<(), AppointmentError> {
    let permitted = match principal.role {
        Role::Admin => true,
        Role::Doctor => principal.user_id == appointment.doctor_id,
        Role::Patient => {
            principal.user_id == appointment.patient_id && next == AppointmentStatus::Canceled
        }
    };

    if permitted {
        Ok(())
    } else {
        Err(AppointmentError::Unauthorized)
    }
}

fn counterparties(principal: &Principal, appointment: &Appointment) -> Vec<Uuid> {
    match principal.role {
        Role::Doctor => vec![appointment.patient_id],
        Role::Patient => vec![appointment.doctor_id],
        Role::Admin => vec![appointment.patient_id, appointment.doctor_id],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn appointment(doctor_id: Uuid, patient_id: Uuid) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            appointment_code: "ABCDE12345".to_string(),
            patient_id,
            doctor_id,
            appointment_date: now,
            status: AppointmentStatus::Scheduled,
            notes: None,
            time_slot_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_patient_may_only_cancel() {
        let (doctor_id, patient_id) = (Uuid::new_v4(), Uuid::new_v4());
        let appt = appointment(doctor_id, patient_id);
        let patient = Principal::patient(patient_id);

        assert!(authorize_transition(&patient, &appt, AppointmentStatus::Canceled).is_ok());
        assert_matches!(
            authorize_transition(&patient, &appt, AppointmentStatus::Confirmed),
            Err(AppointmentError::Unauthorized)
        );
        assert_matches!(
            authorize_transition(&Principal::patient(Uuid::new_v4()), &appt, AppointmentStatus::Canceled),
            Err(AppointmentError::Unauthorized)
        );
    }

    #[test]
    fn test_only_owning_doctor_or_admin_confirms() {
        let (doctor_id, patient_id) = (Uuid::new_v4(), Uuid::new_v4());
        let appt = appointment(doctor_id, patient_id);

        assert!(authorize_transition(&Principal::doctor(doctor_id), &appt, AppointmentStatus::Confirmed).is_ok());
        assert!(authorize_transition(&Principal::admin(Uuid::new_v4()), &appt, AppointmentStatus::Completed).is_ok());
        assert_matches!(
            authorize_transition(&Principal::doctor(Uuid::new_v4()), &appt, AppointmentStatus::Confirmed),
            Err(AppointmentError::Unauthorized)
        );
    }

    #[test]
    fn test_counterparty_selection() {
        let (doctor_id, patient_id) = (Uuid::new_v4(), Uuid::new_v4());
        let appt = appointment(doctor_id, patient_id);

        assert_eq!(counterparties(&Principal::doctor(doctor_id), &appt), vec![patient_id]);
        assert_eq!(counterparties(&Principal::patient(patient_id), &appt), vec![doctor_id]);
        assert_eq!(
            counterparties(&Principal::admin(Uuid::new_v4()), &appt),
            vec![patient_id, doctor_id]
        );
    }
}
