use chrono::{DateTime, SubsecRound, Utc};
use rand::Rng;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use notification_cell::Notification;
use shared_models::auth::{Principal, Role};

use crate::models::{
    Appointment, AppointmentError, AppointmentFilter, AppointmentSearchQuery, AppointmentStatus,
    AuditAction, AuditRecord, BookAppointmentRequest, BookingPolicy,
};
use crate::services::context::SchedulingContext;
use crate::services::repository::{ACTIVE_SLOT_CONSTRAINT, CODE_CONSTRAINT};

pub const CODE_LENGTH: usize = 10;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_CODE_ATTEMPTS: u32 = 3;

/// Ten uppercase alphanumerics, meant to be read out over the phone.
pub fn generate_appointment_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

pub struct BookingService {
    ctx: SchedulingContext,
    policy: BookingPolicy,
}

impl BookingService {
    pub fn new(ctx: SchedulingContext, policy: BookingPolicy) -> Self {
        Self { ctx, policy }
    }

    /// Book the doctor at an instant, claiming the matching slot if one was
    /// generated. At most one non-canceled appointment ever holds a
    /// (doctor, instant); every other attempt gets `SlotConflict`.
    ///
    /// The appointment, the slot claim, the doctor's notification, the
    /// patient's confirmation and the audit record commit together or not at
    /// all. Live pushes go out after the lock is released.
    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id, caller = %principal.user_id))]
    pub async fn book_appointment(
        &self,
        principal: &Principal,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let patient_id = resolve_patient(principal, &request)?;
        let instant = self.validate_instant(request.appointment_date)?;
        let notes = request
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        if !self.ctx.directory.doctor_exists(request.doctor_id).await? {
            return Err(AppointmentError::DoctorNotFound);
        }
        if !self.ctx.directory.patient_exists(patient_id).await? {
            return Err(AppointmentError::PatientNotFound);
        }

        let guard = self.ctx.locks.acquire(request.doctor_id, instant).await;
        let lanes = self.ctx.dispatcher.sequence(&[request.doctor_id, patient_id]).await;

        let slot = self
            .ctx
            .slots
            .find_at(request.doctor_id, instant.date_naive(), instant.time())
            .await?
            .filter(|s| s.is_open());

        let appointment = self
            .insert_with_unique_code(patient_id, request.doctor_id, instant, notes, slot.as_ref().map(|s| s.id))
            .await?;

        if let Some(slot) = &slot {
            match self.ctx.slots.claim(slot.id, appointment.id).await {
                Ok(true) => debug!("Slot {} claimed by appointment {}", slot.id, appointment.id),
                Ok(false) => {
                    self.rollback(&appointment, None).await;
                    return Err(AppointmentError::SlotConflict);
                }
                Err(e) => {
                    self.rollback(&appointment, None).await;
                    return Err(e.into());
                }
            }
        }

        let recorded = match self.record_booking(principal, &appointment).await {
            Ok(recorded) => recorded,
            Err(e) => {
                self.rollback(&appointment, appointment.time_slot_id).await;
                return Err(e);
            }
        };

        drop(guard);

        for notification in &recorded {
            self.ctx.dispatcher.deliver(notification).await;
        }
        drop(lanes);
        info!(
            "Appointment {} ({}) booked for patient {} at {}",
            appointment.id, appointment.appointment_code, patient_id, instant
        );

        Ok(appointment)
    }

    pub async fn get_appointment(
        &self,
        principal: &Principal,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self
            .ctx
            .appointments
            .get(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)?;

        authorize_read(principal, &appointment)?;
        Ok(appointment)
    }

    pub async fn get_appointment_by_code(
        &self,
        principal: &Principal,
        code: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self
            .ctx
            .appointments
            .find_by_code(&code.trim().to_ascii_uppercase())
            .await?
            .ok_or(AppointmentError::NotFound)?;

        authorize_read(principal, &appointment)?;
        Ok(appointment)
    }

    /// Admin only. Records survive deletion of the appointment.
    pub async fn audit_trail(
        &self,
        principal: &Principal,
        appointment_id: Uuid,
    ) -> Result<Vec<AuditRecord>, AppointmentError> {
        if !principal.is_admin() {
            return Err(AppointmentError::Unauthorized);
        }
        Ok(self.ctx.audit.history(appointment_id).await?)
    }

    /// Non-admin callers only ever see their own appointments.
    pub async fn search_appointments(
        &self,
        principal: &Principal,
        query: AppointmentSearchQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut filter = AppointmentFilter {
            doctor_id: query.doctor_id,
            patient_id: query.patient_id,
            status: query.status,
            from: query.from_date.map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc()),
            to: query
                .to_date
                .and_then(|d| d.succ_opt())
                .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc()),
        };

        if let (Some(from), Some(to)) = (query.from_date, query.to_date) {
            if to < from {
                return Err(AppointmentError::Validation(
                    "to_date must not be before from_date".to_string(),
                ));
            }
        }

        match principal.role {
            Role::Admin => {}
            Role::Doctor => filter.doctor_id = Some(scope(filter.doctor_id, principal.user_id)?),
            Role::Patient => filter.patient_id = Some(scope(filter.patient_id, principal.user_id)?),
        }

        Ok(self.ctx.appointments.search(&filter).await?)
    }

    fn validate_instant(&self, requested: DateTime<Utc>) -> Result<DateTime<Utc>, AppointmentError> {
        let instant = requested.trunc_subsecs(0);
        if !self.policy.allow_past_bookings && instant <= Utc::now() {
            return Err(AppointmentError::Validation(
                "Appointment time must be in the future".to_string(),
            ));
        }
        Ok(instant)
    }

    async fn insert_with_unique_code(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        instant: DateTime<Utc>,
        notes: Option<String>,
        time_slot_id: Option<Uuid>,
    ) -> Result<Appointment, AppointmentError> {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let now = Utc::now();
            let candidate = Appointment {
                id: Uuid::new_v4(),
                appointment_code: generate_appointment_code(),
                patient_id,
                doctor_id,
                appointment_date: instant,
                status: AppointmentStatus::Scheduled,
                notes: notes.clone(),
                time_slot_id,
                created_at: now,
                updated_at: now,
            };

            match self.ctx.appointments.insert(candidate).await {
                Ok(appointment) => return Ok(appointment),
                Err(e) if e.is_conflict_on(CODE_CONSTRAINT) => {
                    warn!("Appointment code collision, retrying attempt {}/{}", attempt, MAX_CODE_ATTEMPTS);
                }
                Err(e) if e.is_conflict_on(ACTIVE_SLOT_CONSTRAINT) => {
                    debug!("Doctor {} already held at {}", doctor_id, instant);
                    return Err(AppointmentError::SlotConflict);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppointmentError::Unavailable(
            "Could not allocate a unique appointment code".to_string(),
        ))
    }

    /// Doctor notification, patient confirmation, then the audit record.
    /// Whatever was recorded before a failure is retracted.
    async fn record_booking(
        &self,
        principal: &Principal,
        appointment: &Appointment,
    ) -> Result<Vec<Notification>, AppointmentError> {
        let when = appointment.appointment_date.format("%Y-%m-%d %H:%M UTC");
        let messages = [
            (
                appointment.doctor_id,
                format!("New appointment {} booked for {}", appointment.appointment_code, when),
            ),
            (
                appointment.patient_id,
                format!("Your appointment {} is confirmed for {}", appointment.appointment_code, when),
            ),
        ];

        let mut recorded = Vec::with_capacity(messages.len());
        for (recipient, message) in messages {
            match self.ctx.dispatcher.record(recipient, message).await {
                Ok(notification) => recorded.push(notification),
                Err(e) => {
                    self.ctx.retract_notifications(&recorded).await;
                    return Err(e.into());
                }
            }
        }

        let details = format!(
            "Booked {} with doctor {} for patient {} at {}",
            appointment.appointment_code, appointment.doctor_id, appointment.patient_id, when
        );
        if let Err(e) = self
            .ctx
            .audit
            .record(principal, AuditAction::AppointmentCreated, appointment.id, details)
            .await
        {
            self.ctx.retract_notifications(&recorded).await;
            return Err(e.into());
        }

        Ok(recorded)
    }

    async fn rollback(&self, appointment: &Appointment, claimed_slot: Option<Uuid>) {
        if let Some(slot_id) = claimed_slot {
            if let Err(e) = self.ctx.slots.release(slot_id, appointment.id).await {
                error!("Rollback could not reopen slot {}: {}", slot_id, e);
            }
        }
        if let Err(e) = self.ctx.appointments.delete(appointment.id).await {
            error!("Rollback could not remove appointment {}: {}", appointment.id, e);
        }
        warn!("Booking of appointment {} rolled back", appointment.id);
    }
}

/// Patients book for themselves. Doctors book into their own calendar for a
/// named patient. Admins book anything.
fn resolve_patient(principal: &Principal, request: &BookAppointmentRequest) -> Result<Uuid, AppointmentError> {
    match principal.role {
        Role::Patient => match request.patient_id {
            None => Ok(principal.user_id),
            Some(id) if id == principal.user_id => Ok(id),
            Some(_) => Err(AppointmentError::Unauthorized),
        },
        Role::Doctor if request.doctor_id != principal.user_id => Err(AppointmentError::Unauthorized),
        Role::Doctor | Role::Admin => request
            .patient_id
            .ok_or_else(|| AppointmentError::Validation("patient_id is required".to_string())),
    }
}

pub(crate) fn authorize_read(principal: &Principal, appointment: &Appointment) -> Result<(), AppointmentError> {
    let permitted = principal.is_admin()
        || principal.user_id == appointment.patient_id
        || principal.user_id == appointment.doctor_id;

    if permitted {
        Ok(())
    } else {
        Err(AppointmentError::Unauthorized)
    }
}

fn scope(requested: Option<Uuid>, own: Uuid) -> Result<Uuid, AppointmentError> {
    match requested {
        Some(id) if id != own => Err(AppointmentError::Unauthorized),
        _ => Ok(own),
    }
}
