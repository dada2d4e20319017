use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use notification_cell::NotificationError;
use shared_database::StoreError;
use shared_models::error::AppError;

// ==============================================================================
// APPOINTMENT STATUS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Canceled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Canceled => write!(f, "canceled"),
        }
    }
}

impl AppointmentStatus {
    pub fn valid_transitions(&self) -> &'static [AppointmentStatus] {
        match self {
            AppointmentStatus::Scheduled => &[
                AppointmentStatus::Confirmed,
                AppointmentStatus::Canceled,
                AppointmentStatus::Completed,
            ],
            AppointmentStatus::Confirmed => &[AppointmentStatus::Completed, AppointmentStatus::Canceled],
            // Terminal states
            AppointmentStatus::Completed | AppointmentStatus::Canceled => &[],
        }
    }

    /// Re-requesting the current status is never a valid transition.
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }

    /// Whether an appointment in this status holds its (doctor, instant).
    pub fn holds_instant(&self) -> bool {
        *self != AppointmentStatus::Canceled
    }
}

// ==============================================================================
// APPOINTMENT
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub appointment_code: String,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    /// The materialized slot this booking claimed, if any.
    pub time_slot_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    /// Required when a doctor or admin books on a patient's behalf.
    pub patient_id: Option<Uuid>,
    pub doctor_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentSearchQuery {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

/// Store-level filter. Instants are half-open: `[from, to)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentFilter {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AppointmentFilter {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.doctor_id.map_or(true, |id| appointment.doctor_id == id)
            && self.patient_id.map_or(true, |id| appointment.patient_id == id)
            && self.status.map_or(true, |s| appointment.status == s)
            && self.from.map_or(true, |from| appointment.appointment_date >= from)
            && self.to.map_or(true, |to| appointment.appointment_date < to)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BookingPolicy {
    pub allow_past_bookings: bool,
}

// ==============================================================================
// AUDIT TRAIL
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    AppointmentCreated,
    AppointmentStatusUpdated,
    AppointmentDeleted,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditAction::AppointmentCreated => write!(f, "APPOINTMENT_CREATED"),
            AuditAction::AppointmentStatusUpdated => write!(f, "APPOINTMENT_STATUS_UPDATED"),
            AuditAction::AppointmentDeleted => write!(f, "APPOINTMENT_DELETED"),
        }
    }
}

/// Durable record of who changed an appointment and how. Outlives the
/// appointment itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub action: AuditAction,
    pub appointment_id: Uuid,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(actor_id: Uuid, action: AuditAction, appointment_id: Uuid, details: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id,
            action,
            appointment_id,
            details: details.into(),
            created_at: Utc::now(),
        }
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Doctor already has an appointment at this time")]
    SlotConflict,

    #[error("Cannot move appointment from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Storage refused the write or returned something unreadable. Retrying will not help.
    #[error("Storage rejected the request: {0}")]
    Storage(String),
}

impl From<StoreError> for AppointmentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => AppointmentError::Unavailable(msg),
            other => AppointmentError::Storage(other.to_string()),
        }
    }
}

impl From<NotificationError> for AppointmentError {
    fn from(e: NotificationError) -> Self {
        match e {
            NotificationError::Unavailable(msg) => AppointmentError::Unavailable(msg),
            other => AppointmentError::Storage(other.to_string()),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::Validation(_) => AppError::ValidationError(e.to_string()),
            AppointmentError::NotFound
            | AppointmentError::DoctorNotFound
            | AppointmentError::PatientNotFound => AppError::NotFound(e.to_string()),
            AppointmentError::SlotConflict => AppError::Conflict(e.to_string()),
            AppointmentError::InvalidTransition { .. } => AppError::InvalidTransition(e.to_string()),
            AppointmentError::Unauthorized => AppError::Forbidden(e.to_string()),
            AppointmentError::Unavailable(msg) => AppError::Unavailable(msg),
            AppointmentError::Storage(msg) => AppError::Internal(msg),
        }
    }
}
