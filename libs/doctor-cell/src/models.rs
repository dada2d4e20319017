use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;

// ==============================================================================
// WEEKLY AVAILABILITY
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    pub fn is_weekend(&self) -> bool {
        matches!(self, DayOfWeek::Saturday | DayOfWeek::Sunday)
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DayOfWeek::Monday => "monday",
            DayOfWeek::Tuesday => "tuesday",
            DayOfWeek::Wednesday => "wednesday",
            DayOfWeek::Thursday => "thursday",
            DayOfWeek::Friday => "friday",
            DayOfWeek::Saturday => "saturday",
            DayOfWeek::Sunday => "sunday",
        };
        write!(f, "{}", name)
    }
}

/// One recurring window of a doctor's week. At most one per (doctor, day).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeeklyAvailability {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: DayOfWeek,
    pub is_active: bool,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub updated_at: DateTime<Utc>,
}

impl WeeklyAvailability {
    pub const DEFAULT_START: (u32, u32) = (9, 0);
    pub const DEFAULT_END: (u32, u32) = (17, 0);

    /// Weekdays active 09:00-17:00, weekends inactive.
    pub fn default_for(doctor_id: Uuid, day_of_week: DayOfWeek) -> Self {
        let (start_h, start_m) = Self::DEFAULT_START;
        let (end_h, end_m) = Self::DEFAULT_END;

        Self {
            id: Uuid::new_v4(),
            doctor_id,
            day_of_week,
            is_active: !day_of_week.is_weekend(),
            start_time: NaiveTime::from_hms_opt(start_h, start_m, 0).unwrap_or(NaiveTime::MIN),
            end_time: NaiveTime::from_hms_opt(end_h, end_m, 0).unwrap_or(NaiveTime::MIN),
            updated_at: Utc::now(),
        }
    }

    pub fn from_entry(doctor_id: Uuid, entry: &AvailabilityEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            day_of_week: entry.day_of_week,
            is_active: entry.is_active,
            start_time: entry.start_time,
            end_time: entry.end_time,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityEntry {
    pub day_of_week: DayOfWeek,
    pub is_active: bool,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAvailabilityRequest {
    pub days: Vec<AvailabilityEntry>,
}

// ==============================================================================
// TIME SLOTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Open,
    Booked,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSlot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub slot_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: SlotStatus,
    pub appointment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl TimeSlot {
    pub fn starts_at(&self) -> DateTime<Utc> {
        NaiveDateTime::new(self.slot_date, self.start_time).and_utc()
    }

    pub fn is_open(&self) -> bool {
        self.status == SlotStatus::Open
    }
}

/// A slot the generator would emit, before it is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCandidate {
    pub doctor_id: Uuid,
    pub slot_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl SlotCandidate {
    pub fn starts_at(&self) -> DateTime<Utc> {
        NaiveDateTime::new(self.slot_date, self.start_time).and_utc()
    }

    pub fn overlaps(&self, slot: &TimeSlot) -> bool {
        self.doctor_id == slot.doctor_id
            && self.slot_date == slot.slot_date
            && self.start_time < slot.end_time
            && slot.start_time < self.end_time
    }

    pub fn materialize(&self, holder: Option<Uuid>) -> TimeSlot {
        TimeSlot {
            id: Uuid::new_v4(),
            doctor_id: self.doctor_id,
            slot_date: self.slot_date,
            start_time: self.start_time,
            end_time: self.end_time,
            status: if holder.is_some() { SlotStatus::Booked } else { SlotStatus::Open },
            appointment_id: holder,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotGenerationRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub slot_duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailableSlotsQuery {
    pub date: NaiveDate,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AvailabilityError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("Invalid slot duration: {0} minutes")]
    InvalidDuration(i64),

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Not permitted to manage this doctor's schedule")]
    Unauthorized,

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage rejected the request: {0}")]
    Storage(String),
}

impl From<StoreError> for AvailabilityError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => AvailabilityError::Unavailable(msg),
            other => AvailabilityError::Storage(other.to_string()),
        }
    }
}

impl From<AvailabilityError> for AppError {
    fn from(e: AvailabilityError) -> Self {
        match e {
            AvailabilityError::Validation(_)
            | AvailabilityError::InvalidRange(_)
            | AvailabilityError::InvalidDuration(_) => AppError::ValidationError(e.to_string()),
            AvailabilityError::DoctorNotFound => AppError::NotFound(e.to_string()),
            AvailabilityError::Unauthorized => AppError::Forbidden(e.to_string()),
            AvailabilityError::Unavailable(msg) => AppError::Unavailable(msg),
            AvailabilityError::Storage(msg) => AppError::Internal(msg),
        }
    }
}
