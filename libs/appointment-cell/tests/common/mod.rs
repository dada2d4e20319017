#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AuditRecord, BookAppointmentRequest, BookingPolicy};
use appointment_cell::services::{
    AppointmentOccupancy, AuditLog, AuditRepository, BookingService, InMemoryAppointmentRepository,
    InMemoryAuditRepository, LifecycleService, SchedulingContext, SchedulingLocks,
};
use appointment_cell::AppointmentCellState;
use doctor_cell::models::{AvailabilityEntry, DayOfWeek, SlotGenerationRequest, TimeSlot};
use doctor_cell::services::{
    AvailabilityService, InMemoryAvailabilityRepository, InMemorySlotRepository, SlotService,
};
use notification_cell::models::Notification;
use notification_cell::services::{
    ConnectionRegistry, InMemoryNotificationRepository, NotificationDispatcher, NotificationRepository,
};
use shared_config::AppConfig;
use shared_database::directory::InMemoryDirectory;
use shared_database::StoreError;
use shared_models::auth::Principal;
use shared_utils::test_utils::next_weekday;

/// Notification store whose inserts can be made to fail on demand.
#[derive(Default)]
pub struct FlakyNotificationRepository {
    inner: InMemoryNotificationRepository,
    failing: AtomicBool,
}

impl FlakyNotificationRepository {
    pub fn fail_inserts(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationRepository for FlakyNotificationRepository {
    async fn insert(&self, notification: Notification) -> Result<Notification, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("notifications offline".to_string()));
        }
        self.inner.insert(notification).await
    }

    async fn delete(&self, notification_id: Uuid) -> Result<(), StoreError> {
        self.inner.delete(notification_id).await
    }

    async fn get(&self, notification_id: Uuid) -> Result<Option<Notification>, StoreError> {
        self.inner.get(notification_id).await
    }

    async fn list_for_user(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>, StoreError> {
        self.inner.list_for_user(user_id, unread_only).await
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<usize, StoreError> {
        self.inner.count_unread(user_id).await
    }

    async fn mark_read(&self, notification_id: Uuid) -> Result<(), StoreError> {
        self.inner.mark_read(notification_id).await
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<usize, StoreError> {
        self.inner.mark_all_read(user_id).await
    }
}

/// Audit store whose inserts can be made to fail on demand.
#[derive(Default)]
pub struct FlakyAuditRepository {
    inner: InMemoryAuditRepository,
    failing: AtomicBool,
}

impl FlakyAuditRepository {
    pub fn fail_inserts(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditRepository for FlakyAuditRepository {
    async fn insert(&self, record: AuditRecord) -> Result<AuditRecord, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("audit log offline".to_string()));
        }
        self.inner.insert(record).await
    }

    async fn delete(&self, record_id: Uuid) -> Result<(), StoreError> {
        self.inner.delete(record_id).await
    }

    async fn list_for_appointment(&self, appointment_id: Uuid) -> Result<Vec<AuditRecord>, StoreError> {
        self.inner.list_for_appointment(appointment_id).await
    }
}

pub struct Clinic {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub other_patient_id: Uuid,
    pub monday: NaiveDate,
    pub directory: Arc<InMemoryDirectory>,
    pub appointments: Arc<InMemoryAppointmentRepository>,
    pub slot_repo: Arc<InMemorySlotRepository>,
    pub notifications: Arc<FlakyNotificationRepository>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub audit_repo: Arc<FlakyAuditRepository>,
    pub audit: Arc<AuditLog>,
    pub availability: Arc<AvailabilityService>,
    pub slots: Arc<SlotService>,
    pub booking: Arc<BookingService>,
    pub lifecycle: Arc<LifecycleService>,
}

impl Clinic {
    pub async fn new() -> Self {
        let doctor_id = Uuid::new_v4();
        let patient_id = Uuid::new_v4();
        let other_patient_id = Uuid::new_v4();

        let directory = Arc::new(InMemoryDirectory::new());
        directory.register_doctor(doctor_id).await;
        directory.register_patient(patient_id).await;
        directory.register_patient(other_patient_id).await;

        let appointments = Arc::new(InMemoryAppointmentRepository::new());
        let slot_repo = Arc::new(InMemorySlotRepository::new());
        let notifications = Arc::new(FlakyNotificationRepository::default());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            notifications.clone(),
            Arc::new(ConnectionRegistry::new(16)),
        ));

        let audit_repo = Arc::new(FlakyAuditRepository::default());
        let audit = Arc::new(AuditLog::new(audit_repo.clone()));

        let availability = Arc::new(AvailabilityService::new(
            Arc::new(InMemoryAvailabilityRepository::new()),
            directory.clone(),
        ));
        let slots = Arc::new(SlotService::new(
            availability.clone(),
            slot_repo.clone(),
            Arc::new(AppointmentOccupancy::new(appointments.clone())),
            30,
        ));

        let ctx = SchedulingContext {
            appointments: appointments.clone(),
            slots: slot_repo.clone(),
            directory: directory.clone(),
            dispatcher: dispatcher.clone(),
            audit: audit.clone(),
            locks: Arc::new(SchedulingLocks::new()),
        };
        let booking = Arc::new(BookingService::new(ctx.clone(), BookingPolicy::default()));
        let lifecycle = Arc::new(LifecycleService::new(ctx));

        Self {
            doctor_id,
            patient_id,
            other_patient_id,
            monday: next_weekday(Weekday::Mon),
            directory,
            appointments,
            slot_repo,
            notifications,
            dispatcher,
            audit_repo,
            audit,
            availability,
            slots,
            booking,
            lifecycle,
        }
    }

    /// Monday 09:00-10:00 in 30 minute slots, materialized.
    pub async fn with_monday_slots() -> Self {
        let clinic = Self::with_monday_availability().await;
        clinic.generate_monday_slots().await;
        clinic
    }

    /// Monday 09:00-10:00 active, no slots generated yet.
    pub async fn with_monday_availability() -> Self {
        let clinic = Self::new().await;
        let doctor = clinic.doctor();

        clinic
            .availability
            .set_weekly_availability(
                &doctor,
                clinic.doctor_id,
                vec![AvailabilityEntry {
                    day_of_week: DayOfWeek::Monday,
                    is_active: true,
                    start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                    end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                }],
            )
            .await
            .unwrap();

        clinic
    }

    pub async fn generate_monday_slots(&self) -> Vec<TimeSlot> {
        self.slots
            .generate_slots(
                &self.doctor(),
                self.doctor_id,
                SlotGenerationRequest {
                    start_date: self.monday,
                    end_date: self.monday,
                    slot_duration_minutes: Some(30),
                },
            )
            .await
            .unwrap()
    }

    pub fn doctor(&self) -> Principal {
        Principal::doctor(self.doctor_id)
    }

    pub fn patient(&self) -> Principal {
        Principal::patient(self.patient_id)
    }

    pub fn other_patient(&self) -> Principal {
        Principal::patient(self.other_patient_id)
    }

    pub fn at(&self, h: u32, m: u32) -> DateTime<Utc> {
        self.monday
            .and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
            .and_utc()
    }

    pub fn request_at(&self, h: u32, m: u32) -> BookAppointmentRequest {
        BookAppointmentRequest {
            patient_id: None,
            doctor_id: self.doctor_id,
            appointment_date: self.at(h, m),
            notes: Some("Follow-up".to_string()),
        }
    }

    pub async fn book_as_patient(&self, h: u32, m: u32) -> Appointment {
        self.booking
            .book_appointment(&self.patient(), self.request_at(h, m))
            .await
            .unwrap()
    }

    pub async fn available_starts(&self) -> Vec<NaiveTime> {
        self.slots
            .get_available_slots(self.doctor_id, self.monday)
            .await
            .unwrap()
            .iter()
            .map(|s: &TimeSlot| s.start_time)
            .collect()
    }

    pub fn state(&self, config: Arc<AppConfig>) -> AppointmentCellState {
        AppointmentCellState {
            config,
            booking: self.booking.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}

pub fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}
