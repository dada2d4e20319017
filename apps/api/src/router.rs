use std::sync::Arc;

use axum::{routing::get, Router};
use tracing::{info, warn};

use appointment_cell::models::BookingPolicy;
use appointment_cell::services::{
    AppointmentOccupancy, AppointmentRepository, AuditLog, AuditRepository, BookingService,
    InMemoryAppointmentRepository, InMemoryAuditRepository, LifecycleService, SchedulingContext,
    SchedulingLocks, SupabaseAppointmentRepository, SupabaseAuditRepository,
};
use appointment_cell::{appointment_routes, AppointmentCellState};
use doctor_cell::services::{
    AvailabilityRepository, AvailabilityService, InMemoryAvailabilityRepository, InMemorySlotRepository,
    SlotRepository, SlotService, SupabaseAvailabilityRepository, SupabaseSlotRepository,
};
use doctor_cell::{doctor_routes, DoctorCellState};
use notification_cell::services::{
    ConnectionRegistry, InMemoryNotificationRepository, NotificationDispatcher, NotificationRepository,
    SupabaseNotificationRepository,
};
use notification_cell::{notification_routes, NotificationCellState};
use shared_config::AppConfig;
use shared_database::directory::{Directory, InMemoryDirectory, SupabaseDirectory};
use shared_database::supabase::SupabaseClient;

/// The persistence seams every cell is wired against.
struct Stores {
    availability: Arc<dyn AvailabilityRepository>,
    slots: Arc<dyn SlotRepository>,
    appointments: Arc<dyn AppointmentRepository>,
    notifications: Arc<dyn NotificationRepository>,
    audit: Arc<dyn AuditRepository>,
    directory: Arc<dyn Directory>,
}

impl Stores {
    fn from_config(config: &AppConfig) -> Self {
        if config.is_configured() {
            info!("Using Supabase storage at {}", config.supabase_url);
            let supabase = SupabaseClient::new(config);
            Self {
                availability: Arc::new(SupabaseAvailabilityRepository::new(supabase.clone())),
                slots: Arc::new(SupabaseSlotRepository::new(supabase.clone())),
                appointments: Arc::new(SupabaseAppointmentRepository::new(supabase.clone())),
                notifications: Arc::new(SupabaseNotificationRepository::new(supabase.clone())),
                audit: Arc::new(SupabaseAuditRepository::new(supabase.clone())),
                directory: Arc::new(SupabaseDirectory::new(supabase)),
            }
        } else {
            warn!("Supabase not configured; using in-memory storage that accepts any doctor or patient id");
            Self {
                availability: Arc::new(InMemoryAvailabilityRepository::new()),
                slots: Arc::new(InMemorySlotRepository::new()),
                appointments: Arc::new(InMemoryAppointmentRepository::new()),
                notifications: Arc::new(InMemoryNotificationRepository::new()),
                audit: Arc::new(InMemoryAuditRepository::new()),
                directory: Arc::new(InMemoryDirectory::permissive()),
            }
        }
    }
}

pub fn create_router(config: Arc<AppConfig>) -> Router {
    let stores = Stores::from_config(&config);

    let dispatcher = Arc::new(NotificationDispatcher::new(
        stores.notifications,
        Arc::new(ConnectionRegistry::new(config.notification_channel_capacity)),
    ));

    let availability = Arc::new(AvailabilityService::new(
        stores.availability,
        stores.directory.clone(),
    ));
    let slots = Arc::new(SlotService::new(
        availability.clone(),
        stores.slots.clone(),
        Arc::new(AppointmentOccupancy::new(stores.appointments.clone())),
        config.default_slot_duration_minutes,
    ));

    let ctx = SchedulingContext {
        appointments: stores.appointments,
        slots: stores.slots,
        directory: stores.directory,
        dispatcher: dispatcher.clone(),
        audit: Arc::new(AuditLog::new(stores.audit)),
        locks: Arc::new(SchedulingLocks::new()),
    };
    let policy = BookingPolicy {
        allow_past_bookings: config.allow_past_bookings,
    };

    let doctor_state = DoctorCellState {
        config: config.clone(),
        availability,
        slots,
    };
    let appointment_state = AppointmentCellState {
        config: config.clone(),
        booking: Arc::new(BookingService::new(ctx.clone(), policy)),
        lifecycle: Arc::new(LifecycleService::new(ctx)),
    };
    let notification_state = NotificationCellState {
        config,
        dispatcher,
    };

    Router::new()
        .route("/", get(|| async { "Clinic scheduler API is running!" }))
        .nest("/doctors", doctor_routes(doctor_state))
        .nest("/appointments", appointment_routes(appointment_state))
        .nest("/notifications", notification_routes(notification_state))
}
