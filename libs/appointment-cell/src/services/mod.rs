pub mod audit;
pub mod booking;
pub mod context;
pub mod lifecycle;
pub mod locks;
pub mod repository;

pub use audit::{AuditLog, AuditRepository, InMemoryAuditRepository, SupabaseAuditRepository};
pub use booking::{generate_appointment_code, BookingService};
pub use context::SchedulingContext;
pub use lifecycle::LifecycleService;
pub use locks::SchedulingLocks;
pub use repository::{
    AppointmentOccupancy, AppointmentRepository, InMemoryAppointmentRepository,
    SupabaseAppointmentRepository, ACTIVE_SLOT_CONSTRAINT, CODE_CONSTRAINT,
};
