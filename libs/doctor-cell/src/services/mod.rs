pub mod availability;
pub mod generator;
pub mod slots;

pub use availability::{
    AvailabilityRepository, AvailabilityService, InMemoryAvailabilityRepository,
    SupabaseAvailabilityRepository,
};
pub use generator::generate_candidates;
pub use slots::{InMemorySlotRepository, SlotOccupancy, SlotRepository, SlotService, SupabaseSlotRepository};
