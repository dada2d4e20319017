#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use doctor_cell::services::{
    AvailabilityService, InMemoryAvailabilityRepository, InMemorySlotRepository, SlotOccupancy,
    SlotService,
};
use doctor_cell::DoctorCellState;
use shared_config::AppConfig;
use shared_database::directory::InMemoryDirectory;
use shared_database::StoreError;

/// Occupancy the test controls directly.
#[derive(Default)]
pub struct FakeOccupancy {
    held: RwLock<HashMap<(Uuid, DateTime<Utc>), Uuid>>,
}

impl FakeOccupancy {
    pub async fn hold(&self, doctor_id: Uuid, at: DateTime<Utc>, appointment_id: Uuid) {
        self.held.write().await.insert((doctor_id, at), appointment_id);
    }

    pub async fn free(&self, doctor_id: Uuid, at: DateTime<Utc>) {
        self.held.write().await.remove(&(doctor_id, at));
    }
}

#[async_trait]
impl SlotOccupancy for FakeOccupancy {
    async fn occupied(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HashMap<DateTime<Utc>, Uuid>, StoreError> {
        let held = self.held.read().await;
        Ok(held
            .iter()
            .filter(|((doctor, at), _)| *doctor == doctor_id && *at >= from && *at < to)
            .map(|((_, at), id)| (*at, *id))
            .collect())
    }
}

pub struct Harness {
    pub directory: Arc<InMemoryDirectory>,
    pub availability_repo: Arc<InMemoryAvailabilityRepository>,
    pub slot_repo: Arc<InMemorySlotRepository>,
    pub occupancy: Arc<FakeOccupancy>,
    pub availability: Arc<AvailabilityService>,
    pub slots: Arc<SlotService>,
}

impl Harness {
    pub fn new() -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        let availability_repo = Arc::new(InMemoryAvailabilityRepository::new());
        let slot_repo = Arc::new(InMemorySlotRepository::new());
        let occupancy = Arc::new(FakeOccupancy::default());

        let availability = Arc::new(AvailabilityService::new(
            availability_repo.clone(),
            directory.clone(),
        ));
        let slots = Arc::new(SlotService::new(
            availability.clone(),
            slot_repo.clone(),
            occupancy.clone(),
            30,
        ));

        Self {
            directory,
            availability_repo,
            slot_repo,
            occupancy,
            availability,
            slots,
        }
    }

    pub async fn with_doctor() -> (Self, Uuid) {
        let harness = Self::new();
        let doctor_id = Uuid::new_v4();
        harness.directory.register_doctor(doctor_id).await;
        (harness, doctor_id)
    }

    pub fn state(&self, config: Arc<AppConfig>) -> DoctorCellState {
        DoctorCellState {
            config,
            availability: self.availability.clone(),
            slots: self.slots.clone(),
        }
    }
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn at(date: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
    date.and_time(time(h, m)).and_utc()
}
