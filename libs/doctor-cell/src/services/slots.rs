use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::supabase::{prefer, return_representation, SupabaseClient};
use shared_database::StoreError;
use shared_models::auth::Principal;

use crate::models::{AvailabilityError, SlotGenerationRequest, SlotStatus, TimeSlot};
use crate::services::availability::{authorize_schedule_owner, AvailabilityService};
use crate::services::generator::{generate_candidates, validate_generation};

#[async_trait]
pub trait SlotRepository: Send + Sync {
    /// Slots with `slot_date` in `[from, to]`, ordered by date then start time.
    async fn list_range(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TimeSlot>, StoreError>;

    /// Append slots, silently skipping any (doctor, date, start) already stored.
    async fn insert_many(&self, slots: Vec<TimeSlot>) -> Result<(), StoreError>;

    async fn find_at(
        &self,
        doctor_id: Uuid,
        slot_date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<Option<TimeSlot>, StoreError>;

    /// Flip an OPEN slot to BOOKED for `appointment_id`. False if it was not OPEN.
    async fn claim(&self, slot_id: Uuid, appointment_id: Uuid) -> Result<bool, StoreError>;

    /// Reopen a slot, but only while `appointment_id` still holds it.
    async fn release(&self, slot_id: Uuid, appointment_id: Uuid) -> Result<bool, StoreError>;
}

/// Which instants of a doctor's calendar are held by live appointments.
/// Implemented by the appointment store so slot views and booking share
/// the same conflict check.
#[async_trait]
pub trait SlotOccupancy: Send + Sync {
    /// Instants in `[from, to)` held by a non-canceled appointment, mapped to its id.
    async fn occupied(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HashMap<DateTime<Utc>, Uuid>, StoreError>;
}

#[derive(Default)]
pub struct InMemorySlotRepository {
    slots: RwLock<HashMap<Uuid, TimeSlot>>,
}

impl InMemorySlotRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SlotRepository for InMemorySlotRepository {
    async fn list_range(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TimeSlot>, StoreError> {
        let slots = self.slots.read().await;
        let mut found: Vec<TimeSlot> = slots
            .values()
            .filter(|s| s.doctor_id == doctor_id && s.slot_date >= from && s.slot_date <= to)
            .cloned()
            .collect();
        found.sort_by_key(|s| (s.slot_date, s.start_time));
        Ok(found)
    }

    async fn insert_many(&self, new_slots: Vec<TimeSlot>) -> Result<(), StoreError> {
        let mut slots = self.slots.write().await;
        for slot in new_slots {
            let taken = slots.values().any(|s| {
                s.doctor_id == slot.doctor_id
                    && s.slot_date == slot.slot_date
                    && s.start_time == slot.start_time
            });
            if !taken {
                slots.insert(slot.id, slot);
            }
        }
        Ok(())
    }

    async fn find_at(
        &self,
        doctor_id: Uuid,
        slot_date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<Option<TimeSlot>, StoreError> {
        let slots = self.slots.read().await;
        Ok(slots
            .values()
            .find(|s| s.doctor_id == doctor_id && s.slot_date == slot_date && s.start_time == start_time)
            .cloned())
    }

    async fn claim(&self, slot_id: Uuid, appointment_id: Uuid) -> Result<bool, StoreError> {
        let mut slots = self.slots.write().await;
        match slots.get_mut(&slot_id) {
            Some(slot) if slot.is_open() => {
                slot.status = SlotStatus::Booked;
                slot.appointment_id = Some(appointment_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, slot_id: Uuid, appointment_id: Uuid) -> Result<bool, StoreError> {
        let mut slots = self.slots.write().await;
        match slots.get_mut(&slot_id) {
            Some(slot) if slot.appointment_id == Some(appointment_id) => {
                slot.status = SlotStatus::Open;
                slot.appointment_id = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// PostgREST-backed store over the `time_slots` table.
pub struct SupabaseSlotRepository {
    supabase: SupabaseClient,
}

impl SupabaseSlotRepository {
    pub fn new(supabase: SupabaseClient) -> Self {
        Self { supabase }
    }

    fn time_param(time: NaiveTime) -> String {
        time.format("%H:%M:%S").to_string()
    }
}

#[async_trait]
impl SlotRepository for SupabaseSlotRepository {
    async fn list_range(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TimeSlot>, StoreError> {
        let path = format!(
            "/rest/v1/time_slots?doctor_id=eq.{}&slot_date=gte.{}&slot_date=lte.{}&order=slot_date.asc,start_time.asc",
            doctor_id, from, to
        );
        self.supabase.request(Method::GET, &path, None).await
    }

    async fn insert_many(&self, slots: Vec<TimeSlot>) -> Result<(), StoreError> {
        if slots.is_empty() {
            return Ok(());
        }

        let payload: Vec<Value> = slots
            .iter()
            .map(|s| {
                json!({
                    "id": s.id,
                    "doctor_id": s.doctor_id,
                    "slot_date": s.slot_date,
                    "start_time": Self::time_param(s.start_time),
                    "end_time": Self::time_param(s.end_time),
                    "status": s.status,
                    "appointment_id": s.appointment_id,
                    "created_at": s.created_at.to_rfc3339(),
                })
            })
            .collect();

        let _: Value = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/time_slots?on_conflict=doctor_id,slot_date,start_time",
                Some(Value::Array(payload)),
                Some(prefer("resolution=ignore-duplicates,return=representation")),
            )
            .await?;
        Ok(())
    }

    async fn find_at(
        &self,
        doctor_id: Uuid,
        slot_date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<Option<TimeSlot>, StoreError> {
        let path = format!(
            "/rest/v1/time_slots?doctor_id=eq.{}&slot_date=eq.{}&start_time=eq.{}",
            doctor_id,
            slot_date,
            Self::time_param(start_time)
        );
        let rows: Vec<TimeSlot> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(rows.into_iter().next())
    }

    async fn claim(&self, slot_id: Uuid, appointment_id: Uuid) -> Result<bool, StoreError> {
        let path = format!("/rest/v1/time_slots?id=eq.{}&status=eq.open", slot_id);
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(json!({ "status": SlotStatus::Booked, "appointment_id": appointment_id })),
                Some(return_representation()),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn release(&self, slot_id: Uuid, appointment_id: Uuid) -> Result<bool, StoreError> {
        let path = format!(
            "/rest/v1/time_slots?id=eq.{}&appointment_id=eq.{}",
            slot_id, appointment_id
        );
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(json!({ "status": SlotStatus::Open, "appointment_id": null })),
                Some(return_representation()),
            )
            .await?;
        Ok(!rows.is_empty())
    }
}

pub struct SlotService {
    availability: Arc<AvailabilityService>,
    slots: Arc<dyn SlotRepository>,
    occupancy: Arc<dyn SlotOccupancy>,
    default_duration_minutes: i64,
}

impl SlotService {
    pub fn new(
        availability: Arc<AvailabilityService>,
        slots: Arc<dyn SlotRepository>,
        occupancy: Arc<dyn SlotOccupancy>,
        default_duration_minutes: i64,
    ) -> Self {
        Self {
            availability,
            slots,
            occupancy,
            default_duration_minutes,
        }
    }

    /// Materialize the doctor's template into slots for the range and return
    /// every slot stored for it. Re-running never duplicates a slot, and a
    /// candidate overlapping an existing slot of different bounds is skipped.
    /// Instants already held by an appointment are stored as BOOKED.
    pub async fn generate_slots(
        &self,
        principal: &Principal,
        doctor_id: Uuid,
        request: SlotGenerationRequest,
    ) -> Result<Vec<TimeSlot>, AvailabilityError> {
        authorize_schedule_owner(principal, doctor_id)?;

        let duration = request
            .slot_duration_minutes
            .unwrap_or(self.default_duration_minutes);
        validate_generation(request.start_date, request.end_date, duration)?;

        let template = self.availability.get_weekly_availability(doctor_id).await?;
        let candidates = generate_candidates(
            doctor_id,
            &template,
            request.start_date,
            request.end_date,
            duration,
        )?;

        let existing = self
            .slots
            .list_range(doctor_id, request.start_date, request.end_date)
            .await?;
        let (from, to) = day_bounds(request.start_date, request.end_date);
        let held = self.occupancy.occupied(doctor_id, from, to).await?;

        let fresh: Vec<TimeSlot> = candidates
            .iter()
            .filter(|c| !existing.iter().any(|s| c.overlaps(s)))
            .map(|c| c.materialize(held.get(&c.starts_at()).copied()))
            .collect();

        info!(
            "Generating {} new slots for doctor {} ({} to {}, {} min, {} candidates)",
            fresh.len(),
            doctor_id,
            request.start_date,
            request.end_date,
            duration,
            candidates.len()
        );
        self.slots.insert_many(fresh).await?;

        Ok(self
            .slots
            .list_range(doctor_id, request.start_date, request.end_date)
            .await?)
    }

    /// OPEN slots on `date` whose instant no live appointment holds, in start order.
    pub async fn get_available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, AvailabilityError> {
        self.availability.ensure_doctor(doctor_id).await?;

        let slots = self.slots.list_range(doctor_id, date, date).await?;
        let (from, to) = day_bounds(date, date);
        let held = self.occupancy.occupied(doctor_id, from, to).await?;

        let available: Vec<TimeSlot> = slots
            .into_iter()
            .filter(|s| s.is_open() && !held.contains_key(&s.starts_at()))
            .collect();

        debug!("{} open slots for doctor {} on {}", available.len(), doctor_id, date);
        Ok(available)
    }
}

fn day_bounds(from: NaiveDate, to: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = from.and_time(NaiveTime::MIN).and_utc();
    let end = (to + Duration::days(1)).and_time(NaiveTime::MIN).and_utc();
    (start, end)
}
