use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::directory::Directory;
use shared_database::supabase::{prefer, SupabaseClient};
use shared_database::StoreError;
use shared_models::auth::{Principal, Role};

use crate::models::{AvailabilityEntry, AvailabilityError, DayOfWeek, WeeklyAvailability};

#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<WeeklyAvailability>, StoreError>;

    /// Insert or replace the (doctor, day) records given.
    async fn upsert(&self, rows: Vec<WeeklyAvailability>) -> Result<(), StoreError>;

    /// Insert the given records, leaving any (doctor, day) that already exists untouched.
    async fn insert_missing(&self, rows: Vec<WeeklyAvailability>) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct InMemoryAvailabilityRepository {
    rows: RwLock<HashMap<(Uuid, DayOfWeek), WeeklyAvailability>>,
}

impl InMemoryAvailabilityRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AvailabilityRepository for InMemoryAvailabilityRepository {
    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<WeeklyAvailability>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|r| r.doctor_id == doctor_id)
            .cloned()
            .collect())
    }

    async fn upsert(&self, rows: Vec<WeeklyAvailability>) -> Result<(), StoreError> {
        let mut stored = self.rows.write().await;
        for mut row in rows {
            let key = (row.doctor_id, row.day_of_week);
            if let Some(existing) = stored.get(&key) {
                row.id = existing.id;
            }
            stored.insert(key, row);
        }
        Ok(())
    }

    async fn insert_missing(&self, rows: Vec<WeeklyAvailability>) -> Result<(), StoreError> {
        let mut stored = self.rows.write().await;
        for row in rows {
            stored.entry((row.doctor_id, row.day_of_week)).or_insert(row);
        }
        Ok(())
    }
}

/// PostgREST-backed store over the `weekly_availability` table.
pub struct SupabaseAvailabilityRepository {
    supabase: SupabaseClient,
}

impl SupabaseAvailabilityRepository {
    const UPSERT_PATH: &'static str = "/rest/v1/weekly_availability?on_conflict=doctor_id,day_of_week";

    pub fn new(supabase: SupabaseClient) -> Self {
        Self { supabase }
    }

    // The id is left to the database so a merge never rewrites the key.
    fn payload(rows: &[WeeklyAvailability]) -> Value {
        Value::Array(
            rows.iter()
                .map(|r| {
                    json!({
                        "doctor_id": r.doctor_id,
                        "day_of_week": r.day_of_week,
                        "is_active": r.is_active,
                        "start_time": r.start_time.format("%H:%M:%S").to_string(),
                        "end_time": r.end_time.format("%H:%M:%S").to_string(),
                        "updated_at": r.updated_at.to_rfc3339(),
                    })
                })
                .collect(),
        )
    }
}

#[async_trait]
impl AvailabilityRepository for SupabaseAvailabilityRepository {
    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<WeeklyAvailability>, StoreError> {
        let path = format!("/rest/v1/weekly_availability?doctor_id=eq.{}", doctor_id);
        self.supabase.request(Method::GET, &path, None).await
    }

    async fn upsert(&self, rows: Vec<WeeklyAvailability>) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let _: Value = self
            .supabase
            .request_with_headers(
                Method::POST,
                Self::UPSERT_PATH,
                Some(Self::payload(&rows)),
                Some(prefer("resolution=merge-duplicates,return=representation")),
            )
            .await?;
        Ok(())
    }

    async fn insert_missing(&self, rows: Vec<WeeklyAvailability>) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let _: Value = self
            .supabase
            .request_with_headers(
                Method::POST,
                Self::UPSERT_PATH,
                Some(Self::payload(&rows)),
                Some(prefer("resolution=ignore-duplicates,return=representation")),
            )
            .await?;
        Ok(())
    }
}

pub struct AvailabilityService {
    repository: Arc<dyn AvailabilityRepository>,
    directory: Arc<dyn Directory>,
}

impl AvailabilityService {
    pub fn new(repository: Arc<dyn AvailabilityRepository>, directory: Arc<dyn Directory>) -> Self {
        Self { repository, directory }
    }

    /// The doctor's full week, Monday first. Days never configured are
    /// created with the default window and persisted on first read.
    pub async fn get_weekly_availability(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<WeeklyAvailability>, AvailabilityError> {
        self.ensure_doctor(doctor_id).await?;

        let mut rows = self.repository.list_for_doctor(doctor_id).await?;

        let present: HashSet<DayOfWeek> = rows.iter().map(|r| r.day_of_week).collect();
        let missing: Vec<WeeklyAvailability> = DayOfWeek::ALL
            .iter()
            .filter(|day| !present.contains(day))
            .map(|day| WeeklyAvailability::default_for(doctor_id, *day))
            .collect();

        if !missing.is_empty() {
            debug!("Filling {} default availability days for doctor {}", missing.len(), doctor_id);
            self.repository.insert_missing(missing).await?;
            rows = self.repository.list_for_doctor(doctor_id).await?;
        }

        rows.sort_by_key(|r| r.day_of_week);
        Ok(rows)
    }

    /// Upsert the listed days. Unlisted days keep their current record.
    pub async fn set_weekly_availability(
        &self,
        principal: &Principal,
        doctor_id: Uuid,
        entries: Vec<AvailabilityEntry>,
    ) -> Result<Vec<WeeklyAvailability>, AvailabilityError> {
        authorize_schedule_owner(principal, doctor_id)?;
        validate_entries(&entries)?;
        self.ensure_doctor(doctor_id).await?;

        let now = Utc::now();
        let rows: Vec<WeeklyAvailability> = entries
            .iter()
            .map(|entry| WeeklyAvailability {
                updated_at: now,
                ..WeeklyAvailability::from_entry(doctor_id, entry)
            })
            .collect();

        self.repository.upsert(rows).await?;
        info!("Weekly availability updated for doctor {} ({} days)", doctor_id, entries.len());

        self.get_weekly_availability(doctor_id).await
    }

    pub(crate) async fn ensure_doctor(&self, doctor_id: Uuid) -> Result<(), AvailabilityError> {
        if self.directory.doctor_exists(doctor_id).await? {
            Ok(())
        } else {
            Err(AvailabilityError::DoctorNotFound)
        }
    }
}

/// Only the doctor who owns the schedule, or an admin, may change it.
pub fn authorize_schedule_owner(principal: &Principal, doctor_id: Uuid) -> Result<(), AvailabilityError> {
    let permitted = principal.is_admin()
        || (principal.role == Role::Doctor && principal.user_id == doctor_id);

    if permitted {
        Ok(())
    } else {
        Err(AvailabilityError::Unauthorized)
    }
}

fn validate_entries(entries: &[AvailabilityEntry]) -> Result<(), AvailabilityError> {
    if entries.is_empty() {
        return Err(AvailabilityError::Validation("At least one day is required".to_string()));
    }

    let mut seen = HashSet::new();
    for entry in entries {
        if !seen.insert(entry.day_of_week) {
            return Err(AvailabilityError::Validation(format!(
                "Day {} is listed more than once",
                entry.day_of_week
            )));
        }

        if entry.is_active && entry.start_time >= entry.end_time {
            return Err(AvailabilityError::Validation(format!(
                "Start time must be before end time on {}",
                entry.day_of_week
            )));
        }
    }

    Ok(())
}
