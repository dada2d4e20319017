use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use doctor_cell::services::SlotOccupancy;
use shared_database::supabase::{return_representation, SupabaseClient};
use shared_database::StoreError;

use crate::models::{Appointment, AppointmentFilter, AppointmentStatus};

/// Unique index over (doctor_id, appointment_date) for non-canceled rows.
pub const ACTIVE_SLOT_CONSTRAINT: &str = "appointments_active_slot_key";
pub const CODE_CONSTRAINT: &str = "appointments_code_key";

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    /// Fails with `StoreError::Conflict(ACTIVE_SLOT_CONSTRAINT)` when a
    /// non-canceled appointment already holds the doctor's instant, and with
    /// `StoreError::Conflict(CODE_CONSTRAINT)` on a duplicate code.
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, StoreError>;

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError>;

    async fn find_by_code(&self, code: &str) -> Result<Option<Appointment>, StoreError>;

    /// Compare-and-set. Returns `None` if the stored status was not `expected`.
    async fn update_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Appointment>, StoreError>;

    async fn delete(&self, appointment_id: Uuid) -> Result<bool, StoreError>;

    /// Ordered by appointment instant.
    async fn search(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError>;

    /// Instants in `[from, to)` held by non-canceled appointments of the doctor.
    async fn held_instants(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HashMap<DateTime<Utc>, Uuid>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryAppointmentRepository {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        let mut appointments = self.appointments.write().await;

        if appointments
            .values()
            .any(|a| a.appointment_code == appointment.appointment_code)
        {
            return Err(StoreError::Conflict(CODE_CONSTRAINT.to_string()));
        }

        if appointment.status.holds_instant()
            && appointments.values().any(|a| {
                a.doctor_id == appointment.doctor_id
                    && a.appointment_date == appointment.appointment_date
                    && a.status.holds_instant()
            })
        {
            return Err(StoreError::Conflict(ACTIVE_SLOT_CONSTRAINT.to_string()));
        }

        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.appointments.read().await.get(&appointment_id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Appointment>, StoreError> {
        let appointments = self.appointments.read().await;
        Ok(appointments
            .values()
            .find(|a| a.appointment_code == code)
            .cloned())
    }

    async fn update_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Appointment>, StoreError> {
        let mut appointments = self.appointments.write().await;
        match appointments.get_mut(&appointment_id) {
            Some(appointment) if appointment.status == expected => {
                appointment.status = next;
                appointment.updated_at = updated_at;
                Ok(Some(appointment.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, appointment_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.appointments.write().await.remove(&appointment_id).is_some())
    }

    async fn search(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let appointments = self.appointments.read().await;
        let mut found: Vec<Appointment> = appointments
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.appointment_date, a.created_at));
        Ok(found)
    }

    async fn held_instants(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HashMap<DateTime<Utc>, Uuid>, StoreError> {
        let appointments = self.appointments.read().await;
        Ok(appointments
            .values()
            .filter(|a| {
                a.doctor_id == doctor_id
                    && a.status.holds_instant()
                    && a.appointment_date >= from
                    && a.appointment_date < to
            })
            .map(|a| (a.appointment_date, a.id))
            .collect())
    }
}

/// PostgREST-backed store over the `appointments` table.
pub struct SupabaseAppointmentRepository {
    supabase: SupabaseClient,
}

#[derive(Deserialize)]
struct HeldRow {
    id: Uuid,
    appointment_date: DateTime<Utc>,
}

impl SupabaseAppointmentRepository {
    pub fn new(supabase: SupabaseClient) -> Self {
        Self { supabase }
    }

    fn instant_param(at: DateTime<Utc>) -> String {
        urlencoding::encode(&at.to_rfc3339_opts(SecondsFormat::Secs, true)).into_owned()
    }

    async fn first(&self, path: &str) -> Result<Option<Appointment>, StoreError> {
        let rows: Vec<Appointment> = self.supabase.request(Method::GET, path, None).await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl AppointmentRepository for SupabaseAppointmentRepository {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(serde_json::to_value(&appointment)?),
                Some(return_representation()),
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Serialization("Insert returned no appointment".to_string()))
    }

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        self.first(&format!("/rest/v1/appointments?id=eq.{}", appointment_id))
            .await
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Appointment>, StoreError> {
        self.first(&format!(
            "/rest/v1/appointments?appointment_code=eq.{}",
            urlencoding::encode(code)
        ))
        .await
    }

    async fn update_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Appointment>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment_id, expected
        );
        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(json!({ "status": next, "updated_at": updated_at.to_rfc3339() })),
                Some(return_representation()),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn delete(&self, appointment_id: Uuid) -> Result<bool, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(Method::DELETE, &path, None, Some(return_representation()))
            .await?;
        Ok(!rows.is_empty())
    }

    async fn search(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let mut query_parts = Vec::new();

        if let Some(doctor_id) = filter.doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(patient_id) = filter.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(status) = filter.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from) = filter.from {
            query_parts.push(format!("appointment_date=gte.{}", Self::instant_param(from)));
        }
        if let Some(to) = filter.to {
            query_parts.push(format!("appointment_date=lt.{}", Self::instant_param(to)));
        }
        query_parts.push("order=appointment_date.asc".to_string());

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));
        self.supabase.request(Method::GET, &path, None).await
    }

    async fn held_instants(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HashMap<DateTime<Utc>, Uuid>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=neq.canceled&appointment_date=gte.{}&appointment_date=lt.{}&select=id,appointment_date",
            doctor_id,
            Self::instant_param(from),
            Self::instant_param(to)
        );
        let rows: Vec<HeldRow> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(rows.into_iter().map(|r| (r.appointment_date, r.id)).collect())
    }
}

/// Lets slot views consult the same occupancy the booking path enforces.
pub struct AppointmentOccupancy {
    repository: Arc<dyn AppointmentRepository>,
}

impl AppointmentOccupancy {
    pub fn new(repository: Arc<dyn AppointmentRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl SlotOccupancy for AppointmentOccupancy {
    async fn occupied(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HashMap<DateTime<Utc>, Uuid>, StoreError> {
        self.repository.held_instants(doctor_id, from, to).await
    }
}
