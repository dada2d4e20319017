use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::supabase::SupabaseClient;

/// Read-only view of the doctor and patient directories owned by the
/// surrounding CRUD application. Only existence by id is needed here.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn doctor_exists(&self, doctor_id: Uuid) -> Result<bool, StoreError>;
    async fn patient_exists(&self, patient_id: Uuid) -> Result<bool, StoreError>;
}

pub struct SupabaseDirectory {
    supabase: SupabaseClient,
}

impl SupabaseDirectory {
    pub fn new(supabase: SupabaseClient) -> Self {
        Self { supabase }
    }

    async fn exists(&self, table: &str, id: Uuid) -> Result<bool, StoreError> {
        let path = format!("/rest/v1/{}?id=eq.{}&select=id", table, id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;
        debug!("Directory lookup {} {} -> {}", table, id, !rows.is_empty());
        Ok(!rows.is_empty())
    }
}

#[async_trait]
impl Directory for SupabaseDirectory {
    async fn doctor_exists(&self, doctor_id: Uuid) -> Result<bool, StoreError> {
        self.exists("doctors", doctor_id).await
    }

    async fn patient_exists(&self, patient_id: Uuid) -> Result<bool, StoreError> {
        self.exists("patients", patient_id).await
    }
}

/// Directory held in memory. A permissive directory accepts every id, which
/// is how the standalone server runs when no Supabase backend is configured.
#[derive(Default)]
pub struct InMemoryDirectory {
    doctors: RwLock<HashSet<Uuid>>,
    patients: RwLock<HashSet<Uuid>>,
    accept_unknown: bool,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permissive() -> Self {
        Self {
            accept_unknown: true,
            ..Self::default()
        }
    }

    pub async fn register_doctor(&self, doctor_id: Uuid) {
        self.doctors.write().await.insert(doctor_id);
    }

    pub async fn register_patient(&self, patient_id: Uuid) {
        self.patients.write().await.insert(patient_id);
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn doctor_exists(&self, doctor_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.accept_unknown || self.doctors.read().await.contains(&doctor_id))
    }

    async fn patient_exists(&self, patient_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.accept_unknown || self.patients.read().await.contains(&patient_id))
    }
}
