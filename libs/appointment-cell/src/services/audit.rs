use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use shared_database::supabase::{return_representation, SupabaseClient};
use shared_database::StoreError;
use shared_models::auth::Principal;

use crate::models::{AuditAction, AuditRecord};

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn insert(&self, record: AuditRecord) -> Result<AuditRecord, StoreError>;

    async fn delete(&self, record_id: Uuid) -> Result<(), StoreError>;

    /// Oldest first.
    async fn list_for_appointment(&self, appointment_id: Uuid) -> Result<Vec<AuditRecord>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryAuditRepository {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn insert(&self, record: AuditRecord) -> Result<AuditRecord, StoreError> {
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn delete(&self, record_id: Uuid) -> Result<(), StoreError> {
        self.records.write().await.retain(|r| r.id != record_id);
        Ok(())
    }

    async fn list_for_appointment(&self, appointment_id: Uuid) -> Result<Vec<AuditRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.appointment_id == appointment_id)
            .cloned()
            .collect())
    }
}

/// PostgREST-backed store over the `audit_logs` table.
pub struct SupabaseAuditRepository {
    supabase: SupabaseClient,
}

impl SupabaseAuditRepository {
    pub fn new(supabase: SupabaseClient) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl AuditRepository for SupabaseAuditRepository {
    async fn insert(&self, record: AuditRecord) -> Result<AuditRecord, StoreError> {
        let rows: Vec<AuditRecord> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/audit_logs",
                Some(serde_json::to_value(&record)?),
                Some(return_representation()),
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Serialization("Insert returned no audit record".to_string()))
    }

    async fn delete(&self, record_id: Uuid) -> Result<(), StoreError> {
        let path = format!("/rest/v1/audit_logs?id=eq.{}", record_id);
        let _: Vec<AuditRecord> = self
            .supabase
            .request_with_headers(Method::DELETE, &path, None, Some(return_representation()))
            .await?;
        Ok(())
    }

    async fn list_for_appointment(&self, appointment_id: Uuid) -> Result<Vec<AuditRecord>, StoreError> {
        let path = format!(
            "/rest/v1/audit_logs?appointment_id=eq.{}&order=created_at.asc",
            appointment_id
        );
        self.supabase.request(Method::GET, &path, None).await
    }
}

/// Writes the audit trail for bookings, transitions and deletions.
///
/// Records are written inside the same commit unit as the change they
/// describe and retracted with it on rollback.
pub struct AuditLog {
    repository: Arc<dyn AuditRepository>,
}

impl AuditLog {
    pub fn new(repository: Arc<dyn AuditRepository>) -> Self {
        Self { repository }
    }

    pub async fn record(
        &self,
        actor: &Principal,
        action: AuditAction,
        appointment_id: Uuid,
        details: impl Into<String>,
    ) -> Result<AuditRecord, StoreError> {
        let record = self
            .repository
            .insert(AuditRecord::new(actor.user_id, action, appointment_id, details))
            .await?;

        info!(
            audit_id = %record.id,
            action = %record.action,
            actor_id = %record.actor_id,
            appointment_id = %record.appointment_id,
            "AUDIT: {}", record.details
        );
        Ok(record)
    }

    pub async fn retract(&self, record: &AuditRecord) {
        match self.repository.delete(record.id).await {
            Ok(()) => warn!(audit_id = %record.id, "AUDIT RETRACTED: {}", record.action),
            Err(e) => error!(audit_id = %record.id, "Rollback could not retract audit record: {}", e),
        }
    }

    pub async fn history(&self, appointment_id: Uuid) -> Result<Vec<AuditRecord>, StoreError> {
        self.repository.list_for_appointment(appointment_id).await
    }
}
