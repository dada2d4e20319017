use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_database::supabase::{return_representation, SupabaseClient};
use shared_database::StoreError;

use crate::models::Notification;

/// Durable record of every notification. The unread count is always derived
/// from these records.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: Notification) -> Result<Notification, StoreError>;

    async fn delete(&self, notification_id: Uuid) -> Result<(), StoreError>;

    async fn get(&self, notification_id: Uuid) -> Result<Option<Notification>, StoreError>;

    /// Newest first.
    async fn list_for_user(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>, StoreError>;

    async fn count_unread(&self, user_id: Uuid) -> Result<usize, StoreError>;

    async fn mark_read(&self, notification_id: Uuid) -> Result<(), StoreError>;

    /// Returns how many records changed.
    async fn mark_all_read(&self, user_id: Uuid) -> Result<usize, StoreError>;
}

#[derive(Default)]
pub struct InMemoryNotificationRepository {
    records: RwLock<HashMap<Uuid, Notification>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn insert(&self, notification: Notification) -> Result<Notification, StoreError> {
        self.records
            .write()
            .await
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn delete(&self, notification_id: Uuid) -> Result<(), StoreError> {
        self.records.write().await.remove(&notification_id);
        Ok(())
    }

    async fn get(&self, notification_id: Uuid) -> Result<Option<Notification>, StoreError> {
        Ok(self.records.read().await.get(&notification_id).cloned())
    }

    async fn list_for_user(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>, StoreError> {
        let records = self.records.read().await;
        let mut found: Vec<Notification> = records
            .values()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<usize, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count())
    }

    async fn mark_read(&self, notification_id: Uuid) -> Result<(), StoreError> {
        match self.records.write().await.get_mut(&notification_id) {
            Some(record) => {
                record.is_read = true;
                Ok(())
            }
            None => Err(StoreError::NotFound(notification_id.to_string())),
        }
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<usize, StoreError> {
        let mut records = self.records.write().await;
        let mut updated = 0;
        for record in records.values_mut().filter(|n| n.user_id == user_id && !n.is_read) {
            record.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }
}

/// PostgREST-backed store over the `notifications` table.
pub struct SupabaseNotificationRepository {
    supabase: SupabaseClient,
}

impl SupabaseNotificationRepository {
    pub fn new(supabase: SupabaseClient) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl NotificationRepository for SupabaseNotificationRepository {
    async fn insert(&self, notification: Notification) -> Result<Notification, StoreError> {
        let rows: Vec<Notification> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/notifications",
                Some(serde_json::to_value(&notification)?),
                Some(return_representation()),
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Serialization("Insert returned no notification".to_string()))
    }

    async fn delete(&self, notification_id: Uuid) -> Result<(), StoreError> {
        let path = format!("/rest/v1/notifications?id=eq.{}", notification_id);
        let _: Vec<Value> = self
            .supabase
            .request_with_headers(Method::DELETE, &path, None, Some(return_representation()))
            .await?;
        Ok(())
    }

    async fn get(&self, notification_id: Uuid) -> Result<Option<Notification>, StoreError> {
        let path = format!("/rest/v1/notifications?id=eq.{}", notification_id);
        let rows: Vec<Notification> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(rows.into_iter().next())
    }

    async fn list_for_user(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>, StoreError> {
        let mut path = format!("/rest/v1/notifications?user_id=eq.{}", user_id);
        if unread_only {
            path.push_str("&is_read=eq.false");
        }
        path.push_str("&order=created_at.desc");

        self.supabase.request(Method::GET, &path, None).await
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<usize, StoreError> {
        let path = format!(
            "/rest/v1/notifications?user_id=eq.{}&is_read=eq.false&select=id",
            user_id
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(rows.len())
    }

    async fn mark_read(&self, notification_id: Uuid) -> Result<(), StoreError> {
        let path = format!("/rest/v1/notifications?id=eq.{}", notification_id);
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(json!({ "is_read": true })),
                Some(return_representation()),
            )
            .await?;

        if rows.is_empty() {
            return Err(StoreError::NotFound(notification_id.to_string()));
        }
        Ok(())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<usize, StoreError> {
        let path = format!("/rest/v1/notifications?user_id=eq.{}&is_read=eq.false", user_id);
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(json!({ "is_read": true })),
                Some(return_representation()),
            )
            .await?;
        Ok(rows.len())
    }
}
